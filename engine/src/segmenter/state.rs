use std::collections::VecDeque;

use stepseg_common::config::{CompareTarget, ConfigError, SegmenterConfig};
use stepseg_common::frame::Frame;
use stepseg_common::step::Step;
use tracing::{debug, info, warn};

use crate::similarity::FrameScorer;

use super::neighbors::filter_neighbors;

enum DetectionState {
    /// No frame seen yet.
    Empty,
    /// At least one step exists. Every later frame is measured from here.
    Tracking {
        /// Timestamp of the last emitted raw step; drives the time gate.
        last_step_timestamp: f64,
        /// The frame seen immediately before the current one.
        last_seen_frame: Frame,
    },
}

/// Outcome of feeding one frame to the detection pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FrameDecision {
    /// First frame of the stream, always a step.
    First,
    /// Too soon after the last step; similarity was not evaluated.
    Gated { elapsed: f64 },
    /// Not different enough from the comparison frame.
    Unchanged { score: f64 },
    /// Changed, but matches one of the recent steps.
    Duplicate { score: f64, matched_timestamp: f64 },
    /// New raw step emitted.
    Step { score: f64 },
}

impl FrameDecision {
    pub fn is_step(&self) -> bool {
        matches!(self, FrameDecision::First | FrameDecision::Step { .. })
    }
}

/// Streaming step detector plus the closing neighbor-filtering pass.
///
/// Feed frames in capture order with [`push`](Self::push), then call
/// [`finish`](Self::finish). One segmenter handles one recording; its state
/// is private, so independent recordings can be segmented in parallel with
/// separate instances.
pub struct StepSegmenter<S> {
    config: SegmenterConfig,
    scorer: S,
    state: DetectionState,
    raw_steps: Vec<Step>,
    /// Frames of the most recent raw steps, oldest first, at most `recent_window` long.
    recent: VecDeque<Frame>,
    frames_seen: u64,
}

impl<S: FrameScorer> StepSegmenter<S> {
    pub fn new(config: SegmenterConfig, scorer: S) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            recent: VecDeque::with_capacity(config.recent_window),
            config,
            scorer,
            state: DetectionState::Empty,
            raw_steps: Vec::new(),
            frames_seen: 0,
        })
    }

    /// Run both passes over a complete frame sequence.
    pub fn segment<I>(mut self, frames: I) -> Vec<Step>
    where
        I: IntoIterator<Item = Frame>,
    {
        for frame in frames {
            self.push(frame);
        }
        self.finish()
    }

    /// Detection pass for one frame. The frame is retained only if it becomes a step.
    pub fn push(&mut self, frame: Frame) -> FrameDecision {
        self.frames_seen += 1;

        let DetectionState::Tracking {
            last_step_timestamp,
            last_seen_frame,
        } = std::mem::replace(&mut self.state, DetectionState::Empty)
        else {
            info!(ts = frame.timestamp(), "first frame, recording initial step");
            self.emit(Step::new(frame.clone(), 1.0));
            self.state = DetectionState::Tracking {
                last_step_timestamp: frame.timestamp(),
                last_seen_frame: frame,
            };
            return FrameDecision::First;
        };

        if frame.timestamp() < last_seen_frame.timestamp() {
            warn!(
                ts = frame.timestamp(),
                previous_ts = last_seen_frame.timestamp(),
                "frame timestamp went backwards, processing in arrival order"
            );
        }

        let decision = self.evaluate(&frame, last_step_timestamp, &last_seen_frame);

        let last_step_timestamp = match decision {
            FrameDecision::Step { score } => {
                info!(
                    ts = frame.timestamp(),
                    score = format!("{score:.4}"),
                    raw_steps = self.raw_steps.len() + 1,
                    "significant change, new raw step"
                );
                self.emit(Step::new(frame.clone(), score));
                frame.timestamp()
            }
            _ => last_step_timestamp,
        };

        self.state = DetectionState::Tracking {
            last_step_timestamp,
            last_seen_frame: frame,
        };
        decision
    }

    fn evaluate(
        &self,
        frame: &Frame,
        last_step_timestamp: f64,
        last_seen_frame: &Frame,
    ) -> FrameDecision {
        let ts = frame.timestamp();
        let threshold = self.config.similarity_threshold;

        let elapsed = ts - last_step_timestamp;
        if elapsed < self.config.min_time_between_steps {
            debug!(
                ts,
                elapsed = format!("{elapsed:.3}"),
                min_gap = self.config.min_time_between_steps,
                "gated, too soon after last step"
            );
            return FrameDecision::Gated { elapsed };
        }

        let baseline = match self.config.compare_against {
            CompareTarget::PreviousFrame => last_seen_frame,
            CompareTarget::LastStep => self.recent.back().unwrap_or(last_seen_frame),
        };
        let score = self.scorer.score(baseline, frame);
        if score >= threshold {
            debug!(
                ts,
                score = format!("{score:.4}"),
                threshold,
                "no significant change"
            );
            return FrameDecision::Unchanged { score };
        }

        for recent in &self.recent {
            let similarity = self.scorer.score(recent, frame);
            if similarity > threshold {
                debug!(
                    ts,
                    score = format!("{score:.4}"),
                    similarity = format!("{similarity:.4}"),
                    matched_ts = recent.timestamp(),
                    "change matches a recent step, discarding"
                );
                return FrameDecision::Duplicate {
                    score,
                    matched_timestamp: recent.timestamp(),
                };
            }
        }

        FrameDecision::Step { score }
    }

    fn emit(&mut self, step: Step) {
        self.recent.push_back(step.frame().clone());
        if self.recent.len() > self.config.recent_window {
            self.recent.pop_front();
        }
        self.raw_steps.push(step);
    }

    /// Raw steps detected so far, before neighbor filtering.
    pub fn raw_steps(&self) -> &[Step] {
        &self.raw_steps
    }

    pub fn frames_seen(&self) -> u64 {
        self.frames_seen
    }

    pub fn scorer(&self) -> &S {
        &self.scorer
    }

    /// End of stream: run neighbor filtering over the raw steps.
    ///
    /// If the caller stopped feeding early, the last raw step seen so far is
    /// treated as the last step of the recording.
    pub fn finish(self) -> Vec<Step> {
        let raw_count = self.raw_steps.len();
        let steps = filter_neighbors(
            self.raw_steps,
            &self.scorer,
            self.config.similarity_threshold,
        );
        info!(
            frames = self.frames_seen,
            raw_steps = raw_count,
            steps = steps.len(),
            scorer = self.scorer.name(),
            "segmentation finished"
        );
        steps
    }

    /// Detection output without the neighbor-filtering pass.
    pub fn into_raw_steps(self) -> Vec<Step> {
        self.raw_steps
    }
}

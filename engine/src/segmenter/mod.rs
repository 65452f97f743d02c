//! Two-pass step segmentation.
//!
//! 1. Detection: a streaming pass over the frames that emits a raw step on
//!    every significant, non-duplicate change once the minimum gap since the
//!    last step has elapsed.
//! 2. Neighbor filtering: once the stream ends, interior raw steps that are
//!    not distinct from both adjacent raw steps are dropped.

pub mod neighbors;
pub mod state;

pub use neighbors::filter_neighbors;
pub use state::{FrameDecision, StepSegmenter};

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::HashMap;

    use stepseg_common::frame::Frame;

    use crate::similarity::FrameScorer;

    /// Scorer driven by a lookup table keyed on frame timestamps.
    ///
    /// Pairs are symmetric. A frame compared with itself (same timestamp)
    /// scores 1.0; any pair not in the table scores `fallback`.
    pub struct TableScorer {
        scores: HashMap<(i64, i64), f64>,
        fallback: f64,
    }

    fn key(ts: f64) -> i64 {
        (ts * 1000.0).round() as i64
    }

    impl TableScorer {
        pub fn new(fallback: f64) -> Self {
            Self {
                scores: HashMap::new(),
                fallback,
            }
        }

        pub fn with(mut self, a: f64, b: f64, score: f64) -> Self {
            let (ka, kb) = (key(a), key(b));
            self.scores.insert((ka.min(kb), ka.max(kb)), score);
            self
        }
    }

    impl FrameScorer for TableScorer {
        fn score(&self, a: &Frame, b: &Frame) -> f64 {
            let (ka, kb) = (key(a.timestamp()), key(b.timestamp()));
            if ka == kb {
                return 1.0;
            }
            self.scores
                .get(&(ka.min(kb), ka.max(kb)))
                .copied()
                .unwrap_or(self.fallback)
        }

        fn name(&self) -> &str {
            "table"
        }
    }

    pub fn frame(ts: f64) -> Frame {
        Frame::from_luma(1, 1, vec![0], ts).unwrap()
    }

    pub fn frames(timestamps: &[f64]) -> Vec<Frame> {
        timestamps.iter().map(|&ts| frame(ts)).collect()
    }
}

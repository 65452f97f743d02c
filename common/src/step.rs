use serde::{Deserialize, Serialize};

use crate::frame::Frame;

/// A frame marking a new visual state in the recording.
///
/// `timestamp`, `frame` and `similarity_score` are fixed when the segmenter
/// emits the step. Only `description` may be filled in afterwards, by the
/// captioning stage.
#[derive(Debug, Clone)]
pub struct Step {
    timestamp: f64,
    frame: Frame,
    /// Score against the previous raw frame at detection time (1.0 for the first step).
    similarity_score: f64,
    description: String,
}

impl Step {
    pub fn new(frame: Frame, similarity_score: f64) -> Self {
        Self {
            timestamp: frame.timestamp(),
            frame,
            similarity_score,
            description: String::new(),
        }
    }

    pub fn timestamp(&self) -> f64 {
        self.timestamp
    }

    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    pub fn similarity_score(&self) -> f64 {
        self.similarity_score
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn set_description(&mut self, description: impl Into<String>) {
        self.description = description.into();
    }

    /// Summary of this step once it has been persisted under `reference`.
    pub fn record(&self, index: usize, reference: &str) -> StepRecord {
        StepRecord {
            index,
            timestamp: self.timestamp,
            similarity_score: self.similarity_score,
            reference: reference.to_string(),
            description: self.description.clone(),
        }
    }
}

/// Serializable row of the step manifest written next to the persisted frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub index: usize,
    pub timestamp: f64,
    pub similarity_score: f64,
    pub reference: String,
    #[serde(default)]
    pub description: String,
}

use stepseg_common::frame::Frame;

/// Visual similarity between two frames.
///
/// Implementations must return a value in `[0, 1]`, higher meaning more
/// alike. A pair that cannot be scored (mismatched dimensions, bad data)
/// scores `0.0` so the later frame is treated as a step boundary.
pub trait FrameScorer: Send + Sync {
    fn score(&self, a: &Frame, b: &Frame) -> f64;

    /// Human-readable name for logging.
    fn name(&self) -> &str {
        "unnamed"
    }
}

impl<S: FrameScorer + ?Sized> FrameScorer for &S {
    fn score(&self, a: &Frame, b: &Frame) -> f64 {
        (**self).score(a, b)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

use stepseg_common::step::Step;
use tracing::debug;

use crate::similarity::FrameScorer;

/// Second pass: keep the first and last raw steps, and every interior raw
/// step that scores below `threshold` against both of its raw neighbors.
///
/// Neighbors are always taken from the unfiltered list, so dropping one step
/// never changes the verdict on the next. Each adjacent pair is scored once.
pub fn filter_neighbors<S>(raw: Vec<Step>, scorer: &S, threshold: f64) -> Vec<Step>
where
    S: FrameScorer + ?Sized,
{
    let n = raw.len();
    if n <= 2 {
        return raw;
    }

    let pair_scores: Vec<f64> = raw
        .windows(2)
        .map(|pair| scorer.score(pair[0].frame(), pair[1].frame()))
        .collect();

    raw.into_iter()
        .enumerate()
        .filter_map(|(i, step)| {
            if i == 0 || i == n - 1 {
                return Some(step);
            }
            let prev = pair_scores[i - 1];
            let next = pair_scores[i];
            let keep = prev < threshold && next < threshold;
            if !keep {
                debug!(
                    ts = step.timestamp(),
                    prev = format!("{prev:.4}"),
                    next = format!("{next:.4}"),
                    threshold,
                    "dropping transient step, too close to a neighbor"
                );
            }
            keep.then_some(step)
        })
        .collect()
}

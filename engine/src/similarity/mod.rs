pub mod ssim;
pub mod traits;

pub use ssim::SsimScorer;
pub use traits::FrameScorer;

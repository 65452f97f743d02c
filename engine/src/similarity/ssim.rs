use image::GrayImage;
use stepseg_common::frame::Frame;
use tracing::debug;

use super::traits::FrameScorer;

const WINDOW: usize = 7;
const WINDOW_AREA: f64 = (WINDOW * WINDOW) as f64;
const DATA_RANGE: f64 = 255.0;
const K1: f64 = 0.01;
const K2: f64 = 0.03;

/// Mean structural similarity (SSIM) over grayscale frames.
///
/// Every 7x7 window that lies fully inside the image contributes one local
/// SSIM value built from the window means, variances and covariance (sample
/// covariance, N/(N-1)). The score is the average over all windows, clamped
/// into [0, 1].
///
/// Window sums are maintained incrementally: per-column sums over the current
/// band of 7 rows, slid horizontally, so each pixel is touched a constant
/// number of times and only O(width) extra memory is needed.
#[derive(Debug, Clone, Copy, Default)]
pub struct SsimScorer;

impl SsimScorer {
    pub fn new() -> Self {
        Self
    }

    /// Raw mean SSIM, or `None` when the pair cannot be compared.
    pub fn mean_ssim(a: &GrayImage, b: &GrayImage) -> Option<f64> {
        if a.dimensions() != b.dimensions() {
            return None;
        }
        let (w, h) = (a.width() as usize, a.height() as usize);
        if w < WINDOW || h < WINDOW {
            return None;
        }

        let pa = a.as_raw();
        let pb = b.as_raw();

        let mut columns = vec![Moments::default(); w];
        for row in 0..WINDOW {
            add_row(&mut columns, pa, pb, row * w);
        }

        let mut total = 0.0;
        let mut count = 0u64;

        for top in 0..=(h - WINDOW) {
            if top > 0 {
                sub_row(&mut columns, pa, pb, (top - 1) * w);
                add_row(&mut columns, pa, pb, (top + WINDOW - 1) * w);
            }

            let mut acc = Moments::default();
            for col in &columns[..WINDOW] {
                acc.add(col);
            }
            for left in 0..=(w - WINDOW) {
                if left > 0 {
                    acc.sub(&columns[left - 1]);
                    acc.add(&columns[left + WINDOW - 1]);
                }
                total += acc.local_ssim();
                count += 1;
            }
        }

        let mean = total / count as f64;
        mean.is_finite().then_some(mean)
    }
}

impl FrameScorer for SsimScorer {
    fn score(&self, a: &Frame, b: &Frame) -> f64 {
        match Self::mean_ssim(a.luma(), b.luma()) {
            Some(s) => s.clamp(0.0, 1.0),
            None => {
                debug!(
                    a_ts = a.timestamp(),
                    b_ts = b.timestamp(),
                    a_dims = ?a.dimensions(),
                    b_dims = ?b.dimensions(),
                    "frames not comparable, scoring as maximally different"
                );
                0.0
            }
        }
    }

    fn name(&self) -> &str {
        "ssim"
    }
}

/// Running sums of x, y, x^2, y^2 and xy over a set of pixel pairs.
#[derive(Debug, Clone, Copy, Default)]
struct Moments {
    x: u64,
    y: u64,
    xx: u64,
    yy: u64,
    xy: u64,
}

impl Moments {
    fn push(&mut self, x: u8, y: u8) {
        let (x, y) = (x as u64, y as u64);
        self.x += x;
        self.y += y;
        self.xx += x * x;
        self.yy += y * y;
        self.xy += x * y;
    }

    fn pop(&mut self, x: u8, y: u8) {
        let (x, y) = (x as u64, y as u64);
        self.x -= x;
        self.y -= y;
        self.xx -= x * x;
        self.yy -= y * y;
        self.xy -= x * y;
    }

    fn add(&mut self, other: &Moments) {
        self.x += other.x;
        self.y += other.y;
        self.xx += other.xx;
        self.yy += other.yy;
        self.xy += other.xy;
    }

    fn sub(&mut self, other: &Moments) {
        self.x -= other.x;
        self.y -= other.y;
        self.xx -= other.xx;
        self.yy -= other.yy;
        self.xy -= other.xy;
    }

    /// SSIM of one full window.
    fn local_ssim(&self) -> f64 {
        let n = WINDOW_AREA;
        let cov_norm = n / (n - 1.0);

        let ux = self.x as f64 / n;
        let uy = self.y as f64 / n;
        let uxx = self.xx as f64 / n;
        let uyy = self.yy as f64 / n;
        let uxy = self.xy as f64 / n;

        let vx = cov_norm * (uxx - ux * ux);
        let vy = cov_norm * (uyy - uy * uy);
        let vxy = cov_norm * (uxy - ux * uy);

        let c1 = (K1 * DATA_RANGE).powi(2);
        let c2 = (K2 * DATA_RANGE).powi(2);

        let numerator = (2.0 * ux * uy + c1) * (2.0 * vxy + c2);
        let denominator = (ux * ux + uy * uy + c1) * (vx + vy + c2);
        numerator / denominator
    }
}

fn add_row(columns: &mut [Moments], a: &[u8], b: &[u8], offset: usize) {
    for (i, col) in columns.iter_mut().enumerate() {
        col.push(a[offset + i], b[offset + i]);
    }
}

fn sub_row(columns: &mut [Moments], a: &[u8], b: &[u8], offset: usize) {
    for (i, col) in columns.iter_mut().enumerate() {
        col.pop(a[offset + i], b[offset + i]);
    }
}

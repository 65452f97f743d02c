use std::io::Cursor;
use std::sync::{Arc, OnceLock};

use image::{DynamicImage, GrayImage, ImageFormat, ImageReader, Luma};

/// A decoded frame with its capture timestamp.
///
/// The pixel buffer is shared, so cloning a frame (for example to keep it in
/// the segmenter's recent-step window) does not copy any pixels. Frames are
/// never mutated once built.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Capture time in seconds (monotonic clock or offset into the recording).
    timestamp: f64,
    inner: Arc<FrameInner>,
}

#[derive(Debug)]
struct FrameInner {
    image: DynamicImage,
    /// Grayscale rendition, computed on first use by the scorer.
    luma: OnceLock<GrayImage>,
}

impl Frame {
    pub fn new(image: DynamicImage, timestamp: f64) -> Self {
        Self {
            timestamp,
            inner: Arc::new(FrameInner {
                image,
                luma: OnceLock::new(),
            }),
        }
    }

    /// Decode an encoded image (PNG, JPEG, BMP) into a frame.
    pub fn decode(data: &[u8], timestamp: f64) -> Result<Self, FrameError> {
        let image = ImageReader::new(Cursor::new(data))
            .with_guessed_format()
            .map_err(|e| FrameError::Decode(e.to_string()))?
            .decode()
            .map_err(|e| FrameError::Decode(e.to_string()))?;
        Ok(Self::new(image, timestamp))
    }

    /// Build a single-channel frame from raw 8-bit luma samples in row-major order.
    pub fn from_luma(
        width: u32,
        height: u32,
        samples: Vec<u8>,
        timestamp: f64,
    ) -> Result<Self, FrameError> {
        let expected = width as usize * height as usize;
        let got = samples.len();
        if got != expected {
            return Err(FrameError::BufferSize { got, expected });
        }
        let gray = GrayImage::from_raw(width, height, samples)
            .ok_or(FrameError::BufferSize { got, expected })?;
        Ok(Self::new(DynamicImage::ImageLuma8(gray), timestamp))
    }

    pub fn timestamp(&self) -> f64 {
        self.timestamp
    }

    pub fn width(&self) -> u32 {
        self.inner.image.width()
    }

    pub fn height(&self) -> u32 {
        self.inner.image.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width(), self.height())
    }

    /// Grayscale view of the frame. Converted once, then cached.
    ///
    /// Colour frames use BT.601 weights; gray frames keep their samples.
    pub fn luma(&self) -> &GrayImage {
        self.inner.luma.get_or_init(|| bt601_luma(&self.inner.image))
    }

    /// Encode the frame as PNG, the format steps are persisted in.
    pub fn encode_png(&self) -> Result<Vec<u8>, FrameError> {
        let mut buf = Cursor::new(Vec::new());
        self.inner
            .image
            .write_to(&mut buf, ImageFormat::Png)
            .map_err(|e| FrameError::Encode(e.to_string()))?;
        Ok(buf.into_inner())
    }

    /// True when both frames share the same pixel buffer.
    pub fn same_pixels(&self, other: &Frame) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

// BT.601 luma weights in 14-bit fixed point, summing to 1 << 14.
const LUMA_R: u32 = 4899;
const LUMA_G: u32 = 9617;
const LUMA_B: u32 = 1868;
const LUMA_SHIFT: u32 = 14;

fn bt601_luma(image: &DynamicImage) -> GrayImage {
    match image {
        DynamicImage::ImageLuma8(gray) => gray.clone(),
        DynamicImage::ImageLumaA8(_)
        | DynamicImage::ImageLuma16(_)
        | DynamicImage::ImageLumaA16(_) => image.to_luma8(),
        _ => {
            // Alpha is ignored.
            let rgb = image.to_rgb8();
            GrayImage::from_fn(rgb.width(), rgb.height(), |x, y| {
                let [r, g, b] = rgb.get_pixel(x, y).0;
                let luma = (LUMA_R * r as u32
                    + LUMA_G * g as u32
                    + LUMA_B * b as u32
                    + (1 << (LUMA_SHIFT - 1)))
                    >> LUMA_SHIFT;
                Luma([luma as u8])
            })
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("failed to decode frame: {0}")]
    Decode(String),
    #[error("failed to encode frame: {0}")]
    Encode(String),
    #[error("luma buffer has {got} samples, expected {expected}")]
    BufferSize { got: usize, expected: usize },
}

//! Decoded video frames

use chrono::{DateTime, Utc};
use image::RgbImage;

use crate::error::CaptureError;

/// A single decoded frame, owned by the loop iteration that read it
#[derive(Debug, Clone)]
pub struct Frame {
    pub image: RgbImage,
    pub index: u64,
    pub timestamp: DateTime<Utc>,
}

impl Frame {
    pub fn new(image: RgbImage, index: u64) -> Self {
        Self {
            image,
            index,
            timestamp: Utc::now(),
        }
    }

    /// Build a frame from a packed RGB24 buffer
    pub fn from_rgb24(data: Vec<u8>, width: u32, height: u32, index: u64) -> Result<Self, CaptureError> {
        let expected = width as usize * height as usize * 3;
        let actual = data.len();
        let image = RgbImage::from_raw(width, height, data)
            .ok_or(CaptureError::ShortFrame { expected, actual })?;
        Ok(Self::new(image, index))
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

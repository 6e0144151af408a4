//! Capture error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("video source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("frame read failed: {0}")]
    Read(String),

    #[error("frame has {actual} bytes, expected {expected}")]
    ShortFrame { expected: usize, actual: usize },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
}

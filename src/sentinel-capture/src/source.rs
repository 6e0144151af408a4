//! Frame source abstraction and input selection

use std::path::Path;
use tracing::info;

use crate::error::CaptureError;
use crate::ffmpeg::FfmpegSource;
use crate::frame::Frame;
use crate::image_dir::ImageDirSource;

/// A producer of successive frames
///
/// `read` returns `Ok(None)` once the source is exhausted. That is a normal
/// stop condition, not an error.
pub trait FrameSource: Send {
    fn read(&mut self) -> Result<Option<Frame>, CaptureError>;

    /// Release the underlying device or process. Also done on drop.
    fn close(&mut self) {}

    /// Human-readable identifier for logs
    fn describe(&self) -> &str;
}

/// Open the source named by `input`
///
/// A directory is replayed as an image sequence. Everything else (camera
/// index, file, stream URL) goes through ffmpeg.
pub fn open_source(input: &str) -> Result<Box<dyn FrameSource>, CaptureError> {
    if input.trim().is_empty() {
        return Err(CaptureError::SourceUnavailable("empty input identifier".to_string()));
    }

    if Path::new(input).is_dir() {
        info!("opening image sequence: {}", input);
        return Ok(Box::new(ImageDirSource::open(input)?));
    }

    info!("opening video source: {}", input);
    Ok(Box::new(FfmpegSource::open(input)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_input_is_unavailable() {
        assert!(matches!(
            open_source("  "),
            Err(CaptureError::SourceUnavailable(_))
        ));
    }
}

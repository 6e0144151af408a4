//! sentinel-capture - Video input and display surfaces for Sentinel
//!
//! Provides the frame source abstraction with FFmpeg-piped and image
//! directory backends, plus the console display used for hotkeys.

pub mod display;
pub mod error;
pub mod ffmpeg;
pub mod frame;
pub mod image_dir;
pub mod source;

pub use display::{ConsoleDisplay, Display, Key};
pub use error::CaptureError;
pub use ffmpeg::{check_ffmpeg, FfmpegSource};
pub use frame::Frame;
pub use image_dir::ImageDirSource;
pub use source::{open_source, FrameSource};

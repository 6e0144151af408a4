//! sentinel-processing - motion analysis for Sentinel
//!
//! Turns frames into grayscale, restricts them to a region of interest,
//! keeps the background reference and classifies the difference into
//! bounding boxes.

pub mod analyzer;
pub mod annotate;
pub mod background;
pub mod classifier;
pub mod error;
pub mod preprocess;
pub mod roi;

pub use analyzer::{Analysis, AnalyzerConfig, MotionAnalyzer};
pub use annotate::{annotated, draw_boxes};
pub use background::{BackgroundModel, Observation};
pub use classifier::{BoundingBox, Classification, ClassifierConfig, MotionClassifier};
pub use error::ProcessingError;
pub use roi::{ResolvedRoi, Roi};

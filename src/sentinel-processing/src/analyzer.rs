//! Per-frame pipeline: preprocess, restrict to the ROI, compare

use image::RgbImage;
use tracing::info;

use crate::background::{BackgroundModel, Observation};
use crate::classifier::{BoundingBox, Classification, ClassifierConfig, MotionClassifier};
use crate::error::ProcessingError;
use crate::preprocess::prepare;
use crate::roi::{ResolvedRoi, Roi};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalyzerConfig {
    pub classifier: ClassifierConfig,
    pub roi: Option<Roi>,
    pub blur_sigma: f32,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            classifier: ClassifierConfig::default(),
            roi: None,
            blur_sigma: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Analysis {
    /// The frame was installed as the background reference
    ReferenceUpdated,
    /// The frame was compared against the reference
    Compared(Classification),
}

impl Analysis {
    pub fn motion(&self) -> bool {
        matches!(self, Analysis::Compared(c) if c.motion)
    }

    pub fn boxes(&self) -> &[BoundingBox] {
        match self {
            Analysis::Compared(c) => &c.boxes,
            Analysis::ReferenceUpdated => &[],
        }
    }
}

/// Owns the background model and classifier for one run
///
/// The ROI is resolved against the first frame and fixed afterwards.
pub struct MotionAnalyzer {
    config: AnalyzerConfig,
    roi: Option<ResolvedRoi>,
    background: BackgroundModel,
    classifier: MotionClassifier,
}

impl MotionAnalyzer {
    pub fn new(config: AnalyzerConfig) -> Self {
        Self {
            config,
            roi: None,
            background: BackgroundModel::new(),
            classifier: MotionClassifier::new(config.classifier),
        }
    }

    pub fn analyze(&mut self, frame: &RgbImage) -> Result<Analysis, ProcessingError> {
        let roi = match self.roi {
            Some(roi) => roi,
            None => {
                let roi = ResolvedRoi::resolve(self.config.roi, frame.width(), frame.height());
                info!("monitoring region {} of {}x{} frame", roi.rect(), frame.width(), frame.height());
                self.roi = Some(roi);
                roi
            }
        };

        let prepared = roi.crop(&prepare(frame, self.config.blur_sigma))?;

        match self.background.observe(prepared) {
            Observation::ReferenceUpdated => Ok(Analysis::ReferenceUpdated),
            Observation::Compare { reference, current } => {
                let classification = self.classifier.classify(&current, reference, roi.offset())?;
                Ok(Analysis::Compared(classification))
            }
        }
    }

    /// Discard the reference, the next frame replaces it
    pub fn reset_reference(&mut self) {
        self.background.reset();
    }

    pub fn background(&self) -> &BackgroundModel {
        &self.background
    }

    pub fn roi(&self) -> Option<ResolvedRoi> {
        self.roi
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use imageproc::drawing::draw_filled_rect_mut;
    use imageproc::rect::Rect;

    fn analyzer(min_area: u32, roi: Option<Roi>) -> MotionAnalyzer {
        MotionAnalyzer::new(AnalyzerConfig {
            classifier: ClassifierConfig {
                threshold: 25,
                min_area,
                dilate_iterations: 2,
            },
            roi,
            blur_sigma: 1.0,
        })
    }

    fn black() -> RgbImage {
        RgbImage::new(100, 100)
    }

    fn with_square(x: i32, y: i32, size: u32) -> RgbImage {
        let mut image = black();
        draw_filled_rect_mut(&mut image, Rect::at(x, y).of_size(size, size), Rgb([255, 255, 255]));
        image
    }

    #[test]
    fn test_thirty_pixel_square_triggers() {
        let mut analyzer = analyzer(500, None);
        assert_eq!(analyzer.analyze(&black()).unwrap(), Analysis::ReferenceUpdated);

        let analysis = analyzer.analyze(&with_square(35, 35, 30)).unwrap();
        assert!(analysis.motion());
        let bbox = analysis.boxes()[0];
        assert!(bbox.x.abs_diff(35) <= 2 && bbox.y.abs_diff(35) <= 2);
        assert!(bbox.width.abs_diff(30) <= 4 && bbox.height.abs_diff(30) <= 4);
    }

    #[test]
    fn test_twenty_pixel_square_is_ignored() {
        let mut analyzer = analyzer(500, None);
        analyzer.analyze(&black()).unwrap();
        assert!(!analyzer.analyze(&with_square(40, 40, 20)).unwrap().motion());
    }

    #[test]
    fn test_static_scene_never_updates_reference() {
        let mut analyzer = analyzer(500, None);
        analyzer.analyze(&black()).unwrap();
        for _ in 0..5 {
            assert!(matches!(analyzer.analyze(&black()).unwrap(), Analysis::Compared(_)));
        }
        assert_eq!(analyzer.background().epoch(), 0);
    }

    #[test]
    fn test_reset_takes_effect_on_next_frame() {
        let mut analyzer = analyzer(500, None);
        analyzer.analyze(&black()).unwrap();
        analyzer.reset_reference();
        analyzer.reset_reference();

        let moved = with_square(35, 35, 30);
        assert_eq!(analyzer.analyze(&moved).unwrap(), Analysis::ReferenceUpdated);
        assert!(!analyzer.analyze(&moved).unwrap().motion());
        assert_eq!(analyzer.background().epoch(), 1);
    }

    #[test]
    fn test_blob_outside_roi_never_triggers() {
        let mut analyzer = analyzer(100, Some(Roi::new(0, 0, 40, 40)));
        analyzer.analyze(&black()).unwrap();
        assert!(!analyzer.analyze(&with_square(60, 60, 30)).unwrap().motion());
    }

    #[test]
    fn test_straddling_blob_is_clipped_and_offset() {
        let mut analyzer = analyzer(100, Some(Roi::new(50, 50, 50, 50)));
        analyzer.analyze(&black()).unwrap();

        // square spans 30..70, only 50..70 is inside the roi
        let analysis = analyzer.analyze(&with_square(30, 30, 40)).unwrap();
        assert!(analysis.motion());
        let bbox = analysis.boxes()[0];
        assert_eq!((bbox.x, bbox.y), (50, 50));
        assert!(bbox.right() <= 72 && bbox.bottom() <= 72);
    }

    #[test]
    fn test_only_the_part_inside_roi_counts() {
        // roughly 32x32 after blurring, about half of it left of the roi
        let square = with_square(35, 35, 30);

        let mut full = analyzer(600, None);
        full.analyze(&black()).unwrap();
        assert!(full.analyze(&square).unwrap().motion());

        let mut clipped = analyzer(600, Some(Roi::new(50, 0, 50, 100)));
        clipped.analyze(&black()).unwrap();
        assert!(!clipped.analyze(&square).unwrap().motion());
    }

    #[test]
    fn test_blob_on_roi_left_edge_is_detected() {
        let mut analyzer = analyzer(300, Some(Roi::new(50, 0, 50, 100)));
        analyzer.analyze(&black()).unwrap();

        // square spans 40..80, so it is cut by the roi's left edge
        let analysis = analyzer.analyze(&with_square(40, 30, 40)).unwrap();
        assert!(analysis.motion());
        assert_eq!(analysis.boxes()[0].x, 50);
    }

    #[test]
    fn test_resolution_change_is_an_error() {
        let mut analyzer = analyzer(500, None);
        analyzer.analyze(&black()).unwrap();
        let result = analyzer.analyze(&RgbImage::new(80, 60));
        assert!(matches!(result, Err(ProcessingError::FrameMismatch { .. })));
    }
}

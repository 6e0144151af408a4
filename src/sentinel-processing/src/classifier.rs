//! Frame differencing and contour classification

use std::collections::{HashMap, HashSet};

use image::{imageops, GrayImage, ImageBuffer, Luma};
use imageproc::contrast::{threshold, ThresholdType};
use imageproc::distance_transform::Norm;
use imageproc::map::map_colors2;
use imageproc::morphology::dilate;
use imageproc::region_labelling::{connected_components, Connectivity};
use tracing::trace;

use crate::error::ProcessingError;

/// Tuning knobs for the classifier
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassifierConfig {
    /// Pixels whose difference is strictly above this are foreground
    pub threshold: u8,
    /// Contours must enclose strictly more pixels than this
    pub min_area: u32,
    /// Number of 3x3 dilations applied to the foreground mask
    pub dilate_iterations: u8,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            threshold: 25,
            min_area: 800,
            dilate_iterations: 2,
        }
    }
}

/// Axis-aligned box in full-frame coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classification {
    pub motion: bool,
    pub boxes: Vec<BoundingBox>,
}

/// Enclosed area and extent of one dilated blob
#[derive(Debug, Clone, Copy)]
struct BlobStats {
    area: u32,
    min_x: u32,
    min_y: u32,
    max_x: u32,
    max_y: u32,
}

impl BlobStats {
    fn new(x: u32, y: u32) -> Self {
        Self {
            area: 0,
            min_x: x,
            min_y: y,
            max_x: x,
            max_y: y,
        }
    }

    fn add(&mut self, x: u32, y: u32) {
        self.area += 1;
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
    }
}

/// Top-level blobs of a dilated mask and the holes they enclose
///
/// The mask is padded with one background pixel on every side so blobs
/// touching the border still see the outside. Foreground is labelled with
/// 8-connectivity and background with 4-connectivity. A blob is top-level
/// when it touches the outside background. A blob nested in another blob's
/// hole never does.
struct Outline {
    labels: ImageBuffer<Luma<u32>, Vec<u32>>,
    external: HashSet<u32>,
    /// Hole pixels keyed by the label of the blob around them
    hole_area: HashMap<u32, u32>,
}

impl Outline {
    fn trace(dilated: &GrayImage) -> Self {
        let (width, height) = dilated.dimensions();
        let mut padded = GrayImage::new(width + 2, height + 2);
        imageops::replace(&mut padded, dilated, 1, 1);

        let labels = connected_components(&padded, Connectivity::Eight, Luma([0u8]));
        let mut inverted = padded;
        imageops::invert(&mut inverted);
        let gaps = connected_components(&inverted, Connectivity::Four, Luma([0u8]));
        let outside = gaps.get_pixel(0, 0)[0];

        let mut external = HashSet::new();
        let mut owners: HashMap<u32, u32> = HashMap::new();
        let mut hole_area: HashMap<u32, u32> = HashMap::new();

        for y in 1..=height {
            for x in 1..=width {
                let label = labels.get_pixel(x, y)[0];
                if label != 0 {
                    let neighbours = [(x - 1, y), (x + 1, y), (x, y - 1), (x, y + 1)];
                    if neighbours
                        .iter()
                        .any(|&(nx, ny)| gaps.get_pixel(nx, ny)[0] == outside)
                    {
                        external.insert(label);
                    }
                    continue;
                }

                let gap = gaps.get_pixel(x, y)[0];
                if gap == outside {
                    continue;
                }
                // the first hole pixel in raster order sits right below its enclosing blob
                let owner = *owners
                    .entry(gap)
                    .or_insert_with(|| labels.get_pixel(x, y - 1)[0]);
                *hole_area.entry(owner).or_default() += 1;
            }
        }

        Self {
            labels,
            external,
            hole_area,
        }
    }

    /// Blob label at `(x, y)` in unpadded coordinates
    fn label(&self, x: u32, y: u32) -> u32 {
        self.labels.get_pixel(x + 1, y + 1)[0]
    }
}

pub struct MotionClassifier {
    config: ClassifierConfig,
}

impl MotionClassifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    /// Compare `current` against `reference` and report moving regions
    ///
    /// Both images must already be restricted to the same region. `offset`
    /// is that region's origin in the full frame.
    pub fn classify(
        &self,
        current: &GrayImage,
        reference: &GrayImage,
        offset: (u32, u32),
    ) -> Result<Classification, ProcessingError> {
        if current.dimensions() != reference.dimensions() {
            return Err(ProcessingError::FrameMismatch {
                expected: reference.dimensions(),
                actual: current.dimensions(),
            });
        }

        let diff = map_colors2(current, reference, |c: Luma<u8>, r: Luma<u8>| {
            Luma([c[0].abs_diff(r[0])])
        });
        let mask = threshold(&diff, self.config.threshold, ThresholdType::Binary);

        let mut dilated = mask.clone();
        for _ in 0..self.config.dilate_iterations {
            dilated = dilate(&dilated, Norm::LInf, 1);
        }

        let outline = Outline::trace(&dilated);
        if outline.external.is_empty() {
            return Ok(Classification::default());
        }

        let mut stats: HashMap<u32, BlobStats> = HashMap::new();
        for (x, y, pixel) in mask.enumerate_pixels() {
            if pixel[0] == 0 {
                continue;
            }
            let label = outline.label(x, y);
            if outline.external.contains(&label) {
                stats
                    .entry(label)
                    .or_insert_with(|| BlobStats::new(x, y))
                    .add(x, y);
            }
        }
        for (label, blob) in stats.iter_mut() {
            blob.area += outline.hole_area.get(label).copied().unwrap_or(0);
        }

        let (dx, dy) = offset;
        let mut boxes: Vec<BoundingBox> = stats
            .values()
            .filter(|blob| {
                trace!("contour enclosing {} px", blob.area);
                blob.area > self.config.min_area
            })
            .map(|blob| BoundingBox {
                x: blob.min_x + dx,
                y: blob.min_y + dy,
                width: blob.max_x - blob.min_x + 1,
                height: blob.max_y - blob.min_y + 1,
            })
            .collect();
        boxes.sort_by_key(|b| (b.y, b.x));

        Ok(Classification {
            motion: !boxes.is_empty(),
            boxes,
        })
    }
}

//! Region of interest parsing and resolution

use image::{imageops, GrayImage};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

use crate::error::ProcessingError;

/// Rectangle in full-frame pixel coordinates
///
/// A zero-area rectangle means "no restriction".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Roi {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Roi {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn is_empty(&self) -> bool {
        self.area() == 0
    }
}

impl FromStr for Roi {
    type Err = ProcessingError;

    /// Parse `x,y,w,h`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        if parts.len() != 4 {
            return Err(ProcessingError::InvalidRoi(format!(
                "expected x,y,w,h but got {:?}",
                s
            )));
        }

        let mut values = [0u32; 4];
        for (value, part) in values.iter_mut().zip(&parts) {
            *value = part.parse().map_err(|_| {
                ProcessingError::InvalidRoi(format!("{:?} is not a non-negative integer", part))
            })?;
        }

        Ok(Roi::new(values[0], values[1], values[2], values[3]))
    }
}

impl fmt::Display for Roi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{},{}", self.x, self.y, self.width, self.height)
    }
}

/// A ROI clipped against the frame size it was resolved for
///
/// Resolved once per run. Frames of any other size are rejected, since a
/// crop would otherwise hide a source resolution change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedRoi {
    rect: Roi,
    frame_width: u32,
    frame_height: u32,
}

impl ResolvedRoi {
    pub fn resolve(roi: Option<Roi>, frame_width: u32, frame_height: u32) -> Self {
        let full = Roi::new(0, 0, frame_width, frame_height);

        let rect = match roi.filter(|r| !r.is_empty()) {
            None => full,
            Some(r) if r.x >= frame_width || r.y >= frame_height => {
                warn!(
                    "roi {} lies outside the {}x{} frame, using full frame",
                    r, frame_width, frame_height
                );
                full
            }
            Some(r) => {
                let clipped = Roi::new(
                    r.x,
                    r.y,
                    r.width.min(frame_width - r.x),
                    r.height.min(frame_height - r.y),
                );
                if clipped != r {
                    warn!("roi {} clipped to {}", r, clipped);
                }
                clipped
            }
        };

        debug!("resolved roi {} for {}x{} frames", rect, frame_width, frame_height);

        Self {
            rect,
            frame_width,
            frame_height,
        }
    }

    pub fn rect(&self) -> Roi {
        self.rect
    }

    pub fn frame_size(&self) -> (u32, u32) {
        (self.frame_width, self.frame_height)
    }

    pub fn is_full_frame(&self) -> bool {
        self.rect == Roi::new(0, 0, self.frame_width, self.frame_height)
    }

    /// Origin of the ROI, added back to boxes found inside it
    pub fn offset(&self) -> (u32, u32) {
        (self.rect.x, self.rect.y)
    }

    /// Restrict a full frame to the ROI
    pub fn crop(&self, image: &GrayImage) -> Result<GrayImage, ProcessingError> {
        if image.dimensions() != self.frame_size() {
            return Err(ProcessingError::FrameMismatch {
                expected: self.frame_size(),
                actual: image.dimensions(),
            });
        }
        if self.is_full_frame() {
            return Ok(image.clone());
        }
        let r = self.rect;
        Ok(imageops::crop_imm(image, r.x, r.y, r.width, r.height).to_image())
    }
}

//! Reference frame management

use image::GrayImage;
use tracing::debug;

/// Outcome of handing a frame to the background model
#[derive(Debug)]
pub enum Observation<'a> {
    /// The frame became the new reference, nothing to compare
    ReferenceUpdated,
    /// A reference exists and the frame should be compared against it
    Compare {
        reference: &'a GrayImage,
        current: GrayImage,
    },
}

/// Holds the current reference frame
///
/// The model is either valid (a reference is installed) or invalid. The first
/// frame and the first frame after a reset become the reference without being
/// compared. There is no implicit resync: a reference stays until reset.
#[derive(Debug, Default)]
pub struct BackgroundModel {
    reference: Option<GrayImage>,
    epoch: u64,
}

impl BackgroundModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_valid(&self) -> bool {
        self.reference.is_some()
    }

    /// Number of times a valid reference has been discarded
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn reference(&self) -> Option<&GrayImage> {
        self.reference.as_ref()
    }

    /// Invalidate the reference so the next frame replaces it
    ///
    /// Resetting an already invalid model changes nothing.
    pub fn reset(&mut self) {
        if self.reference.take().is_some() {
            self.epoch += 1;
            debug!("background reference reset, epoch {}", self.epoch);
        }
    }

    pub fn observe(&mut self, frame: GrayImage) -> Observation<'_> {
        match self.reference {
            Some(ref reference) => Observation::Compare {
                reference,
                current: frame,
            },
            None => {
                debug!(
                    "installed {}x{} background reference",
                    frame.width(),
                    frame.height()
                );
                self.reference = Some(frame);
                Observation::ReferenceUpdated
            }
        }
    }
}

//! Processing error types

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProcessingError {
    #[error("frame size mismatch: expected {expected:?}, got {actual:?}")]
    FrameMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },

    #[error("invalid region of interest: {0}")]
    InvalidRoi(String),
}

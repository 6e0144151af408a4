//! Error types for delivery and notification

use thiserror::Error;

/// Errors raised while uploading a snapshot
#[derive(Error, Debug)]
pub enum DeliveryError {
    /// Local file could not be read
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Transport failed before a response was received
    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    /// Server answered with an error status
    #[error("server rejected upload with status {status}")]
    Rejected { status: u16 },

    /// SSH connection, authentication or SFTP failure
    #[error("SFTP error: {0}")]
    Sftp(#[from] ssh2::Error),

    #[error("invalid delivery target: {0}")]
    InvalidTarget(String),
}

/// Errors raised while publishing a notification
#[derive(Error, Debug)]
pub enum NotificationError {
    #[error("invalid broker address: {0}")]
    InvalidBroker(String),

    #[error("publish failed: {0}")]
    Publish(String),

    #[error("broker connection failed: {0}")]
    Connection(String),

    #[error("no acknowledgement from broker within {0:?}")]
    Timeout(std::time::Duration),
}

//! Delivery capability resolved once from configuration

use std::fmt;
use std::path::Path;

use crate::error::DeliveryError;
use crate::http::HttpDelivery;
use crate::sftp::SftpDelivery;

/// Something that can push a local file to a remote destination
///
/// Implementations make exactly one attempt per call.
pub trait Delivery: Send + Sync {
    fn deliver(&self, file: &Path) -> Result<(), DeliveryError>;

    /// Short human-readable destination, used in logs
    fn describe(&self) -> String;
}

/// The configured upload transport
#[derive(Debug, Clone)]
pub enum DeliveryMethod {
    Http(HttpDelivery),
    Sftp(SftpDelivery),
}

impl DeliveryMethod {
    pub fn name(&self) -> &'static str {
        match self {
            DeliveryMethod::Http(_) => "http",
            DeliveryMethod::Sftp(_) => "sftp",
        }
    }
}

impl Delivery for DeliveryMethod {
    fn deliver(&self, file: &Path) -> Result<(), DeliveryError> {
        match self {
            DeliveryMethod::Http(http) => http.deliver(file),
            DeliveryMethod::Sftp(sftp) => sftp.deliver(file),
        }
    }

    fn describe(&self) -> String {
        match self {
            DeliveryMethod::Http(http) => http.describe(),
            DeliveryMethod::Sftp(sftp) => sftp.describe(),
        }
    }
}

impl fmt::Display for DeliveryMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.describe())
    }
}

/// File name component of a local path, for building remote names
pub(crate) fn file_name(file: &Path) -> Result<&str, DeliveryError> {
    file.file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| DeliveryError::InvalidTarget(format!("{} has no file name", file.display())))
}

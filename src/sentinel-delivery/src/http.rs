//! HTTP PUT upload

use std::fs::File;
use std::path::Path;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use tracing::debug;

use crate::error::DeliveryError;
use crate::method::{file_name, Delivery};

#[derive(Debug, Clone)]
pub struct HttpDelivery {
    url: String,
    timeout: Duration,
}

impl HttpDelivery {
    pub fn new(url: impl Into<String>, timeout_secs: u64) -> Self {
        Self {
            url: url.into(),
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Upload URL for `file`
    ///
    /// A URL ending in `/` names a collection, so the file name is appended.
    pub fn target_url(&self, file: &Path) -> Result<String, DeliveryError> {
        if self.url.ends_with('/') {
            Ok(format!("{}{}", self.url, file_name(file)?))
        } else {
            Ok(self.url.clone())
        }
    }
}

impl Delivery for HttpDelivery {
    fn deliver(&self, file: &Path) -> Result<(), DeliveryError> {
        let url = self.target_url(file)?;
        let body = File::open(file)?;

        let client = Client::builder().timeout(self.timeout).build()?;
        let response = client
            .put(&url)
            .header(CONTENT_TYPE, "image/jpeg")
            .body(body)
            .send()?;

        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            return Err(DeliveryError::Rejected {
                status: status.as_u16(),
            });
        }

        debug!("PUT {} -> {}", url, status);
        Ok(())
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}

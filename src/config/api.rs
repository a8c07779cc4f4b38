//! Messaging API client configuration

use secrecy::Secret;
use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;
use super::Environment;

/// How the client reaches the messaging API
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the messaging API, without trailing slash
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Timeout for every non-upload request, in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Timeout for a whole file upload, in seconds
    #[serde(default = "default_upload_timeout")]
    pub upload_timeout_secs: u64,

    /// Session token sent as bearer credentials
    pub session_token: Option<Secret<String>>,
}

impl ApiConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn upload_timeout(&self) -> Duration {
        Duration::from_secs(self.upload_timeout_secs)
    }

    /// Validate API configuration
    pub fn validate(&self, environment: &Environment) -> Result<(), ValidationError> {
        let url = self.base_url.trim();
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ValidationError::InvalidBaseUrl);
        }
        if *environment == Environment::Production && !url.starts_with("https://") {
            return Err(ValidationError::BaseUrlMustBeHttps);
        }
        if self.request_timeout_secs == 0 || self.request_timeout_secs > 300 {
            return Err(ValidationError::InvalidTimeout);
        }
        if self.upload_timeout_secs == 0 || self.upload_timeout_secs > 3600 {
            return Err(ValidationError::InvalidTimeout);
        }
        Ok(())
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout(),
            upload_timeout_secs: default_upload_timeout(),
            session_token: None,
        }
    }
}

fn default_base_url() -> String {
    "http://127.0.0.1:8080".to_string()
}

fn default_request_timeout() -> u64 {
    15
}

fn default_upload_timeout() -> u64 {
    300
}

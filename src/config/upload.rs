//! Upload limits

use serde::Deserialize;

use super::error::ValidationError;
use crate::domain::messaging::UploadPolicy;

const MAX_UPLOAD_LIMIT: u64 = 100 * 1024 * 1024;

/// Limits enforced on uploaded attachments
#[derive(Debug, Clone, Deserialize)]
pub struct UploadConfig {
    /// Largest accepted file, in bytes
    #[serde(default = "default_max_size_bytes")]
    pub max_size_bytes: u64,

    /// Accepted MIME types (comma-separated). Entries ending in `/` match
    /// a whole family, e.g. `image/`.
    pub allowed_mime_types: Option<String>,
}

impl UploadConfig {
    /// Allowed MIME types as a vector, falling back to the default set
    pub fn allowed_mime_types_list(&self) -> Vec<String> {
        match &self.allowed_mime_types {
            Some(raw) => raw
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            None => UploadPolicy::default().allowed_mime_types,
        }
    }

    pub fn policy(&self) -> UploadPolicy {
        UploadPolicy::new(self.max_size_bytes, self.allowed_mime_types_list())
    }

    /// Validate upload configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.max_size_bytes == 0 || self.max_size_bytes > MAX_UPLOAD_LIMIT {
            return Err(ValidationError::InvalidUploadLimit);
        }
        if self.allowed_mime_types_list().is_empty() {
            return Err(ValidationError::NoAllowedMimeTypes);
        }
        Ok(())
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_size_bytes: default_max_size_bytes(),
            allowed_mime_types: None,
        }
    }
}

fn default_max_size_bytes() -> u64 {
    10 * 1024 * 1024
}

//! Messaging behaviour configuration

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;
use crate::application::messaging::SearchSettings;

/// Tunables for the messaging components
#[derive(Debug, Clone, Deserialize)]
pub struct MessagingConfig {
    /// Quiet time after the last keystroke before a user search is issued
    #[serde(default = "default_search_debounce_ms")]
    pub search_debounce_ms: u64,

    /// Minimum query length that triggers a user search
    #[serde(default = "default_search_min_chars")]
    pub search_min_chars: usize,
}

impl MessagingConfig {
    pub fn search_settings(&self) -> SearchSettings {
        SearchSettings {
            debounce: Duration::from_millis(self.search_debounce_ms),
            min_chars: self.search_min_chars,
        }
    }

    /// Validate messaging configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.search_debounce_ms > 5_000 {
            return Err(ValidationError::InvalidDebounce);
        }
        if self.search_min_chars == 0 {
            return Err(ValidationError::InvalidSearchMinChars);
        }
        Ok(())
    }
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            search_debounce_ms: default_search_debounce_ms(),
            search_min_chars: default_search_min_chars(),
        }
    }
}

fn default_search_debounce_ms() -> u64 {
    500
}

fn default_search_min_chars() -> usize {
    2
}

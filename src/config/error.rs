//! Configuration error types

use thiserror::Error;

/// Errors that can occur during configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration loading failed: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),
}

/// Errors that can occur during configuration validation
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required configuration missing: {0}")]
    MissingRequired(&'static str),

    #[error("Invalid port number")]
    InvalidPort,

    #[error("Invalid socket address {0}")]
    InvalidSocketAddr(String),

    #[error("Invalid request timeout")]
    InvalidTimeout,

    #[error("Invalid API base URL format")]
    InvalidBaseUrl,

    #[error("API base URL must use HTTPS in production")]
    BaseUrlMustBeHttps,

    #[error("Search debounce must be at most 5000 ms")]
    InvalidDebounce,

    #[error("Search minimum length must be at least 1")]
    InvalidSearchMinChars,

    #[error("Upload size limit must be between 1 byte and 100 MiB")]
    InvalidUploadLimit,

    #[error("No upload MIME types allowed")]
    NoAllowedMimeTypes,
}

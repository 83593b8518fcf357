//! Application-level error types for Sunshine.
//!
//! The weather crate carries its own precise errors; this module maps them
//! onto what the command line shows the user.

use thiserror::Error;

/// Top-level application error type.
///
/// Use `user_message()` to get a message suitable for printing.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A place name could not be turned into coordinates.
    #[error("Location error: {0}")]
    Location(String),

    /// The location lookup itself could not reach the provider.
    #[error("Location lookup failed: {0}")]
    LocationUnavailable(String),

    /// A sync ran and failed; the cache is unchanged.
    #[error("Sync error: {0}")]
    Sync(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Returns a short, non-technical message for the user.
    pub fn user_message(&self) -> &'static str {
        match self {
            AppError::Config(e) => e.user_message(),
            AppError::Location(_) => "Invalid location",
            AppError::LocationUnavailable(_) => {
                "Unable to look up the location. Check your internet connection."
            }
            AppError::Sync(_) => "Could not refresh the forecast. Cached data is unchanged.",
            AppError::Storage(_) => "Unable to access local data. Try again.",
            AppError::Other(_) => "An unexpected error occurred. Please try again.",
        }
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Configuration parse error: {0}")]
    ParseError(String),
}

impl ConfigError {
    pub fn user_message(&self) -> &'static str {
        match self {
            ConfigError::Invalid(_) => "Invalid configuration. Check your settings.",
            ConfigError::ParseError(_) => "Configuration file is malformed. Check your settings.",
        }
    }
}

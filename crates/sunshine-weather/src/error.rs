//! Error types for the forecast sync subsystem.

use thiserror::Error;

/// Transport-level failures of a forecast or geocoding request.
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Server error: {status} - {message}")]
    ServerError { status: u16, message: String },

    #[error("Empty response body")]
    EmptyBody,

    #[error("Invalid request URL: {0}")]
    InvalidUrl(String),
}

impl NetworkError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::ConnectionFailed(_) => "Unable to connect. Check your internet connection.",
            Self::Timeout => "The request timed out. Please try again.",
            Self::ServerError { status, .. } if *status >= 500 => {
                "The weather service is experiencing issues. Please try again later."
            }
            Self::ServerError { .. } => "The weather request failed. Please try again.",
            Self::EmptyBody => "Received an empty response. Please try again.",
            Self::InvalidUrl(_) => "The weather service address is invalid. Check settings.",
        }
    }
}

impl From<reqwest::Error> for NetworkError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if let Some(status) = err.status() {
            Self::ServerError {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else {
            Self::ConnectionFailed(err.to_string())
        }
    }
}

/// A forecast payload that cannot be turned into daily records.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Malformed forecast payload: {0}")]
    Malformed(String),

    #[error("Upstream error {code}: {message}")]
    Upstream { code: String, message: String },

    #[error("Invalid forecast entry {index}: {reason}")]
    InvalidEntry { index: usize, reason: String },

    #[error("Duplicate forecast date: {0}")]
    DuplicateDate(String),
}

/// Failure to turn a free-text place name into coordinates.
#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("No location found for \"{0}\"")]
    NoMatch(String),

    #[error("Malformed geocoding response: {0}")]
    Malformed(String),

    #[error("Geocoding request failed: {0}")]
    Network(#[from] NetworkError),
}

impl ResolutionError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::NoMatch(_) | Self::Malformed(_) => "Invalid Location",
            Self::Network(_) => "An error has occurred. Check your connection.",
        }
    }
}

/// Local storage failures.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Corrupt cache row: {0}")]
    Corrupt(String),
}

/// The external notification surface could not be invoked.
#[derive(Debug, Error)]
#[error("Notification dispatch failed: {0}")]
pub struct NotifyError(pub String);

//! Unified error types for the session core
//!
//! This module defines error types that:
//! - Are serializable for the dashboard frontend
//! - Keep the backend's own message where one was returned
//! - Map transport failures to a small set of variants

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Application error type for services and the realtime layer
///
/// All errors are serializable so they can be surfaced as notices.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[serde(tag = "type", content = "message")]
pub enum OneMailError {
    #[error("Configuration error: {0}")]
    Config(String),

    /// Non-success response from the API, carrying the backend message
    #[error("{message}")]
    Api { status: u16, message: String },

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Credential error: {0}")]
    Credential(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("{0}")]
    Other(String),
}

impl OneMailError {
    /// HTTP status attached to an API failure, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(401)
    }
}

// Implement From for common error types

impl From<std::io::Error> for OneMailError {
    fn from(err: std::io::Error) -> Self {
        OneMailError::Io(err.to_string())
    }
}

impl From<toml::de::Error> for OneMailError {
    fn from(err: toml::de::Error) -> Self {
        OneMailError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for OneMailError {
    fn from(err: serde_json::Error) -> Self {
        OneMailError::Parse(err.to_string())
    }
}

impl From<reqwest::Error> for OneMailError {
    fn from(err: reqwest::Error) -> Self {
        OneMailError::Network(err.to_string())
    }
}

impl From<url::ParseError> for OneMailError {
    fn from(err: url::ParseError) -> Self {
        OneMailError::InvalidInput(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for OneMailError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        OneMailError::Connection(err.to_string())
    }
}

impl From<String> for OneMailError {
    fn from(err: String) -> Self {
        OneMailError::Other(err)
    }
}

impl From<&str> for OneMailError {
    fn from(err: &str) -> Self {
        OneMailError::Other(err.to_string())
    }
}

/// Result type alias using OneMailError
pub type Result<T> = std::result::Result<T, OneMailError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_serializes_with_tag() {
        let err = OneMailError::Auth("No access token available".to_string());
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["type"], "Auth");
        assert_eq!(json["message"], "No access token available");
    }

    #[test]
    fn test_unauthorized_detection() {
        let err = OneMailError::Api {
            status: 401,
            message: "Token expired".to_string(),
        };
        assert!(err.is_unauthorized());
        assert_eq!(err.to_string(), "Token expired");

        let err = OneMailError::Network("connection refused".to_string());
        assert!(!err.is_unauthorized());
        assert_eq!(err.status(), None);
    }
}

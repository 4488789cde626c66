//! # Error Handling
//!
//! Crate-level error type for startup, configuration and offline analysis. Tool execution errors
//! live in [`crate::mcp::error::McpError`].

use crate::k8s::{ClusterError, ManifestError};

/// Custom result type for kubenet-mcp operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for kubenet-mcp
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Validation errors
    #[error("Validation error: {message}")]
    Validation { message: String, field: Option<String> },

    /// Kubernetes access errors
    #[error(transparent)]
    Cluster(#[from] ClusterError),

    /// Manifest loading errors
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    /// Network transport errors (stdio, HTTP)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation { message: message.into(), field: None }
    }

    /// Create a validation error with field information
    pub fn validation_field<S: Into<String>, F: Into<String>>(message: S, field: F) -> Self {
        Self::Validation { message: message.into(), field: Some(field.into()) }
    }

    /// Create a new transport error
    pub fn transport<S: Into<String>>(message: S) -> Self {
        Self::Transport(message.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal(message.into())
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut messages: Vec<String> = errors
            .field_errors()
            .iter()
            .map(|(field, field_errors)| {
                let error_messages: Vec<String> = field_errors
                    .iter()
                    .map(|e| {
                        e.message.as_ref().map_or("Invalid value".to_string(), |m| m.to_string())
                    })
                    .collect();
                format!("{}: {}", field, error_messages.join(", "))
            })
            .collect();
        messages.sort();
        Self::validation(messages.join("; "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(Error::config("bad port").to_string(), "Configuration error: bad port");
        assert_eq!(
            Error::validation_field("must not be empty", "host").to_string(),
            "Validation error: must not be empty"
        );
    }

    #[test]
    fn test_cluster_error_is_transparent() {
        let error: Error = ClusterError::Api("connection refused".to_string()).into();
        assert_eq!(error.to_string(), "Kubernetes API error: connection refused");
    }
}

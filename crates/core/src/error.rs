// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Structured error types for `icesrc`.
//!
//! This mirrors the categorized-enum approach used across the StreamKit
//! workspace: each variant groups a family of failures so callers can match
//! on kind rather than parsing messages.

use thiserror::Error;

/// Main error type for `icesrc` operations.
#[derive(Debug, Error)]
pub enum IcesError {
    /// Configuration or parameter validation error (bad XML, missing module, bad bitrates).
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Runtime processing error during normal operation.
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// Network-related error (socket, HTTP, Icecast handshake).
    #[error("Network error: {0}")]
    Network(String),

    /// Codec-specific error (Vorbis analysis/synthesis, resampler disagreement).
    #[error("Codec error: {0}")]
    Codec(String),

    /// I/O error (file operations, device access).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Resource exhaustion or limit exceeded (queue capacity, reconnect attempts exhausted).
    #[error("Resource exhaustion: {0}")]
    ResourceExhausted(String),
}

/// Convenience type alias for Results using `IcesError`.
pub type Result<T> = std::result::Result<T, IcesError>;

impl From<IcesError> for String {
    fn from(err: IcesError) -> Self {
        err.to_string()
    }
}

impl From<String> for IcesError {
    fn from(s: String) -> Self {
        Self::Runtime(s)
    }
}

impl From<&str> for IcesError {
    fn from(s: &str) -> Self {
        Self::Runtime(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = IcesError::Configuration("missing input module".to_string());
        assert_eq!(err.to_string(), "Configuration error: missing input module");

        let err = IcesError::Network("connection reset".to_string());
        assert_eq!(err.to_string(), "Network error: connection reset");
    }

    #[test]
    fn test_string_to_error_conversion() {
        let err: IcesError = "disk full".into();
        assert_eq!(err.to_string(), "Runtime error: disk full");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "config not found");
        let err: IcesError = io_err.into();
        assert!(err.to_string().contains("I/O error"));
        assert!(err.to_string().contains("config not found"));
    }
}

//! Error types for the Claude bridge

use thiserror::Error;

/// Main error type for the Claude bridge
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Unrecoverable configuration problem, such as a missing API key
    #[error("{0}")]
    Config(String),

    /// The agent call did not start streaming within the call ceiling
    #[error("{0}")]
    Timeout(String),

    #[error("Claude process error: {0}")]
    Process(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Session file not found")]
    SessionNotFound(String),

    #[error("Permission channel error: {0}")]
    PermissionChannel(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl BridgeError {
    /// Whether this error belongs to the permission channel and must be
    /// treated as a denial rather than a call failure
    pub fn is_permission_channel(&self) -> bool {
        matches!(self, BridgeError::PermissionChannel(_))
    }
}

/// Convenience type alias for Results using BridgeError
pub type Result<T> = std::result::Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_error_display() {
        let err = BridgeError::Config("API Key not configured".to_string());
        assert_eq!(err.to_string(), "API Key not configured");

        let err = BridgeError::Timeout("Claude Code process aborted by user".to_string());
        assert_eq!(err.to_string(), "Claude Code process aborted by user");

        let err = BridgeError::Process("exited with status 2".to_string());
        assert_eq!(err.to_string(), "Claude process error: exited with status 2");

        let err = BridgeError::SessionNotFound("abc123".to_string());
        assert_eq!(err.to_string(), "Session file not found");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let bridge_error: BridgeError = io_error.into();

        match bridge_error {
            BridgeError::Io(_) => {}
            _ => panic!("Expected Io variant"),
        }
    }

    #[test]
    fn test_serde_error_conversion() {
        let serde_error = serde_json::from_str::<serde_json::Value>("{invalid").unwrap_err();
        let bridge_error: BridgeError = serde_error.into();
        assert!(matches!(bridge_error, BridgeError::Serialization(_)));
    }

    #[test]
    fn test_permission_channel_classification() {
        assert!(BridgeError::PermissionChannel("boom".to_string()).is_permission_channel());
        assert!(!BridgeError::Protocol("boom".to_string()).is_permission_channel());
    }
}

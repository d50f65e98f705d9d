//! Error types for the relay MCP server.

use thiserror::Error;

/// Main error type for relay bridge operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error (missing or inconsistent fields)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Identity invariant violation: target and channel must match
    #[error("Target/channel mismatch: target={target}, channel={channel}")]
    TargetChannelMismatch {
        /// Requested target id
        target: String,
        /// Requested channel id
        channel: String,
    },

    /// Overall connect attempt timed out
    #[error("Connection timed out after {0}ms")]
    ConnectTimeout(u64),

    /// Transport gave up after its bounded retry budget
    #[error("Connection failed after {0} attempts")]
    RetriesExhausted(u32),

    /// No valid reply arrived before the deadline
    #[error("No response from {target} within {waited_ms}ms")]
    ResponseTimeout {
        /// Target the caller was waiting on
        target: String,
        /// Waiting budget that elapsed
        waited_ms: u64,
    },

    /// Operation requires a live connection
    #[error("Session not connected")]
    NotConnected,

    /// Outstanding work cancelled by a disconnect or reconfiguration
    #[error("Session reset: {0}")]
    SessionReset(String),

    /// Transport-level failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Directory request failed upstream
    #[error("Directory request failed: {0}")]
    Directory(String),

    /// Directory response did not match the expected shape
    #[error("Malformed directory response: {0}")]
    MalformedResponse(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic error with custom message
    #[error("{0}")]
    Other(String),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error() {
        let err = Error::Config("RELAY_SERVER_URL is empty".to_string());
        assert_eq!(
            err.to_string(),
            "Configuration error: RELAY_SERVER_URL is empty"
        );
    }

    #[test]
    fn test_target_channel_mismatch_error() {
        let err = Error::TargetChannelMismatch {
            target: "agent-1".to_string(),
            channel: "agent-2".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Target/channel mismatch: target=agent-1, channel=agent-2"
        );
    }

    #[test]
    fn test_connect_timeout_error() {
        let err = Error::ConnectTimeout(10000);
        assert_eq!(err.to_string(), "Connection timed out after 10000ms");
    }

    #[test]
    fn test_retries_exhausted_error() {
        let err = Error::RetriesExhausted(5);
        assert_eq!(err.to_string(), "Connection failed after 5 attempts");
    }

    #[test]
    fn test_response_timeout_error() {
        let err = Error::ResponseTimeout {
            target: "agent-1".to_string(),
            waited_ms: 30000,
        };
        assert_eq!(err.to_string(), "No response from agent-1 within 30000ms");
    }

    #[test]
    fn test_not_connected_error() {
        let err = Error::NotConnected;
        assert_eq!(err.to_string(), "Session not connected");
    }

    #[test]
    fn test_session_reset_error() {
        let err = Error::SessionReset("target switched".to_string());
        assert_eq!(err.to_string(), "Session reset: target switched");
    }

    #[test]
    fn test_transport_error() {
        let err = Error::Transport("connection closed".to_string());
        assert_eq!(err.to_string(), "Transport error: connection closed");
    }

    #[test]
    fn test_directory_error() {
        let err = Error::Directory("502 Bad Gateway".to_string());
        assert_eq!(err.to_string(), "Directory request failed: 502 Bad Gateway");
    }

    #[test]
    fn test_malformed_response_error() {
        let err = Error::MalformedResponse("missing data.agents".to_string());
        assert_eq!(
            err.to_string(),
            "Malformed directory response: missing data.agents"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_serialization_error_conversion() {
        let json_err = serde_json::from_str::<i32>("invalid json").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Serialization(_)));
    }

    #[test]
    fn test_other_error() {
        let err = Error::Other("unknown error".to_string());
        assert_eq!(err.to_string(), "unknown error");
    }

    #[test]
    fn test_result_type() {
        let success: Result<i32> = Ok(42);
        assert!(success.is_ok());

        let failure: Result<i32> = Err(Error::NotConnected);
        assert!(failure.is_err());
    }

    #[test]
    fn test_error_debug() {
        let err = Error::SessionReset("reconfigured".to_string());
        let debug_str = format!("{err:?}");
        assert!(debug_str.contains("SessionReset"));
    }
}

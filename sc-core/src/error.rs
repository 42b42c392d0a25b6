//! Global error types for storechat.
//!
//! All error categories across the workspace are unified into a single
//! `ScError` enum with conversions from underlying library errors.

use thiserror::Error;

/// Convenience type alias for Results using ScError.
pub type ScResult<T> = Result<T, ScError>;

/// Unified error type covering all error categories in storechat.
#[derive(Error, Debug)]
pub enum ScError {
    // -- Configuration errors --
    /// Failed to load or parse application configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// A required configuration value is missing.
    #[error("missing configuration: {0}")]
    MissingConfig(String),

    // -- Network errors --
    /// HTTP request failed.
    #[error("http error: {0}")]
    Http(String),

    /// Request or handshake timed out.
    #[error("request timeout: {0}")]
    Timeout(String),

    /// Transport-level socket failure (unreachable, closed mid-handshake, io error).
    #[error("socket error: {0}")]
    Socket(String),

    /// The socket was closed while an operation needed it.
    #[error("socket disconnected")]
    SocketDisconnected,

    /// The server refused the socket handshake (CONNECT_ERROR).
    #[error("handshake rejected: {0}")]
    HandshakeRejected(String),

    /// Server returned an error response.
    #[error("server error (status {status}): {message}")]
    ServerError {
        /// HTTP status code.
        status: u16,
        /// Error message from server.
        message: String,
    },

    /// Authentication failed.
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    // -- Protocol errors --
    /// A wire frame could not be decoded.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    // -- File/IO errors --
    /// File system operation failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    // -- Generic --
    /// An unexpected internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ScError {
    /// Whether a failure to open one transport should fall through to the next
    /// transport in the negotiation order.
    ///
    /// A rejected handshake is an answer from the server, not a transport
    /// problem, so it is final.
    pub fn is_transport_failure(&self) -> bool {
        matches!(
            self,
            ScError::Socket(_)
                | ScError::SocketDisconnected
                | ScError::Timeout(_)
                | ScError::Http(_)
                | ScError::Protocol(_)
                | ScError::Io(_)
        )
    }
}

impl From<serde_json::Error> for ScError {
    fn from(e: serde_json::Error) -> Self {
        ScError::Serialization(e.to_string())
    }
}

impl From<toml::de::Error> for ScError {
    fn from(e: toml::de::Error) -> Self {
        ScError::Config(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sc_error_display() {
        let err = ScError::Config("bad value".to_string());
        assert_eq!(err.to_string(), "configuration error: bad value");

        let err = ScError::ServerError {
            status: 503,
            message: "unavailable".into(),
        };
        assert_eq!(err.to_string(), "server error (status 503): unavailable");
    }

    #[test]
    fn test_transport_failure_classification() {
        assert!(ScError::Socket("refused".into()).is_transport_failure());
        assert!(ScError::Timeout("handshake".into()).is_transport_failure());
        assert!(!ScError::HandshakeRejected("bad token".into()).is_transport_failure());
        assert!(!ScError::Config("x".into()).is_transport_failure());
    }

    #[test]
    fn test_json_error_conversion() {
        let err: ScError = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert!(matches!(err, ScError::Serialization(_)));
    }
}

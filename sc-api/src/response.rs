//! Server response types.
//!
//! All chat server REST responses follow a common envelope format
//! with status, message, and optional data/error fields.

use serde::{Deserialize, Serialize};

/// Standard server response envelope.
///
/// All REST API responses from the chat server follow this format:
/// ```json
/// { "status": 200, "message": "OK", "data": { ... } }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerResponse<T = serde_json::Value> {
    /// HTTP-like status code from the server.
    pub status: u16,
    /// Human-readable message.
    #[serde(default)]
    pub message: String,
    /// Response payload data (type varies by endpoint).
    pub data: Option<T>,
    /// Error details (present only on error responses).
    pub error: Option<ServerError>,
    /// Metadata (pagination info, totals, etc).
    pub metadata: Option<serde_json::Value>,
}

/// Server error detail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerError {
    /// Error type identifier.
    #[serde(rename = "type")]
    pub error_type: Option<String>,
    /// Error message.
    pub message: Option<String>,
}

impl<T> ServerResponse<T> {
    /// Whether the response indicates success (any 2xx status).
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Whether the response indicates an error.
    pub fn is_error(&self) -> bool {
        !self.is_success()
    }

    /// Get the error message if this is an error response.
    pub fn error_message(&self) -> Option<String> {
        if self.is_error() {
            self.error
                .as_ref()
                .and_then(|e| e.message.clone())
                .or_else(|| Some(self.message.clone()))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_response_success() {
        let json = r#"{"status":200,"message":"OK","data":{"id":"room-1"}}"#;
        let resp: ServerResponse = serde_json::from_str(json).unwrap();
        assert!(resp.is_success());
        assert!(resp.error_message().is_none());
    }

    #[test]
    fn test_server_response_error() {
        let json = r#"{"status":401,"message":"Unauthorized","error":{"type":"auth","message":"Token expired"}}"#;
        let resp: ServerResponse = serde_json::from_str(json).unwrap();
        assert!(resp.is_error());
        assert_eq!(resp.error_message().unwrap(), "Token expired");
    }

    #[test]
    fn test_error_falls_back_to_message() {
        let json = r#"{"status":404,"message":"Chat room not found"}"#;
        let resp: ServerResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.error_message().unwrap(), "Chat room not found");
        assert!(resp.data.is_none());
    }
}

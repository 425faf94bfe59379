//! Engine API error types.

use thiserror::Error;

/// Errors from the container engine's HTTP API.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The engine answered with a non-success status.
    #[error("engine returned {status}: {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Message from the engine's error body.
        message: String,
    },

    /// The referenced container, image or network does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The engine rejected the request because the resource already
    /// exists or is in a conflicting state.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The request exceeded its deadline.
    #[error("request timed out")]
    Timeout,

    /// The daemon could not be reached.
    #[error("connection error: {0}")]
    Connection(String),

    /// The engine's response body could not be decoded.
    #[error("parse error: {0}")]
    Parse(String),

    /// The HTTP transport could not be constructed.
    #[error("transport build error: {0}")]
    TransportBuild(String),

    /// The daemon address is not something this transport can dial.
    #[error("unsupported daemon address: {0}")]
    UnsupportedAddress(String),

    /// An image pull ran but the progress stream reported failure.
    #[error("image pull failed: {0}")]
    Pull(String),
}

impl EngineError {
    /// Whether retrying the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout | Self::Connection(_) => true,
            Self::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// True when the engine reported the resource missing.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// True when the engine reported a conflicting resource.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    /// Classify a non-success response into an error.
    ///
    /// The engine wraps failures as `{"message": "..."}`; fall back to
    /// the raw body when that shape is absent.
    pub(crate) fn from_response(status: u16, body: &str) -> Self {
        #[derive(serde::Deserialize)]
        struct ErrorBody {
            message: String,
        }

        let message = serde_json::from_str::<ErrorBody>(body)
            .map(|b| b.message)
            .unwrap_or_else(|_| body.trim().to_string());

        match status {
            404 => Self::NotFound(message),
            409 => Self::Conflict(message),
            _ => Self::Api { status, message },
        }
    }
}

impl From<reqwest::Error> for EngineError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            EngineError::Timeout
        } else if err.is_connect() {
            EngineError::Connection(err.to_string())
        } else if err.is_decode() {
            EngineError::Parse(err.to_string())
        } else {
            EngineError::Connection(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_not_found() {
        let err = EngineError::from_response(404, r#"{"message": "No such container: x"}"#);
        assert!(err.is_not_found());
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("No such container"));
    }

    #[test]
    fn test_classify_conflict() {
        let err = EngineError::from_response(409, r#"{"message": "network exists"}"#);
        assert!(err.is_conflict());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_server_errors_are_retryable() {
        assert!(EngineError::from_response(500, "oops").is_retryable());
        assert!(EngineError::from_response(503, "busy").is_retryable());
        assert!(!EngineError::from_response(400, "bad request").is_retryable());
    }

    #[test]
    fn test_non_json_body_kept_verbatim() {
        let err = EngineError::from_response(502, "bad gateway\n");
        assert!(err.to_string().contains("bad gateway"));
    }
}

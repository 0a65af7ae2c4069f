//! Publish error types.

use serde::Deserialize;
use thiserror::Error;

/// Result type for platform calls.
pub type PublishResult<T> = Result<T, PublishError>;

/// Errors returned by a platform transport.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("Graph API error (HTTP {status}, code {code:?}, subcode {subcode:?}): {message}")]
    Api {
        status: u16,
        code: Option<i64>,
        subcode: Option<i64>,
        message: String,
    },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

#[derive(Deserialize)]
struct GraphErrorBody {
    error: GraphErrorDetail,
}

#[derive(Deserialize)]
struct GraphErrorDetail {
    #[serde(default)]
    message: String,
    code: Option<i64>,
    error_subcode: Option<i64>,
}

impl PublishError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn invalid_response(msg: impl Into<String>) -> Self {
        Self::InvalidResponse(msg.into())
    }

    /// Build an error from a non-success response, pulling code and subcode
    /// out of a Graph `{"error": {...}}` body when there is one.
    pub fn from_http_status(status: u16, body: &str) -> Self {
        match serde_json::from_str::<GraphErrorBody>(body) {
            Ok(parsed) => Self::Api {
                status,
                code: parsed.error.code,
                subcode: parsed.error.error_subcode,
                message: parsed.error.message,
            },
            Err(_) => Self::Api {
                status,
                code: None,
                subcode: None,
                message: body.chars().take(500).collect(),
            },
        }
    }

    /// Platform error code, if any.
    pub fn code(&self) -> Option<i64> {
        match self {
            PublishError::Api { code, .. } => *code,
            _ => None,
        }
    }

    /// Platform error subcode, if any.
    pub fn subcode(&self) -> Option<i64> {
        match self {
            PublishError::Api { subcode, .. } => *subcode,
            _ => None,
        }
    }

    /// HTTP status, if the platform answered.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            PublishError::Api { status, .. } => Some(*status),
            PublishError::Network(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_graph_error_body_parsed() {
        let body = r#"{"error":{"message":"Media ID is not available","type":"OAuthException","code":9007,"error_subcode":2207027,"fbtrace_id":"A1"}}"#;
        let err = PublishError::from_http_status(400, body);
        assert_eq!(err.code(), Some(9007));
        assert_eq!(err.subcode(), Some(2207027));
        assert_eq!(err.http_status(), Some(400));
        assert!(err.to_string().contains("Media ID is not available"));
    }

    #[test]
    fn test_non_json_body_kept_as_message() {
        let err = PublishError::from_http_status(502, "<html>Bad Gateway</html>");
        assert_eq!(err.code(), None);
        assert!(err.to_string().contains("Bad Gateway"));
        assert_eq!(err.http_status(), Some(502));
    }
}

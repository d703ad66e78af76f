//! Error types for client operations.

use std::io;
use std::path::PathBuf;

use reqwest::StatusCode;
use sekolah_api_models::flatten_error_body;
use serde_json::Value;
use thiserror::Error;

/// Longest plain-text error body surfaced verbatim to operators.
const MAX_TEXT_MESSAGE_CHARS: usize = 200;

/// Body of a non-2xx response.
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorBody {
    /// Parsed JSON body (`Content-Type: application/json`).
    Json(Value),
    /// Raw text of any other body.
    Text(String),
}

impl ErrorBody {
    /// Single readable line extracted from the body, if any.
    #[must_use]
    pub fn message(&self) -> Option<String> {
        match self {
            Self::Json(value) => flatten_error_body(value),
            Self::Text(text) => {
                let trimmed = text.trim();
                if trimmed.is_empty()
                    || trimmed.starts_with('<')
                    || trimmed.chars().count() > MAX_TEXT_MESSAGE_CHARS
                {
                    None
                } else {
                    Some(trimmed.to_string())
                }
            }
        }
    }
}

/// Primary error type for client operations.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The request never produced a response (DNS, connect, timeout, TLS).
    #[error("request to {url} failed")]
    Transport {
        /// Target URL.
        url: String,
        /// Underlying transport error.
        source: reqwest::Error,
    },
    /// The backend answered with a non-success status.
    #[error("request failed with status {status}")]
    Api {
        /// HTTP status returned by the backend.
        status: StatusCode,
        /// Parsed or raw response body.
        body: ErrorBody,
    },
    /// The backend answered 401; the session has been invalidated.
    #[error("session is no longer authorised")]
    Unauthorized,
    /// A local precondition failed before any network call was made.
    #[error("{0}")]
    Precondition(String),
    /// A success response could not be decoded into the expected type.
    #[error("failed to decode {context}")]
    Decode {
        /// What was being decoded.
        context: String,
        /// Source serde error.
        source: serde_json::Error,
    },
    /// A path or cursor could not be turned into a URL.
    #[error("invalid URL '{input}'")]
    InvalidUrl {
        /// Offending input.
        input: String,
        /// Source parse error.
        source: url::ParseError,
    },
    /// An access token could not be decoded.
    #[error("invalid access token: {reason}")]
    InvalidToken {
        /// Machine-readable reason for the failure.
        reason: &'static str,
    },
    /// Reading or writing persisted tokens failed.
    #[error("token storage {operation} failed")]
    Storage {
        /// Operation identifier.
        operation: &'static str,
        /// Source IO error.
        source: io::Error,
    },
    /// A write was accepted (2xx) but the response carried no record.
    #[error("write to {path} succeeded but returned no record")]
    EmptyWriteResponse {
        /// Path that was written.
        path: String,
    },
    /// Reading a file for upload failed.
    #[error("failed to read upload '{}'", path.display())]
    Upload {
        /// File that could not be read.
        path: PathBuf,
        /// Source IO error.
        source: io::Error,
    },
}

/// Convenience alias for client results.
pub type ClientResult<T> = Result<T, ClientError>;

impl ClientError {
    /// Shorthand for [`ClientError::Precondition`].
    pub fn precondition(message: impl Into<String>) -> Self {
        Self::Precondition(message.into())
    }

    /// HTTP status carried by the error, when the backend answered.
    #[must_use]
    pub const fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::Unauthorized => Some(StatusCode::UNAUTHORIZED),
            _ => None,
        }
    }

    /// Whether the error means the operator has to log in again.
    #[must_use]
    pub const fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized)
    }

    /// One human-readable line describing the failure.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Transport { source, .. } if source.is_timeout() => {
                "the server did not respond in time".to_string()
            }
            Self::Transport { .. } => "unable to reach the server".to_string(),
            Self::Api { status, body } => body
                .message()
                .unwrap_or_else(|| format!("request failed with status {status}")),
            Self::Unauthorized => "your session has expired; please log in again".to_string(),
            Self::Precondition(message) => message.clone(),
            Self::Decode { context, .. } => format!("unexpected response while reading {context}"),
            Self::EmptyWriteResponse { .. } => {
                "the change was saved, but the server returned no record".to_string()
            }
            other => other.to_string(),
        }
    }
}

/// Default error mapper used by resource hooks.
#[must_use]
pub fn default_error_message(error: &ClientError) -> String {
    error.user_message()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn api_error_prefers_flattened_json_body() {
        let error = ClientError::Api {
            status: StatusCode::BAD_REQUEST,
            body: ErrorBody::Json(json!({"niy": ["teacher with this niy already exists."]})),
        };
        assert_eq!(
            error.user_message(),
            "niy: teacher with this niy already exists."
        );
        assert_eq!(error.status(), Some(StatusCode::BAD_REQUEST));
    }

    #[test]
    fn api_error_falls_back_to_status_for_html_bodies() {
        let error = ClientError::Api {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            body: ErrorBody::Text("<html><body>Server Error (500)</body></html>".into()),
        };
        assert_eq!(
            error.user_message(),
            "request failed with status 500 Internal Server Error"
        );
    }

    #[test]
    fn api_error_surfaces_short_plain_text() {
        let error = ClientError::Api {
            status: StatusCode::BAD_GATEWAY,
            body: ErrorBody::Text("upstream unavailable\n".into()),
        };
        assert_eq!(error.user_message(), "upstream unavailable");
    }

    #[test]
    fn precondition_and_unauthorized_messages() {
        assert_eq!(
            ClientError::precondition("select a class first").user_message(),
            "select a class first"
        );
        assert!(ClientError::Unauthorized.is_unauthorized());
        assert_eq!(
            ClientError::Unauthorized.status(),
            Some(StatusCode::UNAUTHORIZED)
        );
        assert_eq!(
            default_error_message(&ClientError::Unauthorized),
            "your session has expired; please log in again"
        );
    }

    #[test]
    fn empty_write_response_says_the_change_was_saved() {
        let error = ClientError::EmptyWriteResponse {
            path: "api/teachers/3/".into(),
        };
        assert_eq!(error.status(), None);
        assert_eq!(
            error.user_message(),
            "the change was saved, but the server returned no record"
        );
        assert_eq!(
            error.to_string(),
            "write to api/teachers/3/ succeeded but returned no record"
        );
    }
}

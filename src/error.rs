use reqwest::StatusCode;

use crate::classify::is_retryable_status;

/// Error type returned by this crate.
#[derive(Debug, thiserror::Error)]
pub enum CloudApiError {
    /// Method, path, URL or header could not be turned into a request.
    #[error("request construction error: {0}")]
    RequestConstruction(String),
    /// Request body could not be encoded as JSON.
    #[error("serialization error: {0}")]
    Serialization(#[source] serde_json::Error),
    /// Non-success status that is not worth retrying.
    #[error(transparent)]
    Http(HttpError),
    /// Every attempt failed with a transient error.
    #[error("retry attempts exhausted after {attempts} attempt(s): {last_error}")]
    RetryExhausted {
        /// Number of attempts actually sent.
        attempts: u32,
        /// Error recorded by the final attempt.
        #[source]
        last_error: Box<AttemptError>,
    },
    /// Success response whose body was empty or a literal `null`.
    #[error("response body is null")]
    NullResponse,
    /// Response body did not match the expected shape.
    #[error("decode error: {0}")]
    Decode(String),
    /// The call was cancelled through its [`crate::CancelToken`].
    #[error("request cancelled")]
    Cancelled,
    /// The call deadline or the configured overall timeout elapsed.
    #[error("deadline exceeded")]
    DeadlineExceeded,
    /// Invalid client configuration.
    #[error("configuration error: {0}")]
    Config(String),
    /// Pagination fetched the configured maximum of full pages.
    #[error("pagination stopped after {pages} full pages without reaching the end")]
    PaginationLimit { pages: usize },
}

impl CloudApiError {
    /// Returns `true` for [`CloudApiError::Cancelled`] and
    /// [`CloudApiError::DeadlineExceeded`].
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled | Self::DeadlineExceeded)
    }

    /// Status code of the HTTP error behind this error, if any.
    ///
    /// Looks through [`CloudApiError::RetryExhausted`].
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http(err) => Some(err.status),
            Self::RetryExhausted { last_error, .. } => match last_error.as_ref() {
                AttemptError::Http(err) => Some(err.status),
                AttemptError::Transport(_) => None,
            },
            _ => None,
        }
    }
}

/// Failure of a single attempt, kept as the last error while retrying.
#[derive(Debug, thiserror::Error)]
pub enum AttemptError {
    /// No response was received (connect, DNS, reset, body read).
    #[error("transport error: {0}")]
    Transport(#[source] reqwest::Error),
    /// A response with a non-success status was received.
    #[error(transparent)]
    Http(HttpError),
}

/// Non-success HTTP response.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
#[error("http error {status} {status_text}: {body}")]
pub struct HttpError {
    /// Numeric status code.
    pub status: u16,
    /// Canonical reason phrase, empty when unknown.
    pub status_text: String,
    /// Raw response body.
    pub body: String,
    /// Response body parsed as JSON, when it was JSON.
    pub payload: Option<serde_json::Value>,
    /// `X-Request-ID` echoed by the server.
    pub request_id: Option<String>,
}

impl HttpError {
    pub(crate) fn new(status: StatusCode, body: &[u8], request_id: Option<String>) -> Self {
        Self {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_owned(),
            body: String::from_utf8_lossy(body).into_owned(),
            payload: serde_json::from_slice(body).ok(),
            request_id,
        }
    }

    /// 4xx other than 429: the request itself is wrong.
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status) && self.status != 429
    }

    /// 429 or 5xx: the condition may clear on its own.
    pub fn is_transient(&self) -> bool {
        StatusCode::from_u16(self.status).is_ok_and(is_retryable_status)
    }
}

#[cfg(test)]
mod tests {
    use reqwest::StatusCode;

    use super::{AttemptError, CloudApiError, HttpError};

    #[test]
    fn http_error_keeps_json_payload() {
        let err = HttpError::new(
            StatusCode::BAD_REQUEST,
            br#"{"error":"invalid name"}"#,
            Some("req-1".to_owned()),
        );
        assert_eq!(err.status, 400);
        assert_eq!(err.status_text, "Bad Request");
        assert_eq!(err.payload.as_ref().unwrap()["error"], "invalid name");
        assert_eq!(err.request_id.as_deref(), Some("req-1"));
        assert!(err.is_client_error());
        assert!(!err.is_transient());
    }

    #[test]
    fn http_error_without_json_body_has_no_payload() {
        let err = HttpError::new(StatusCode::BAD_GATEWAY, b"<html>bad gateway</html>", None);
        assert!(err.payload.is_none());
        assert_eq!(err.body, "<html>bad gateway</html>");
        assert!(err.is_transient());
        assert!(!err.is_client_error());
    }

    #[test]
    fn too_many_requests_is_transient_not_client_error() {
        let err = HttpError::new(StatusCode::TOO_MANY_REQUESTS, b"", None);
        assert!(err.is_transient());
        assert!(!err.is_client_error());
    }

    #[test]
    fn status_looks_through_retry_exhausted() {
        let err = CloudApiError::RetryExhausted {
            attempts: 3,
            last_error: Box::new(AttemptError::Http(HttpError::new(
                StatusCode::SERVICE_UNAVAILABLE,
                b"",
                None,
            ))),
        };
        assert_eq!(err.status(), Some(503));
        assert!(!err.is_cancellation());
        assert!(err.to_string().contains("3 attempt(s)"));
    }

    #[test]
    fn cancellation_kinds() {
        assert!(CloudApiError::Cancelled.is_cancellation());
        assert!(CloudApiError::DeadlineExceeded.is_cancellation());
        assert!(!CloudApiError::NullResponse.is_cancellation());
    }
}

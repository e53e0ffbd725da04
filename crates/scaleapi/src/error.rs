//! Error types for scaling API calls.
//!
//! Errors are categorized so callers can tell transport trouble from a
//! refusal by the remote side and pick the right feedback.

use std::fmt;

/// Result type alias for scaling API operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Categories of API errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Connection, DNS or timeout failures (transient).
    Network,
    /// The server processed the request and reported a failure.
    Remote,
    /// Session, cluster or resource does not exist.
    NotFound,
    /// The request was rejected before or by validation.
    InvalidInput,
    /// The response body could not be understood.
    Format,
    /// Other/unknown errors.
    Other,
}

impl ErrorCategory {
    /// Whether this error category is typically transient and worth retrying.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network)
    }

    /// Get a user-friendly description of this error category.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::Network => "Network connectivity issue",
            Self::Remote => "Remote operation failed",
            Self::NotFound => "Not found",
            Self::InvalidInput => "Request rejected",
            Self::Format => "Unexpected response format",
            Self::Other => "Unexpected error",
        }
    }

    /// Get actionable advice for resolving this error category.
    #[must_use]
    pub fn advice(&self) -> &'static str {
        match self {
            Self::Network => "Check the API URL and your VPN connection, then try again",
            Self::Remote => "Inspect the message above; the cluster may be mid-operation",
            Self::NotFound => "Verify the session or resource name",
            Self::InvalidInput => "Check the values being sent",
            Self::Format => "The API version may not match this client",
            Self::Other => "Check the error details for more information",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Errors that can occur while talking to the scaling API.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Transport-level failure.
    #[error("HTTP request failed: {message}")]
    Http {
        /// Error message.
        message: String,
        /// HTTP status code if available.
        status: Option<u16>,
    },

    /// The server answered with an error payload.
    #[error("{message}")]
    Remote {
        /// HTTP status code.
        status: u16,
        /// Machine-readable code, when the server sent one.
        code: Option<String>,
        /// Message as reported by the server.
        message: String,
    },

    /// A path segment cannot be placed in a URL as-is.
    #[error("invalid path segment '{0}'")]
    InvalidSegment(String),

    /// Invalid response from the API.
    #[error("invalid API response: {0}")]
    InvalidResponse(String),
}

impl Error {
    /// Create a transport error.
    pub fn http(message: impl Into<String>, status: Option<u16>) -> Self {
        Self::Http {
            message: message.into(),
            status,
        }
    }

    /// Get the error category.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Http { .. } => ErrorCategory::Network,
            Error::Remote { status: 404, .. } => ErrorCategory::NotFound,
            Error::Remote {
                status: 400 | 409 | 422,
                ..
            } => ErrorCategory::InvalidInput,
            Error::Remote { .. } => ErrorCategory::Remote,
            Error::InvalidSegment(_) => ErrorCategory::InvalidInput,
            Error::InvalidResponse(_) => ErrorCategory::Format,
        }
    }

    /// Whether this error is typically transient and worth retrying.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }
}

impl From<ureq::Error> for Error {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::StatusCode(code) => Self::Http {
                message: format!("HTTP {code}"),
                status: Some(code),
            },
            other => Self::Http {
                message: other.to_string(),
                status: None,
            },
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidResponse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote(status: u16) -> Error {
        Error::Remote {
            status,
            code: None,
            message: "nope".to_string(),
        }
    }

    #[test]
    fn test_error_category_retryable() {
        assert!(ErrorCategory::Network.is_retryable());
        assert!(!ErrorCategory::Remote.is_retryable());
        assert!(!ErrorCategory::NotFound.is_retryable());
        assert!(!ErrorCategory::InvalidInput.is_retryable());
        assert!(!ErrorCategory::Format.is_retryable());
        assert!(!ErrorCategory::Other.is_retryable());
    }

    #[test]
    fn test_error_category_text() {
        for category in [
            ErrorCategory::Network,
            ErrorCategory::Remote,
            ErrorCategory::NotFound,
            ErrorCategory::InvalidInput,
            ErrorCategory::Format,
            ErrorCategory::Other,
        ] {
            assert!(!category.description().is_empty());
            assert!(!category.advice().is_empty());
        }
        assert!(format!("{}", ErrorCategory::Network).contains("Network"));
    }

    #[test]
    fn test_error_http_category() {
        let err = Error::http("connection refused", None);
        assert_eq!(err.category(), ErrorCategory::Network);
        assert!(err.is_retryable());
    }

    #[test]
    fn test_error_remote_categories() {
        assert_eq!(remote(404).category(), ErrorCategory::NotFound);
        assert_eq!(remote(400).category(), ErrorCategory::InvalidInput);
        assert_eq!(remote(500).category(), ErrorCategory::Remote);
        assert!(!remote(500).is_retryable());
    }

    #[test]
    fn test_error_remote_display_is_verbatim() {
        let err = Error::Remote {
            status: 500,
            code: Some("SAVE_ERROR".to_string()),
            message: "Failed to save session: disk full".to_string(),
        };
        assert_eq!(err.to_string(), "Failed to save session: disk full");
    }

    #[test]
    fn test_error_segment_and_format_categories() {
        assert_eq!(
            Error::InvalidSegment("a/b".to_string()).category(),
            ErrorCategory::InvalidInput
        );
        assert_eq!(
            Error::InvalidResponse("eof".to_string()).category(),
            ErrorCategory::Format
        );
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: Error = json_err.into();
        assert_eq!(err.category(), ErrorCategory::Format);
    }
}

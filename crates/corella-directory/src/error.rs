//! Directory error types with transient/conflict classification.

use thiserror::Error;

/// Error from a directory, quota or network capability call.
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// Failed to reach the service.
    #[error("connection failed: {message}")]
    ConnectionFailed {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The service is temporarily unavailable (5xx).
    #[error("service unavailable: {message}")]
    Unavailable { message: String },

    /// Authentication against the directory failed.
    #[error("authentication failed")]
    AuthenticationFailed,

    /// The identity already exists in the directory (create conflict).
    ///
    /// This is the duplicate-account signal the pipeline branches on.
    #[error("identity already exists: {identifier}")]
    Conflict { identifier: String },

    /// Referenced object does not exist in the directory.
    #[error("not found: {identifier}")]
    NotFound { identifier: String },

    /// The service answered with something we could not interpret.
    #[error("protocol error: {message}")]
    Protocol { message: String },

    /// Any other failed request.
    #[error("request failed ({status}): {message}")]
    RequestFailed { status: u16, message: String },
}

impl DirectoryError {
    /// Whether the operation may succeed if retried later.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            DirectoryError::ConnectionFailed { .. } | DirectoryError::Unavailable { .. }
        )
    }

    /// Whether this is the create-conflict (duplicate identity) signal.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, DirectoryError::Conflict { .. })
    }

    /// Create a connection-failed error from a transport error.
    pub fn connection(source: reqwest::Error) -> Self {
        DirectoryError::ConnectionFailed {
            message: source.to_string(),
            source: Some(Box::new(source)),
        }
    }

    /// Map an HTTP error status to a directory error.
    #[must_use]
    pub fn from_status(status: reqwest::StatusCode, identifier: &str, body: &str) -> Self {
        use reqwest::StatusCode;
        match status {
            StatusCode::CONFLICT => DirectoryError::Conflict {
                identifier: identifier.to_string(),
            },
            StatusCode::NOT_FOUND => DirectoryError::NotFound {
                identifier: identifier.to_string(),
            },
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                DirectoryError::AuthenticationFailed
            }
            s if s.is_server_error() => DirectoryError::Unavailable {
                message: format!("{s}: {body}"),
            },
            s => DirectoryError::RequestFailed {
                status: s.as_u16(),
                message: body.to_string(),
            },
        }
    }
}

/// Result type for directory operations.
pub type DirectoryResult<T> = Result<T, DirectoryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(DirectoryError::Unavailable {
            message: "x".into()
        }
        .is_transient());
        assert!(!DirectoryError::Conflict {
            identifier: "a@x.com".into()
        }
        .is_transient());
        assert!(!DirectoryError::AuthenticationFailed.is_transient());
    }

    #[test]
    fn test_conflict_from_status() {
        let err = DirectoryError::from_status(reqwest::StatusCode::CONFLICT, "a@x.com", "");
        assert!(err.is_conflict());

        let err = DirectoryError::from_status(reqwest::StatusCode::BAD_GATEWAY, "x", "oops");
        assert!(err.is_transient());
        assert!(!err.is_conflict());
    }
}

//! Error shapes shared between the retry engine and the GitHub-facing code.

use thiserror::Error;

/// Error returned by the issue-tracker boundary.
///
/// The retry engine classifies errors by HTTP status, so provider failures
/// must keep the status structural rather than burying it in a message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// The provider answered with a non-success status.
    #[error("GitHub API error: {status} - {message}")]
    Status { status: u16, message: String },
    /// The request never produced a response (DNS, connect, timeout, ...).
    #[error("network error: {message}")]
    Network { message: String },
}

impl ApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Network { .. } => None,
        }
    }
}

/// An error that may carry an HTTP status code.
///
/// Implemented by [`ApiError`] and by domain error types whose variants wrap
/// provider failures. Domain-rule failures report `None` and are therefore
/// never retried.
pub trait StatusCarrier: std::error::Error + Send + Sync + 'static {
    fn status(&self) -> Option<u16>;
}

impl StatusCarrier for ApiError {
    fn status(&self) -> Option<u16> {
        ApiError::status(self)
    }
}

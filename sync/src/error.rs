//! Error taxonomy for sync passes.
//!
//! Four families, handled differently by the orchestrator:
//! transient network failures count against the retry breaker and resolve
//! themselves on a later pass; protocol failures abort the pass without
//! touching local data; local data problems are skipped row by row; and
//! authorization failures are surfaced to the session layer untouched,
//! since retrying with the same credentials cannot succeed.

use thiserror::Error;

/// All possible errors from a sync pass.
#[derive(Debug, Error)]
pub enum SyncError {
    /// No response, timeout, connection refused - worth retrying later.
    #[error("network error: {0}")]
    Network(String),

    /// The remote answered with something unusable (bad status, bad JSON).
    #[error("remote protocol error: {0}")]
    Protocol(String),

    /// The remote rejected our credentials.
    #[error("unauthorized by remote")]
    Unauthorized,

    /// Local rows that cannot participate in a pass.
    #[error("local data error: {0}")]
    LocalData(String),

    #[error(transparent)]
    Engine(#[from] satchel_engine::Error),
}

impl SyncError {
    /// Whether a later attempt could plausibly succeed unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::Network(_))
    }

    /// Whether this failure needs re-authentication rather than retries.
    pub fn is_auth(&self) -> bool {
        matches!(self, SyncError::Unauthorized)
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            return SyncError::Network(err.to_string());
        }
        match err.status() {
            Some(status) if status == reqwest::StatusCode::UNAUTHORIZED => SyncError::Unauthorized,
            Some(status) if status == reqwest::StatusCode::FORBIDDEN => SyncError::Unauthorized,
            _ => SyncError::Protocol(err.to_string()),
        }
    }
}

/// Result type alias for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryability_per_family() {
        assert!(SyncError::Network("timed out".into()).is_retryable());
        assert!(!SyncError::Protocol("bad json".into()).is_retryable());
        assert!(!SyncError::Unauthorized.is_retryable());
        assert!(!SyncError::LocalData("missing id".into()).is_retryable());
    }

    #[test]
    fn auth_classifier() {
        assert!(SyncError::Unauthorized.is_auth());
        assert!(!SyncError::Network("offline".into()).is_auth());
    }

    #[test]
    fn engine_errors_convert() {
        let err: SyncError = satchel_engine::Error::MissingId.into();
        assert!(matches!(err, SyncError::Engine(_)));
    }
}

//! Error types for backend dispatch and workflow runs

use std::time::Duration;

use thiserror::Error;

use crate::types::{Label, Stage};

/// Whether a failure is worth retrying by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Transient,
    Permanent,
}

/// Failure of a single backend request
#[derive(Debug, Error)]
pub enum BackendError {
    /// No response within the configured bound
    #[error("{backend} timed out after {timeout:?}")]
    Timeout { backend: String, timeout: Duration },

    /// Connection refused, reset, DNS failure, ...
    #[error("{backend} request failed: {message}")]
    Transport { backend: String, message: String },

    /// Non-success HTTP status
    #[error("{backend} returned status {status}: {body}")]
    Status {
        backend: String,
        status: u16,
        body: String,
    },

    /// Body did not decode or carried no text
    #[error("{backend} returned a malformed response: {message}")]
    Malformed { backend: String, message: String },

    /// Backend cannot be used as configured (missing key, bad URL, ...)
    #[error("{backend} is misconfigured: {message}")]
    Config { backend: String, message: String },
}

impl BackendError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Timeout { .. } | Self::Transport { .. } => FailureKind::Transient,
            Self::Status { status, .. } if is_transient_status(*status) => FailureKind::Transient,
            _ => FailureKind::Permanent,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind() == FailureKind::Transient
    }

    /// Name of the backend that failed
    pub fn backend(&self) -> &str {
        match self {
            Self::Timeout { backend, .. }
            | Self::Transport { backend, .. }
            | Self::Status { backend, .. }
            | Self::Malformed { backend, .. }
            | Self::Config { backend, .. } => backend,
        }
    }
}

/// 408, 429 and the 5xx family
fn is_transient_status(status: u16) -> bool {
    status == 408 || status == 429 || (500..600).contains(&status)
}

/// Failure of a whole workflow run, as reported to the caller
#[derive(Debug, Error)]
pub enum RunError {
    #[error("{label} handler failed: {source}")]
    Backend {
        label: Label,
        #[source]
        source: BackendError,
    },

    #[error("workflow reached {stage} without a response")]
    Incomplete { stage: Stage },
}

impl RunError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Backend { source, .. } => source.is_retryable(),
            Self::Incomplete { .. } => false,
        }
    }

    /// Branch that was selected before the failure, if any
    pub fn label(&self) -> Option<Label> {
        match self {
            Self::Backend { label, .. } => Some(*label),
            Self::Incomplete { .. } => None,
        }
    }
}

/// Invalid router wiring
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RouterError {
    #[error("{slot} slot was given a {found} handler")]
    HandlerMismatch { slot: Label, found: Label },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(code: u16) -> BackendError {
        BackendError::Status {
            backend: "groq".to_string(),
            status: code,
            body: String::new(),
        }
    }

    #[test]
    fn test_transient_statuses() {
        for code in [408, 429, 500, 502, 503, 504] {
            assert!(status(code).is_retryable(), "{} should be retryable", code);
        }
    }

    #[test]
    fn test_permanent_statuses() {
        for code in [400, 401, 403, 404, 422] {
            assert_eq!(status(code).kind(), FailureKind::Permanent, "{}", code);
        }
    }

    #[test]
    fn test_timeout_and_transport_are_transient() {
        let timeout = BackendError::Timeout {
            backend: "openrouter".to_string(),
            timeout: Duration::from_secs(60),
        };
        let transport = BackendError::Transport {
            backend: "openrouter".to_string(),
            message: "connection refused".to_string(),
        };
        assert!(timeout.is_retryable());
        assert!(transport.is_retryable());
        assert_eq!(timeout.backend(), "openrouter");
    }

    #[test]
    fn test_malformed_and_config_are_permanent() {
        let malformed = BackendError::Malformed {
            backend: "groq".to_string(),
            message: "no choices".to_string(),
        };
        let config = BackendError::Config {
            backend: "groq".to_string(),
            message: "missing api key".to_string(),
        };
        assert!(!malformed.is_retryable());
        assert!(!config.is_retryable());
    }

    #[test]
    fn test_run_error_delegates_retryability() {
        let err = RunError::Backend {
            label: Label::Academic,
            source: status(503),
        };
        assert!(err.is_retryable());
        assert_eq!(err.label(), Some(Label::Academic));
        assert!(err.to_string().contains("academic handler failed"));

        let incomplete = RunError::Incomplete { stage: Stage::End };
        assert!(!incomplete.is_retryable());
        assert_eq!(incomplete.label(), None);
    }
}

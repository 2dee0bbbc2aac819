use serde::Serialize;
use std::time::Duration;
use strum::{Display, IntoStaticStr};
use thiserror::Error;

/// Typed failure of a single inference call
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InferenceError {
    /// No answer within the call timeout
    #[error("inference call timed out after {0:?}")]
    Timeout(Duration),

    /// Provider asked us to back off
    #[error("inference provider rate limited the request")]
    RateLimited,

    /// Output was not JSON or did not match the response schema
    #[error("inference output unparseable: {0}")]
    Unparseable(String),

    /// Provider unreachable, misconfigured or failing server-side
    #[error("inference provider unavailable: {0}")]
    Unavailable(String),
}

impl InferenceError {
    pub fn kind(&self) -> FailureKind {
        match self {
            InferenceError::Timeout(_) => FailureKind::Timeout,
            InferenceError::RateLimited => FailureKind::RateLimited,
            InferenceError::Unparseable(_) => FailureKind::Unparseable,
            InferenceError::Unavailable(_) => FailureKind::Unavailable,
        }
    }

    /// Timeouts and rate limits may succeed on a later attempt
    pub fn is_transient(&self) -> bool {
        matches!(self, InferenceError::Timeout(_) | InferenceError::RateLimited)
    }
}

/// Failure classification shared by logs, metrics and caller-facing errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display, IntoStaticStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FailureKind {
    Timeout,
    RateLimited,
    Unparseable,
    Unavailable,
    /// Inference succeeded but the stage rejected the content
    InvalidOutput,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        self.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_kinds() {
        assert!(InferenceError::Timeout(Duration::from_millis(10)).is_transient());
        assert!(InferenceError::RateLimited.is_transient());
        assert!(!InferenceError::Unparseable("x".into()).is_transient());
        assert!(!InferenceError::Unavailable("x".into()).is_transient());
    }

    #[test]
    fn test_kind_labels() {
        assert_eq!(InferenceError::RateLimited.kind().as_str(), "rate_limited");
        assert_eq!(FailureKind::InvalidOutput.to_string(), "invalid_output");
    }
}

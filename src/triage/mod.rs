//! Triage pipeline: normalise an alert, classify it, build a runbook and pick
//! an escalation target.
//!
//! Stages are pure: each builds a [`StagePrompt`](crate::inference::StagePrompt)
//! from its inputs and interprets the validated inference output it is handed.
//! [`TriageOrchestrator`] is the only component that calls the inference
//! client and the only one that retries or falls back.

mod classifier;
mod escalation;
mod normalizer;
mod orchestrator;
mod routing;
mod runbook;
mod state;

pub use classifier::ClassifierStage;
pub use escalation::EscalationStage;
pub use normalizer::{AlertNormalizer, ValidationError};
pub use orchestrator::{TriageError, TriageOrchestrator};
pub use routing::{RoutingError, RoutingPolicy, RoutingTable};
pub use runbook::RunbookStage;
pub use state::{PipelineRun, TriageState};

use crate::inference::{FailureKind, Stage};
use thiserror::Error;

/// Inference succeeded but the stage could not use what came back
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{stage} stage rejected model output: {message}")]
pub struct StageError {
    pub stage: Stage,
    pub message: String,
}

impl StageError {
    pub fn new(stage: Stage, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
        }
    }
}

/// Why a stage answered from deterministic policy instead of inference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackReason {
    /// The inference call failed or its output was unusable
    Failed(FailureKind),
    /// Classification confidence was below the gating threshold
    LowConfidence,
}

impl FallbackReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FallbackReason::Failed(kind) => kind.as_str(),
            FallbackReason::LowConfidence => "low_confidence",
        }
    }
}

impl std::fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Value produced by a non-fatal stage, noting whether a fallback was used
#[derive(Debug, Clone, PartialEq)]
pub struct StageOutcome<T> {
    pub value: T,
    pub fallback: Option<FallbackReason>,
}

impl<T> StageOutcome<T> {
    pub fn inferred(value: T) -> Self {
        Self {
            value,
            fallback: None,
        }
    }

    pub fn fallback(value: T, cause: FallbackReason) -> Self {
        Self {
            value,
            fallback: Some(cause),
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.fallback.is_some()
    }
}

/// Read a trimmed, non-empty string field from a model response
pub(crate) fn text_field(value: &serde_json::Value, field: &str) -> Option<String> {
    value
        .get(field)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

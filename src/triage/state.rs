//! Per-request pipeline state machine.

use crate::triage::TriageError;
use serde::Serialize;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::debug;
use uuid::Uuid;

/// Where a triage request is in the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TriageState {
    Received,
    Classifying,
    GeneratingRunbook,
    Escalating,
    /// Terminal; the only state that yields a result
    Completed,
    /// Terminal
    Failed,
}

impl TriageState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TriageState::Completed | TriageState::Failed)
    }

    /// Regular pipeline edges. Deadline aborts bypass this via
    /// [`PipelineRun::abort`].
    pub fn can_transition_to(&self, next: TriageState) -> bool {
        use TriageState::*;

        matches!(
            (self, next),
            (Received, Classifying)
                | (Received, Failed)
                | (Classifying, GeneratingRunbook)
                | (Classifying, Failed)
                | (GeneratingRunbook, Escalating)
                | (Escalating, Completed)
        )
    }
}

impl fmt::Display for TriageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriageState::Received => write!(f, "received"),
            TriageState::Classifying => write!(f, "classifying"),
            TriageState::GeneratingRunbook => write!(f, "generating_runbook"),
            TriageState::Escalating => write!(f, "escalating"),
            TriageState::Completed => write!(f, "completed"),
            TriageState::Failed => write!(f, "failed"),
        }
    }
}

/// A recorded state change
#[derive(Debug, Clone, PartialEq)]
pub struct StateTransition {
    pub from: TriageState,
    pub to: TriageState,
    /// Time since the request was received
    pub at: Duration,
}

/// Tracks one request through the pipeline
#[derive(Debug)]
pub struct PipelineRun {
    request_id: Uuid,
    state: TriageState,
    started: Instant,
    history: Vec<StateTransition>,
}

impl PipelineRun {
    pub fn new(request_id: Uuid) -> Self {
        Self {
            request_id,
            state: TriageState::Received,
            started: Instant::now(),
            history: Vec::new(),
        }
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn state(&self) -> TriageState {
        self.state
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn history(&self) -> &[StateTransition] {
        &self.history
    }

    /// Move along a regular pipeline edge
    pub fn transition(&mut self, next: TriageState) -> Result<(), TriageError> {
        if !self.state.can_transition_to(next) {
            return Err(TriageError::InvalidStateTransition {
                from: self.state,
                to: next,
            });
        }
        self.record(next);
        Ok(())
    }

    /// Force `Failed` from any non-terminal state; returns false if already terminal
    pub fn abort(&mut self) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.record(TriageState::Failed);
        true
    }

    fn record(&mut self, next: TriageState) {
        let at = self.elapsed();
        debug!(
            request_id = %self.request_id,
            from = %self.state,
            to = %next,
            elapsed_ms = at.as_millis() as u64,
            "Pipeline state change"
        );
        self.history.push(StateTransition {
            from: self.state,
            to: next,
            at,
        });
        self.state = next;
    }
}

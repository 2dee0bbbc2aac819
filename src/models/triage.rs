use crate::models::{Category, Severity};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};

/// Maximum length of a classification summary, in characters
pub const SUMMARY_MAX_CHARS: usize = 280;

/// Output of the classification stage
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Classification {
    severity: Severity,
    category: Category,
    confidence: f64,
    summary: String,
    root_cause_hypothesis: String,
    estimated_impact: String,
}

impl Classification {
    /// Build a classification. Confidence is clamped into `[0, 1]` (non-finite
    /// values become `0.0`) and the summary is cut at [`SUMMARY_MAX_CHARS`].
    pub fn new(
        severity: Severity,
        category: Category,
        confidence: f64,
        summary: impl Into<String>,
        root_cause_hypothesis: impl Into<String>,
        estimated_impact: impl Into<String>,
    ) -> Self {
        let confidence = if confidence.is_finite() {
            confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };

        let summary: String = summary.into();
        let summary = if summary.chars().count() > SUMMARY_MAX_CHARS {
            summary.chars().take(SUMMARY_MAX_CHARS).collect()
        } else {
            summary
        };

        Self {
            severity,
            category,
            confidence,
            summary,
            root_cause_hypothesis: root_cause_hypothesis.into(),
            estimated_impact: estimated_impact.into(),
        }
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn summary(&self) -> &str {
        &self.summary
    }

    pub fn root_cause_hypothesis(&self) -> &str {
        &self.root_cause_hypothesis
    }

    pub fn estimated_impact(&self) -> &str {
        &self.estimated_impact
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunbookStep {
    pub step_number: u32,
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_outcome: Option<String>,
}

/// Unnumbered remediation action, numbered when sequenced into a [`Runbook`]
#[derive(Debug, Clone, PartialEq)]
pub struct StepDraft {
    pub action: String,
    pub command: Option<String>,
    pub expected_outcome: Option<String>,
}

impl StepDraft {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            command: None,
            expected_outcome: None,
        }
    }
}

/// Ordered remediation steps; numbering is always 1..=len with no gaps.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(transparent)]
pub struct Runbook {
    steps: Vec<RunbookStep>,
}

impl Runbook {
    /// Number drafts 1..=n in iteration order. Returns `None` for an empty input.
    pub fn sequence<I>(drafts: I) -> Option<Self>
    where
        I: IntoIterator<Item = StepDraft>,
    {
        let steps: Vec<RunbookStep> = drafts
            .into_iter()
            .enumerate()
            .map(|(idx, draft)| RunbookStep {
                step_number: idx as u32 + 1,
                action: draft.action,
                command: draft.command,
                expected_outcome: draft.expected_outcome,
            })
            .collect();

        if steps.is_empty() {
            None
        } else {
            Some(Self { steps })
        }
    }

    /// One-step runbook
    pub fn single(draft: StepDraft) -> Self {
        Self {
            steps: vec![RunbookStep {
                step_number: 1,
                action: draft.action,
                command: draft.command,
                expected_outcome: draft.expected_outcome,
            }],
        }
    }

    pub fn steps(&self) -> &[RunbookStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Always false; a runbook holds at least one step
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn into_steps(self) -> Vec<RunbookStep> {
        self.steps
    }
}

/// On-call teams an incident can be routed to
#[derive(
    Debug,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    Hash,
    EnumString,
    Display,
    EnumIter,
)]
#[strum(ascii_case_insensitive)]
pub enum Team {
    Database,
    Platform,
    Payments,
    Network,
    Application,
    Security,
}

impl Team {
    /// Map a provider label (including common aliases) onto an on-call team.
    /// Accepts exactly the labels in [`Team::accepted_labels`], ignoring case.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "database" | "dba" | "data" => Some(Team::Database),
            "platform" | "infra" | "infrastructure" | "sre" => Some(Team::Platform),
            "payments" | "billing" => Some(Team::Payments),
            "network" | "netops" | "networking" => Some(Team::Network),
            "application" | "app" | "backend" => Some(Team::Application),
            "security" | "secops" => Some(Team::Security),
            _ => None,
        }
    }

    /// Every label accepted by [`Team::from_label`]
    pub fn accepted_labels() -> Vec<String> {
        let mut labels: Vec<String> = Team::iter().map(|t| t.to_string()).collect();
        labels.extend(
            [
                "dba", "data", "infra", "infrastructure", "sre", "billing", "netops",
                "networking", "app", "backend", "secops",
            ]
            .iter()
            .map(|s| s.to_string()),
        );
        labels
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EscalationDecision {
    pub team: Team,
    pub reason: String,
}

/// Complete, immutable outcome of one triage request
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TriageResult {
    classification: Classification,
    runbook: Runbook,
    escalation: EscalationDecision,
    model_used: String,
    pipeline_degraded: bool,
}

impl TriageResult {
    pub(crate) fn assemble(
        classification: Classification,
        runbook: Runbook,
        escalation: EscalationDecision,
        model_used: String,
        pipeline_degraded: bool,
    ) -> Self {
        Self {
            classification,
            runbook,
            escalation,
            model_used,
            pipeline_degraded,
        }
    }

    pub fn classification(&self) -> &Classification {
        &self.classification
    }

    pub fn runbook(&self) -> &Runbook {
        &self.runbook
    }

    pub fn escalation(&self) -> &EscalationDecision {
        &self.escalation
    }

    pub fn model_used(&self) -> &str {
        &self.model_used
    }

    pub fn pipeline_degraded(&self) -> bool {
        self.pipeline_degraded
    }
}

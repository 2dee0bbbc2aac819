use crate::inference::{
    FailureKind, FieldKind, InferenceError, ParsedOutput, ResponseSchema, Stage, StagePrompt,
};
use crate::models::{Classification, EscalationDecision, Runbook, Team};
use crate::triage::{text_field, FallbackReason, RoutingTable, StageOutcome};
use strum::IntoEnumIterator;
use tracing::{debug, warn};

const ESCALATION_MAX_TOKENS: u32 = 256;

/// Third pipeline stage: owning team and the reason for paging it.
///
/// Never fails. The routing table's override entries beat any inferred team,
/// and its route entries answer whenever inference is unavailable.
#[derive(Debug, Clone)]
pub struct EscalationStage {
    temperature: f32,
}

impl EscalationStage {
    pub fn new(temperature: f32) -> Self {
        Self { temperature }
    }

    pub fn prompt(&self, classification: &Classification, runbook: &Runbook) -> StagePrompt {
        let teams: Vec<String> = Team::iter().map(|t| t.to_string()).collect();
        let system = format!(
            "You route incidents to the on-call team that owns them. Reply with a single \
             JSON object {{\"team\": ..., \"reason\": ...}} where team is one of {} and \
             reason is one sentence explaining the choice.",
            teams.join(", ")
        );

        let steps: Vec<String> = runbook
            .steps()
            .iter()
            .map(|s| format!("{}. {}", s.step_number, s.action))
            .collect();
        let user = format!(
            "Severity: {}\nCategory: {}\nSummary: {}\nLikely cause: {}\nImpact: {}\n\
             Planned remediation:\n{}",
            classification.severity(),
            classification.category(),
            classification.summary(),
            classification.root_cause_hypothesis(),
            classification.estimated_impact(),
            steps.join("\n"),
        );

        StagePrompt::new(Stage::Escalation, system, user)
            .with_temperature(self.temperature)
            .with_max_tokens(ESCALATION_MAX_TOKENS)
    }

    pub fn schema(&self) -> ResponseSchema {
        ResponseSchema::new("escalation")
            .required("team", FieldKind::OneOf(Team::accepted_labels()))
            .required("reason", FieldKind::Text)
    }

    /// Combine the inference result with the routing table
    pub fn decide(
        &self,
        classification: &Classification,
        table: &RoutingTable,
        inferred: Result<ParsedOutput, InferenceError>,
    ) -> StageOutcome<EscalationDecision> {
        let proposal = match inferred {
            Ok(output) => match read_proposal(&output) {
                Some(proposal) => proposal,
                None => {
                    warn!(stage = %Stage::Escalation, "Escalation output unusable");
                    return self.decide_by_policy(
                        classification,
                        table,
                        FallbackReason::Failed(FailureKind::InvalidOutput),
                    );
                }
            },
            Err(err) => {
                return self.decide_by_policy(
                    classification,
                    table,
                    FallbackReason::Failed(err.kind()),
                )
            }
        };

        let category = classification.category();
        let decision = match table.override_for(category) {
            Some(team) if team != proposal.team => {
                debug!(
                    category = %category,
                    proposed = %proposal.team,
                    team = %team,
                    "Routing override applied"
                );
                EscalationDecision {
                    team,
                    reason: format!(
                        "Routing policy assigns {} incidents to the {} team (model suggested {}: {})",
                        category, team, proposal.team, proposal.reason
                    ),
                }
            }
            _ => proposal,
        };

        StageOutcome::inferred(decision)
    }

    /// Route from the table alone
    pub fn decide_by_policy(
        &self,
        classification: &Classification,
        table: &RoutingTable,
        cause: FallbackReason,
    ) -> StageOutcome<EscalationDecision> {
        let category = classification.category();
        let team = table.route(category);
        let reason = match cause {
            FallbackReason::LowConfidence => format!(
                "Classification confidence {:.2} is too low for automated routing; \
                 {} incidents default to the {} team",
                classification.confidence(),
                category,
                team
            ),
            FallbackReason::Failed(kind) => format!(
                "No escalation recommendation available ({}); {} incidents default to the {} team",
                kind, category, team
            ),
        };

        StageOutcome::fallback(EscalationDecision { team, reason }, cause)
    }
}

fn read_proposal(output: &ParsedOutput) -> Option<EscalationDecision> {
    let team = output
        .value
        .get("team")
        .and_then(|v| v.as_str())
        .and_then(Team::from_label)?;
    let reason = text_field(&output.value, "reason")
        .unwrap_or_else(|| format!("Model selected the {} team", team));

    Some(EscalationDecision { team, reason })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Category, Severity, StepDraft};
    use serde_json::json;

    fn classification(category: Category, confidence: f64) -> Classification {
        Classification::new(Severity::P1, category, confidence, "summary", "cause", "impact")
    }

    fn output(team: &str, reason: &str) -> Result<ParsedOutput, InferenceError> {
        Ok(ParsedOutput {
            value: json!({ "team": team, "reason": reason }),
            provider: "scripted".to_string(),
            model: "test-model".to_string(),
        })
    }

    #[test]
    fn test_inferred_team_kept_without_override() {
        let outcome = EscalationStage::new(0.1).decide(
            &classification(Category::Network, 0.9),
            &RoutingTable::default(),
            output("networking", "BGP flap"),
        );

        assert!(!outcome.is_degraded());
        assert_eq!(outcome.value.team, Team::Network);
        assert_eq!(outcome.value.reason, "BGP flap");
    }

    #[test]
    fn test_override_beats_inference() {
        let outcome = EscalationStage::new(0.1).decide(
            &classification(Category::Database, 0.9),
            &RoutingTable::default(),
            output("Payments", "checkout errors"),
        );

        assert!(!outcome.is_degraded());
        assert_eq!(outcome.value.team, Team::Database);
        assert!(outcome.value.reason.contains("Payments"));
    }

    #[test]
    fn test_inference_failure_uses_route_table() {
        let outcome = EscalationStage::new(0.1).decide(
            &classification(Category::Application, 0.9),
            &RoutingTable::default(),
            Err(InferenceError::RateLimited),
        );

        assert_eq!(
            outcome.fallback,
            Some(FallbackReason::Failed(FailureKind::RateLimited))
        );
        assert_eq!(outcome.value.team, Team::Application);
        assert!(outcome.value.reason.contains("rate_limited"));
    }

    #[test]
    fn test_low_confidence_reason() {
        let outcome = EscalationStage::new(0.1).decide_by_policy(
            &classification(Category::Unknown, 0.1),
            &RoutingTable::default(),
            FallbackReason::LowConfidence,
        );

        assert_eq!(outcome.value.team, Team::Platform);
        assert!(outcome.value.reason.contains("0.10"));
    }

    #[test]
    fn test_prompt_lists_runbook() {
        let runbook = Runbook::single(StepDraft::new("Fail over primary"));
        let prompt =
            EscalationStage::new(0.1).prompt(&classification(Category::Database, 0.8), &runbook);

        assert_eq!(prompt.stage, Stage::Escalation);
        assert!(prompt.user.contains("1. Fail over primary"));
        assert!(prompt.system.contains("Payments"));
    }

    #[test]
    fn test_schema_and_team_labels_agree() {
        let schema = EscalationStage::new(0.1).schema();
        for label in ["network", "SecOps", " backend ", "backend team", "marketing"] {
            let accepted = schema.validate(&json!({ "team": label, "reason": "r" })).is_ok();
            assert_eq!(accepted, Team::from_label(label).is_some(), "{}", label);
        }
    }
}

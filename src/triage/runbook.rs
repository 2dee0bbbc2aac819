use crate::inference::{
    FailureKind, FieldKind, InferenceError, ParsedOutput, ResponseSchema, Stage, StagePrompt,
};
use crate::models::{Category, Classification, IncidentInput, Runbook, StepDraft};
use crate::triage::{text_field, FallbackReason, StageError, StageOutcome};
use serde_json::Value as JsonValue;
use tracing::{debug, warn};

const RUNBOOK_MAX_TOKENS: u32 = 1024;

/// Second pipeline stage: ordered remediation steps for a classified incident
#[derive(Debug, Clone)]
pub struct RunbookStage {
    max_steps: usize,
    temperature: f32,
}

impl RunbookStage {
    pub fn new(max_steps: usize, temperature: f32) -> Self {
        Self {
            max_steps: max_steps.max(1),
            temperature,
        }
    }

    pub fn prompt(&self, classification: &Classification, input: &IncidentInput) -> StagePrompt {
        let system = format!(
            "You are an SRE writing a remediation runbook. Reply with a single JSON object \
             of the form {{\"runbook_steps\": [{{\"action\": ..., \"command\": ..., \
             \"expected_outcome\": ...}}]}}. List at most {} steps in execution order. \
             `command` and `expected_outcome` are optional; only give commands an on-call \
             engineer could run as-is.",
            self.max_steps
        );

        let user = format!(
            "Severity: {}\nCategory: {}\nSummary: {}\nLikely cause: {}\nEnvironment: {}\n\
             Service: {}\nAlert:\n{}",
            classification.severity(),
            classification.category(),
            classification.summary(),
            classification.root_cause_hypothesis(),
            input.environment(),
            input.service_name().unwrap_or("unspecified"),
            input.alert_text(),
        );

        StagePrompt::new(Stage::Runbook, system, user)
            .with_temperature(self.temperature)
            .with_max_tokens(RUNBOOK_MAX_TOKENS)
    }

    pub fn schema(&self) -> ResponseSchema {
        let step = ResponseSchema::new("runbook_step")
            .optional("step_number", FieldKind::Number { min: None, max: None })
            .optional("action", FieldKind::Text)
            .optional("command", FieldKind::Text)
            .optional("expected_outcome", FieldKind::Text);

        ResponseSchema::new("runbook").required("runbook_steps", FieldKind::ObjectList(Box::new(step)))
    }

    /// Turn validated output into a runbook.
    ///
    /// Provider numbering is ignored; steps keep their array order, are
    /// renumbered from 1 and capped at the configured maximum.
    pub fn build(&self, output: &ParsedOutput) -> Result<Runbook, StageError> {
        let drafts: Vec<StepDraft> = output
            .value
            .get("runbook_steps")
            .and_then(JsonValue::as_array)
            .into_iter()
            .flatten()
            .filter_map(|step| {
                let action = text_field(step, "action")?;
                Some(StepDraft {
                    action,
                    command: text_field(step, "command"),
                    expected_outcome: text_field(step, "expected_outcome"),
                })
            })
            .collect();

        if drafts.len() > self.max_steps {
            debug!(
                returned = drafts.len(),
                max_steps = self.max_steps,
                "Capping runbook length"
            );
        }

        Runbook::sequence(drafts.into_iter().take(self.max_steps))
            .ok_or_else(|| StageError::new(Stage::Runbook, "no usable runbook steps"))
    }

    /// Runbook used when inference could not produce one
    pub fn fallback(&self, category: Category) -> Runbook {
        let step = StepDraft::new(format!(
            "Escalate to on-call; no automated runbook available for category {}",
            category
        ));
        Runbook::single(step)
    }

    /// Resolve the stage from the inference result, never failing
    pub fn resolve(
        &self,
        category: Category,
        inferred: Result<ParsedOutput, InferenceError>,
    ) -> StageOutcome<Runbook> {
        let cause = match inferred {
            Ok(output) => match self.build(&output) {
                Ok(runbook) => return StageOutcome::inferred(runbook),
                Err(err) => {
                    warn!(stage = %Stage::Runbook, error = %err, "Runbook output unusable");
                    FailureKind::InvalidOutput
                }
            },
            Err(err) => err.kind(),
        };

        StageOutcome::fallback(self.fallback(category), FallbackReason::Failed(cause))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Severity;
    use serde_json::json;

    fn output(value: JsonValue) -> ParsedOutput {
        ParsedOutput {
            value,
            provider: "scripted".to_string(),
            model: "test-model".to_string(),
        }
    }

    fn numbers(runbook: &Runbook) -> Vec<u32> {
        runbook.steps().iter().map(|s| s.step_number).collect()
    }

    #[test]
    fn test_renumbers_and_drops_blank_actions() {
        let runbook = RunbookStage::new(10, 0.2)
            .build(&output(json!({
                "runbook_steps": [
                    {"step_number": 7, "action": "Check pool usage", "command": "psql -c 'select 1'"},
                    {"step_number": 2, "action": "   "},
                    {"step_number": 7, "action": "Restart pgbouncer", "command": " ", "expected_outcome": "Pool drains"},
                ]
            })))
            .unwrap();

        assert_eq!(numbers(&runbook), vec![1, 2]);
        assert_eq!(runbook.steps()[0].action, "Check pool usage");
        assert_eq!(runbook.steps()[1].command, None);
        assert_eq!(runbook.steps()[1].expected_outcome.as_deref(), Some("Pool drains"));
    }

    #[test]
    fn test_caps_preserving_order() {
        let steps: Vec<JsonValue> = (0..15)
            .map(|i| json!({"action": format!("step {}", i)}))
            .collect();
        let runbook = RunbookStage::new(10, 0.2)
            .build(&output(json!({ "runbook_steps": steps })))
            .unwrap();

        assert_eq!(runbook.len(), 10);
        assert_eq!(numbers(&runbook), (1..=10).collect::<Vec<u32>>());
        assert_eq!(runbook.steps()[0].action, "step 0");
        assert_eq!(runbook.steps()[9].action, "step 9");
    }

    #[test]
    fn test_empty_runbook_falls_back() {
        let stage = RunbookStage::new(10, 0.2);
        let outcome = stage.resolve(
            Category::Network,
            Ok(output(json!({ "runbook_steps": [{"action": ""}] }))),
        );

        assert_eq!(
            outcome.fallback,
            Some(FallbackReason::Failed(FailureKind::InvalidOutput))
        );
        assert_eq!(outcome.value.len(), 1);
    }

    #[test]
    fn test_inference_failure_falls_back_naming_category() {
        let stage = RunbookStage::new(10, 0.2);
        let outcome = stage.resolve(
            Category::Database,
            Err(InferenceError::Unavailable("down".to_string())),
        );

        assert!(outcome.is_degraded());
        assert_eq!(numbers(&outcome.value), vec![1]);
        assert_eq!(
            outcome.value.steps()[0].action,
            "Escalate to on-call; no automated runbook available for category database"
        );
    }

    #[test]
    fn test_prompt_mentions_classification() {
        let classification =
            Classification::new(Severity::P1, Category::Database, 0.9, "Pool exhausted", "Leak", "All");
        let input = crate::triage::AlertNormalizer::new(8000, "production")
            .normalize("pool exhausted", None, None)
            .unwrap();
        let prompt = RunbookStage::new(5, 0.2).prompt(&classification, &input);

        assert_eq!(prompt.stage, Stage::Runbook);
        assert_eq!(prompt.max_tokens, RUNBOOK_MAX_TOKENS);
        assert!(prompt.user.contains("Category: database"));
        assert!(prompt.system.contains("at most 5 steps"));
    }
}

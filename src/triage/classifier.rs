use crate::inference::{FieldKind, ParsedOutput, ResponseSchema, Stage, StagePrompt};
use crate::models::{Category, Classification, IncidentInput, Severity};
use crate::triage::{text_field, StageError};
use serde_json::Value as JsonValue;
use tracing::debug;

const CLASSIFIER_MAX_TOKENS: u32 = 512;
const UNESTIMATED_IMPACT: &str = "Impact not estimated";

/// First pipeline stage: severity, category and a short diagnosis
#[derive(Debug, Clone)]
pub struct ClassifierStage {
    default_category: Category,
    temperature: f32,
}

impl ClassifierStage {
    pub fn new(default_category: Category, temperature: f32) -> Self {
        Self {
            default_category,
            temperature,
        }
    }

    pub fn prompt(&self, input: &IncidentInput) -> StagePrompt {
        let system = format!(
            "You are an SRE triaging a production alert. Reply with a single JSON object \
             with these fields:\n\
             - severity: \"P1\" (outage, revenue impact or data-loss risk), \"P2\" \
             (significant degradation or partial outage) or \"P3\" (minor, no immediate \
             user impact)\n\
             - severity_candidates: optional list of every severity you consider plausible\n\
             - category: one of {}\n\
             - confidence: number between 0 and 1\n\
             - summary: one sentence, at most 280 characters\n\
             - root_cause_hypothesis: the most likely cause\n\
             - estimated_impact: who or what is affected",
            Category::labels().join(", ")
        );

        let mut user = format!("Environment: {}\n", input.environment());
        if let Some(service) = input.service_name() {
            user.push_str(&format!("Service: {}\n", service));
        }
        user.push_str(&format!("Alert:\n{}", input.alert_text()));

        StagePrompt::new(Stage::Classification, system, user)
            .with_temperature(self.temperature)
            .with_max_tokens(CLASSIFIER_MAX_TOKENS)
    }

    pub fn schema(&self) -> ResponseSchema {
        ResponseSchema::new("classification")
            .required("severity", FieldKind::Text)
            .optional("severity_candidates", FieldKind::TextList)
            .required("category", FieldKind::Text)
            .optional("confidence", FieldKind::Number { min: None, max: None })
            .required("summary", FieldKind::Text)
            .required("root_cause_hypothesis", FieldKind::Text)
            .optional("estimated_impact", FieldKind::Text)
    }

    /// Interpret a validated classification response
    pub fn classify(&self, output: &ParsedOutput) -> Result<Classification, StageError> {
        let value = &output.value;

        let summary = text_field(value, "summary")
            .ok_or_else(|| StageError::new(Stage::Classification, "summary is blank"))?;
        let root_cause = text_field(value, "root_cause_hypothesis").ok_or_else(|| {
            StageError::new(Stage::Classification, "root_cause_hypothesis is blank")
        })?;
        let impact =
            text_field(value, "estimated_impact").unwrap_or_else(|| UNESTIMATED_IMPACT.to_string());

        let severity = pick_severity(value).unwrap_or_else(|| {
            debug!(raw = ?value.get("severity"), "Unrecognised severity, assuming P2");
            Severity::P2
        });

        let category = value
            .get("category")
            .and_then(JsonValue::as_str)
            .and_then(Category::from_label)
            .unwrap_or_else(|| {
                debug!(
                    raw = ?value.get("category"),
                    default = %self.default_category,
                    "Unrecognised category, using default"
                );
                self.default_category
            });

        let confidence = value
            .get("confidence")
            .and_then(JsonValue::as_f64)
            .unwrap_or(0.0);

        Ok(Classification::new(
            severity, category, confidence, summary, root_cause, impact,
        ))
    }
}

/// Most urgent recognised severity among `severity` and `severity_candidates`
fn pick_severity(value: &JsonValue) -> Option<Severity> {
    let primary = value.get("severity").and_then(JsonValue::as_str);
    let candidates = value
        .get("severity_candidates")
        .and_then(JsonValue::as_array)
        .into_iter()
        .flatten()
        .filter_map(JsonValue::as_str);

    Severity::most_urgent(primary.into_iter().chain(candidates).filter_map(Severity::from_label))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::triage::AlertNormalizer;
    use serde_json::json;

    fn stage() -> ClassifierStage {
        ClassifierStage::new(Category::Unknown, 0.1)
    }

    fn output(value: JsonValue) -> ParsedOutput {
        ParsedOutput {
            value,
            provider: "scripted".to_string(),
            model: "test-model".to_string(),
        }
    }

    #[test]
    fn test_prompt_carries_alert_and_hints() {
        let input = AlertNormalizer::new(8000, "production")
            .normalize("db pool exhausted", Some("orders-db"), None)
            .unwrap();
        let prompt = stage().prompt(&input);

        assert_eq!(prompt.stage, Stage::Classification);
        assert!(prompt.user.contains("db pool exhausted"));
        assert!(prompt.user.contains("Service: orders-db"));
        assert!(prompt.system.contains("dependency"));
        assert_eq!(prompt.temperature, 0.1);
    }

    #[test]
    fn test_classify_happy_path() {
        let classification = stage()
            .classify(&output(json!({
                "severity": "P1",
                "category": "database",
                "confidence": 0.92,
                "summary": "Connection pool exhausted",
                "root_cause_hypothesis": "Leaked connections",
                "estimated_impact": "Checkout failing"
            })))
            .unwrap();

        assert_eq!(classification.severity(), Severity::P1);
        assert_eq!(classification.category(), Category::Database);
        assert_eq!(classification.confidence(), 0.92);
        assert_eq!(classification.estimated_impact(), "Checkout failing");
    }

    #[test]
    fn test_unknown_labels_fall_back() {
        let classification = stage()
            .classify(&output(json!({
                "severity": "critical-ish",
                "category": "cosmic rays",
                "confidence": 4.2,
                "summary": "s",
                "root_cause_hypothesis": "r"
            })))
            .unwrap();

        assert_eq!(classification.severity(), Severity::P2);
        assert_eq!(classification.category(), Category::Unknown);
        assert_eq!(classification.confidence(), 1.0);
        assert_eq!(classification.estimated_impact(), UNESTIMATED_IMPACT);
    }

    #[test]
    fn test_severity_candidates_pick_most_urgent() {
        let classification = stage()
            .classify(&output(json!({
                "severity": "P3",
                "severity_candidates": ["P2", "P1", "bogus"],
                "category": "network",
                "summary": "s",
                "root_cause_hypothesis": "r"
            })))
            .unwrap();

        assert_eq!(classification.severity(), Severity::P1);
        assert_eq!(classification.confidence(), 0.0);
    }

    #[test]
    fn test_blank_summary_is_stage_error() {
        let err = stage()
            .classify(&output(json!({
                "severity": "P1",
                "category": "network",
                "summary": "   ",
                "root_cause_hypothesis": "r"
            })))
            .unwrap_err();
        assert_eq!(err.stage, Stage::Classification);
    }

    #[test]
    fn test_classify_is_deterministic() {
        let raw = json!({
            "severity": "P2",
            "category": "app",
            "confidence": 0.5,
            "summary": "Latency up",
            "root_cause_hypothesis": "GC pauses"
        });
        assert_eq!(
            stage().classify(&output(raw.clone())).unwrap(),
            stage().classify(&output(raw)).unwrap()
        );
    }
}

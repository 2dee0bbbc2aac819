use crate::config::{InferenceConfig, ProviderKind};
use crate::inference::{InferenceError, OpenAiCompatibleProvider, ResponseSchema, StagePrompt};
use crate::metrics::{INFERENCE_DURATION_SECONDS, INFERENCE_REQUESTS_TOTAL};
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, warn};

/// A single text-generation backend
#[async_trait]
pub trait InferenceProvider: Send + Sync + 'static {
    /// Provider name used in logs and metrics
    fn name(&self) -> &str;

    /// Model identifier reported in triage results
    fn model(&self) -> &str;

    /// Whether the provider has what it needs (credentials) to serve calls
    fn is_configured(&self) -> bool {
        true
    }

    /// Return the raw completion text for `prompt`
    async fn complete(
        &self,
        prompt: &StagePrompt,
        timeout: Duration,
    ) -> Result<String, InferenceError>;
}

/// Schema-validated model output
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedOutput {
    pub value: JsonValue,
    pub provider: String,
    pub model: String,
}

/// Front door for every inference call made by the pipeline.
///
/// Providers are tried in registration order, moving on only when one reports
/// [`InferenceError::Unavailable`]. Any other failure is returned as-is.
#[derive(Clone)]
pub struct InferenceClient {
    providers: Vec<Arc<dyn InferenceProvider>>,
}

impl InferenceClient {
    pub fn new(providers: Vec<Arc<dyn InferenceProvider>>) -> Self {
        Self { providers }
    }

    /// Build every configured provider, keeping configuration order
    pub fn from_config(config: &InferenceConfig) -> crate::error::Result<Self> {
        let mut providers: Vec<Arc<dyn InferenceProvider>> =
            Vec::with_capacity(config.providers.len());

        for provider in &config.providers {
            match provider.kind {
                ProviderKind::OpenaiCompatible => {
                    providers.push(Arc::new(OpenAiCompatibleProvider::from_config(provider)?));
                }
            }
        }

        Ok(Self::new(providers))
    }

    pub fn single(provider: Arc<dyn InferenceProvider>) -> Self {
        Self::new(vec![provider])
    }

    pub fn providers(&self) -> &[Arc<dyn InferenceProvider>] {
        &self.providers
    }

    /// True when at least one provider can serve calls
    pub fn is_live(&self) -> bool {
        self.providers.iter().any(|p| p.is_configured())
    }

    /// Model of the first configured provider
    pub fn primary_model(&self) -> Option<&str> {
        self.providers
            .iter()
            .find(|p| p.is_configured())
            .map(|p| p.model())
    }

    /// Issue a structured-output request and validate the answer
    pub async fn infer(
        &self,
        prompt: &StagePrompt,
        schema: &ResponseSchema,
        call_timeout: Duration,
    ) -> Result<ParsedOutput, InferenceError> {
        let mut last_error =
            InferenceError::Unavailable("no inference provider configured".to_string());

        for provider in &self.providers {
            let start = Instant::now();
            let outcome = match timeout(call_timeout, provider.complete(prompt, call_timeout)).await
            {
                Ok(result) => result,
                Err(_) => Err(InferenceError::Timeout(call_timeout)),
            };

            INFERENCE_DURATION_SECONDS
                .with_label_values(&[provider.name(), prompt.stage.as_str()])
                .observe(start.elapsed().as_secs_f64());

            let parsed = outcome.and_then(|raw| {
                let value = extract_json(&raw).map_err(InferenceError::Unparseable)?;
                schema
                    .validate(&value)
                    .map_err(InferenceError::Unparseable)?;
                Ok(value)
            });

            match parsed {
                Ok(value) => {
                    INFERENCE_REQUESTS_TOTAL
                        .with_label_values(&[provider.name(), prompt.stage.as_str(), "success"])
                        .inc();
                    debug!(
                        provider = provider.name(),
                        stage = %prompt.stage,
                        elapsed_ms = start.elapsed().as_millis() as u64,
                        "Inference call succeeded"
                    );
                    return Ok(ParsedOutput {
                        value,
                        provider: provider.name().to_string(),
                        model: provider.model().to_string(),
                    });
                }
                Err(err) => {
                    INFERENCE_REQUESTS_TOTAL
                        .with_label_values(&[
                            provider.name(),
                            prompt.stage.as_str(),
                            err.kind().as_str(),
                        ])
                        .inc();
                    warn!(
                        provider = provider.name(),
                        stage = %prompt.stage,
                        kind = %err.kind(),
                        error = %err,
                        "Inference call failed"
                    );

                    if !matches!(err, InferenceError::Unavailable(_)) {
                        return Err(err);
                    }
                    last_error = err;
                }
            }
        }

        Err(last_error)
    }
}

/// Parse model output as JSON, tolerating a Markdown code fence or prose
/// around a single top-level object.
pub fn extract_json(raw: &str) -> Result<JsonValue, String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err("empty model output".to_string());
    }

    if let Ok(value) = serde_json::from_str(trimmed) {
        return Ok(value);
    }

    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.trim_end().strip_suffix("```"))
        .map(str::trim);
    if let Some(inner) = unfenced {
        if let Ok(value) = serde_json::from_str(inner) {
            return Ok(value);
        }
    }

    match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if start < end => serde_json::from_str(&trimmed[start..=end])
            .map_err(|e| format!("model output is not valid JSON: {}", e)),
        _ => Err("model output contains no JSON object".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::{
        FieldKind, ScriptedProvider, ScriptedResponse, Stage, StagePrompt,
    };
    use serde_json::json;

    fn prompt() -> StagePrompt {
        StagePrompt::new(Stage::Escalation, "system", "user")
    }

    fn schema() -> ResponseSchema {
        ResponseSchema::new("escalation")
            .required("team", FieldKind::Text)
            .required("reason", FieldKind::Text)
    }

    #[test]
    fn test_extract_json_variants() {
        assert_eq!(extract_json(r#"{"a":1}"#).unwrap(), json!({"a": 1}));
        assert_eq!(
            extract_json("```json\n{\"a\": 2}\n```").unwrap(),
            json!({"a": 2})
        );
        assert_eq!(
            extract_json("Here you go: {\"a\": 3} hope it helps").unwrap(),
            json!({"a": 3})
        );
        assert!(extract_json("   ").is_err());
        assert!(extract_json("no json here").is_err());
    }

    #[tokio::test]
    async fn test_infer_validates_schema() {
        let provider = Arc::new(
            ScriptedProvider::new("scripted-model")
                .on(Stage::Escalation, ScriptedResponse::json(json!({"team": "Network"}))),
        );
        let client = InferenceClient::single(provider);

        let err = client
            .infer(&prompt(), &schema(), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, InferenceError::Unparseable(_)));
    }

    #[tokio::test]
    async fn test_infer_fails_over_on_unavailable() {
        let primary = Arc::new(
            ScriptedProvider::new("primary-model").named("primary").on(
                Stage::Escalation,
                ScriptedResponse::fail(InferenceError::Unavailable("down".into())),
            ),
        );
        let secondary = Arc::new(
            ScriptedProvider::new("secondary-model").named("secondary").on(
                Stage::Escalation,
                ScriptedResponse::json(json!({"team": "Network", "reason": "dns"})),
            ),
        );
        let providers: Vec<Arc<dyn InferenceProvider>> = vec![primary.clone(), secondary.clone()];
        let client = InferenceClient::new(providers);

        let output = client
            .infer(&prompt(), &schema(), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(output.model, "secondary-model");
        assert_eq!(output.provider, "secondary");
        assert_eq!(primary.calls(Stage::Escalation), 1);
        assert_eq!(secondary.calls(Stage::Escalation), 1);
    }

    #[tokio::test]
    async fn test_infer_does_not_fail_over_on_rate_limit() {
        let primary = Arc::new(
            ScriptedProvider::new("primary-model")
                .on(Stage::Escalation, ScriptedResponse::fail(InferenceError::RateLimited)),
        );
        let secondary = Arc::new(ScriptedProvider::new("secondary-model"));
        let providers: Vec<Arc<dyn InferenceProvider>> = vec![primary, secondary.clone()];
        let client = InferenceClient::new(providers);

        let err = client
            .infer(&prompt(), &schema(), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert_eq!(err, InferenceError::RateLimited);
        assert_eq!(secondary.calls(Stage::Escalation), 0);
    }

    #[tokio::test]
    async fn test_infer_enforces_timeout() {
        let provider = Arc::new(ScriptedProvider::new("slow-model").on(
            Stage::Escalation,
            ScriptedResponse::delayed(
                Duration::from_millis(500),
                ScriptedResponse::json(json!({"team": "Network", "reason": "late"})),
            ),
        ));
        let client = InferenceClient::single(provider.clone());

        let err = client
            .infer(&prompt(), &schema(), Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, InferenceError::Timeout(_)));
        assert_eq!(provider.completed(Stage::Escalation), 0);
    }

    #[test]
    fn test_from_config_keeps_order() {
        let mut config = InferenceConfig::default();
        let mut backup = config.providers[0].clone();
        backup.name = "backup".to_string();
        backup.api_key_env = None;
        config.providers.push(backup);

        let client = InferenceClient::from_config(&config).unwrap();
        let names: Vec<&str> = client.providers().iter().map(|p| p.name()).collect();
        assert_eq!(names, vec!["gradient", "backup"]);
        assert!(!client.providers()[1].is_configured());
    }

    #[tokio::test]
    async fn test_no_providers_is_unavailable() {
        let client = InferenceClient::new(Vec::new());
        assert!(!client.is_live());

        let err = client
            .infer(&prompt(), &schema(), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, InferenceError::Unavailable(_)));
    }
}

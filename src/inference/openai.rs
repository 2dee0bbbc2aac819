use crate::config::ProviderConfig;
use crate::error::{AppError, Result};
use crate::inference::{InferenceError, InferenceProvider, StagePrompt};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Provider speaking the OpenAI `chat/completions` dialect
/// (DigitalOcean Gradient, OpenAI, vLLM, Ollama, ...)
#[derive(Clone)]
pub struct OpenAiCompatibleProvider {
    name: String,
    model: String,
    endpoint: String,
    api_key: Option<String>,
    json_mode: bool,
    client: Client,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiCompatibleProvider {
    /// Create a provider from configuration, resolving the API key from the
    /// environment. A missing key is not an error here; calls fail as
    /// `Unavailable` until one is supplied.
    pub fn from_config(config: &ProviderConfig) -> Result<Self> {
        Self::new(
            config.name.clone(),
            config.base_url.clone(),
            config.model.clone(),
            config.api_key(),
            config.json_mode,
            Duration::from_secs(config.connect_timeout_secs),
        )
    }

    pub fn new(
        name: String,
        base_url: String,
        model: String,
        api_key: Option<String>,
        json_mode: bool,
        connect_timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| AppError::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        let endpoint = format!("{}/chat/completions", base_url.trim_end_matches('/'));

        Ok(Self {
            name,
            model,
            endpoint,
            api_key,
            json_mode,
            client,
        })
    }

    fn map_send_error(&self, err: reqwest::Error, timeout: Duration) -> InferenceError {
        if err.is_timeout() {
            InferenceError::Timeout(timeout)
        } else if err.is_connect() {
            InferenceError::Unavailable(format!("failed to connect to {}: {}", self.name, err))
        } else {
            InferenceError::Unavailable(format!("request to {} failed: {}", self.name, err))
        }
    }
}

#[async_trait]
impl InferenceProvider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn complete(
        &self,
        prompt: &StagePrompt,
        timeout: Duration,
    ) -> std::result::Result<String, InferenceError> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            InferenceError::Unavailable(format!("no API key configured for {}", self.name))
        })?;

        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &prompt.system,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt.user,
                },
            ],
            temperature: prompt.temperature,
            max_tokens: prompt.max_tokens,
            response_format: self.json_mode.then_some(ResponseFormat {
                kind: "json_object",
            }),
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .header("User-Agent", "incident-triage/0.1")
            .timeout(timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_send_error(e, timeout))?;

        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(InferenceError::RateLimited);
        }

        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            warn!(
                provider = %self.name,
                status = status.as_u16(),
                body = %detail.chars().take(512).collect::<String>(),
                "Inference provider returned non-success status"
            );
            return Err(InferenceError::Unavailable(format!(
                "{} returned HTTP {}",
                self.name, status
            )));
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                InferenceError::Timeout(timeout)
            } else {
                InferenceError::Unparseable(format!("malformed completion body: {}", e))
            }
        })?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| {
                InferenceError::Unparseable("completion contained no message content".to_string())
            })?;

        debug!(
            provider = %self.name,
            stage = %prompt.stage,
            content_length = content.len(),
            "Received completion"
        );

        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::Stage;

    fn provider(api_key: Option<&str>) -> OpenAiCompatibleProvider {
        OpenAiCompatibleProvider::new(
            "test".to_string(),
            "http://127.0.0.1:9/v1/".to_string(),
            "test-model".to_string(),
            api_key.map(str::to_string),
            true,
            Duration::from_millis(200),
        )
        .unwrap()
    }

    #[test]
    fn test_endpoint_joins_base_url() {
        assert_eq!(provider(None).endpoint, "http://127.0.0.1:9/v1/chat/completions");
    }

    #[test]
    fn test_configured_only_with_key() {
        assert!(!provider(None).is_configured());
        assert!(provider(Some("k")).is_configured());
    }

    #[tokio::test]
    async fn test_missing_key_is_unavailable() {
        let prompt = StagePrompt::new(Stage::Classification, "s", "u");
        let err = provider(None)
            .complete(&prompt, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, InferenceError::Unavailable(_)));
    }

    #[test]
    fn test_request_body_shape() {
        let body = ChatRequest {
            model: "m",
            messages: vec![ChatMessage {
                role: "user",
                content: "hi",
            }],
            temperature: 0.1,
            max_tokens: 16,
            response_format: Some(ResponseFormat {
                kind: "json_object",
            }),
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["response_format"]["type"], "json_object");
        assert_eq!(value["messages"][0]["role"], "user");
    }
}

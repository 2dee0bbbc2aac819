use crate::models::Category;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Inference providers, tried in order
    #[serde(default)]
    pub inference: InferenceConfig,

    /// Pipeline policy bounds
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Escalation routing tables
    #[serde(default)]
    pub routing: RoutingConfig,
}

impl Config {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self, config::ConfigError> {
        let config_path =
            std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config/triage.toml".to_string());

        config::Config::builder()
            // Start with default values
            .add_source(config::File::from_str(
                include_str!("../config/default.toml"),
                config::FileFormat::Toml,
            ))
            // Override with config file if it exists
            .add_source(config::File::with_name(&config_path).required(false))
            // Override with environment variables (prefix: TRIAGE_)
            .add_source(
                config::Environment::with_prefix("TRIAGE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            observability: ObservabilityConfig::default(),
            inference: InferenceConfig::default(),
            pipeline: PipelineConfig::default(),
            routing: RoutingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP server host
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP server port
    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// Expose `GET/PUT /v1/routing`
    #[serde(default = "default_true")]
    pub admin_api_enabled: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            http_port: default_http_port(),
            admin_api_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub json_logs: bool,

    /// Service name
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Enable Prometheus metrics
    #[serde(default = "default_true")]
    pub prometheus_enabled: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: false,
            service_name: default_service_name(),
            prometheus_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceConfig {
    #[serde(default = "default_providers")]
    pub providers: Vec<ProviderConfig>,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            providers: default_providers(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Name used in logs and metrics
    pub name: String,

    #[serde(default)]
    pub kind: ProviderKind,

    /// Base URL of an OpenAI-compatible API, e.g. `https://inference.do-ai.run/v1`
    pub base_url: String,

    /// Model identifier sent with every request
    pub model: String,

    /// Environment variable holding the API key
    pub api_key_env: Option<String>,

    /// Request `response_format = json_object`
    #[serde(default = "default_true")]
    pub json_mode: bool,

    /// TCP connect timeout (seconds)
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

impl ProviderConfig {
    /// Resolve the API key from the environment, ignoring blank values
    pub fn api_key(&self) -> Option<String> {
        self.api_key_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
            .filter(|key| !key.trim().is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    #[default]
    OpenaiCompatible,
}

/// Retry, timeout and size bounds applied by the orchestrator and stages
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Alert text beyond this many characters is truncated
    #[serde(default = "default_max_alert_chars")]
    pub max_alert_chars: usize,

    /// Upper bound on runbook length
    #[serde(default = "default_max_runbook_steps")]
    pub max_runbook_steps: usize,

    /// Environment assumed when the request omits one
    #[serde(default = "default_environment")]
    pub default_environment: String,

    /// Category used when the provider returns an unrecognised one
    #[serde(default = "default_category")]
    pub default_category: Category,

    /// Extra classification attempts after a timeout or rate limit
    #[serde(default = "default_classification_retries")]
    pub classification_retries: u32,

    /// Pause before a classification retry (milliseconds)
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Per inference call timeout (milliseconds)
    #[serde(default = "default_stage_timeout_ms")]
    pub stage_timeout_ms: u64,

    /// Deadline for the whole pipeline (milliseconds)
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Below this classification confidence, escalation skips inference
    #[serde(default = "default_low_confidence_threshold")]
    pub low_confidence_threshold: f64,

    #[serde(default = "default_classifier_temperature")]
    pub classifier_temperature: f32,

    #[serde(default = "default_runbook_temperature")]
    pub runbook_temperature: f32,

    #[serde(default = "default_classifier_temperature")]
    pub escalation_temperature: f32,
}

impl PipelineConfig {
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn stage_timeout(&self) -> Duration {
        Duration::from_millis(self.stage_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.max_alert_chars == 0 {
            return Err("max_alert_chars must be greater than 0".to_string());
        }

        if self.max_runbook_steps == 0 {
            return Err("max_runbook_steps must be greater than 0".to_string());
        }

        if self.stage_timeout_ms == 0 || self.request_timeout_ms == 0 {
            return Err("timeouts must be greater than 0".to_string());
        }

        if self.classification_budget_ms() > self.request_timeout_ms {
            return Err(format!(
                "request_timeout_ms ({}) must cover every classification attempt plus backoff ({} ms)",
                self.request_timeout_ms,
                self.classification_budget_ms()
            ));
        }

        if !(0.0..=1.0).contains(&self.low_confidence_threshold) {
            return Err("low_confidence_threshold must be within [0, 1]".to_string());
        }

        Ok(())
    }

    /// Worst-case time spent classifying: every attempt running to the stage
    /// timeout, plus the backoff between attempts
    pub fn classification_budget_ms(&self) -> u64 {
        let attempts = u64::from(self.classification_retries).saturating_add(1);
        let retries = u64::from(self.classification_retries);
        attempts
            .saturating_mul(self.stage_timeout_ms)
            .saturating_add(retries.saturating_mul(self.retry_backoff_ms))
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_alert_chars: default_max_alert_chars(),
            max_runbook_steps: default_max_runbook_steps(),
            default_environment: default_environment(),
            default_category: default_category(),
            classification_retries: default_classification_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            stage_timeout_ms: default_stage_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            low_confidence_threshold: default_low_confidence_threshold(),
            classifier_temperature: default_classifier_temperature(),
            runbook_temperature: default_runbook_temperature(),
            escalation_temperature: default_classifier_temperature(),
        }
    }
}

/// Raw routing tables as written by operators.
///
/// Keys are category names and values team names; both are checked when the
/// table is turned into a [`crate::triage::RoutingTable`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoutingConfig {
    /// Category -> team, applied over any inferred team
    #[serde(default = "default_overrides")]
    pub overrides: HashMap<String, String>,

    /// Category -> team, used when inference cannot decide
    #[serde(default = "default_routes")]
    pub routes: HashMap<String, String>,

    /// Team for categories missing from `routes`
    #[serde(default = "default_team")]
    pub default_team: String,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            overrides: default_overrides(),
            routes: default_routes(),
            default_team: default_team(),
        }
    }
}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_http_port() -> u16 {
    8000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_service_name() -> String {
    "incident-triage".to_string()
}

fn default_true() -> bool {
    true
}

fn default_connect_timeout() -> u64 {
    5
}

fn default_providers() -> Vec<ProviderConfig> {
    vec![ProviderConfig {
        name: "gradient".to_string(),
        kind: ProviderKind::OpenaiCompatible,
        base_url: "https://inference.do-ai.run/v1".to_string(),
        model: "llama3.3-70b-instruct".to_string(),
        api_key_env: Some("GRADIENT_API_KEY".to_string()),
        json_mode: true,
        connect_timeout_secs: default_connect_timeout(),
    }]
}

fn default_max_alert_chars() -> usize {
    8000
}

fn default_max_runbook_steps() -> usize {
    10
}

fn default_environment() -> String {
    "production".to_string()
}

fn default_category() -> Category {
    Category::Unknown
}

fn default_classification_retries() -> u32 {
    1
}

fn default_retry_backoff_ms() -> u64 {
    500
}

fn default_stage_timeout_ms() -> u64 {
    12_000
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

fn default_low_confidence_threshold() -> f64 {
    0.4
}

fn default_classifier_temperature() -> f32 {
    0.1
}

fn default_runbook_temperature() -> f32 {
    0.2
}

fn default_overrides() -> HashMap<String, String> {
    HashMap::from([
        ("database".to_string(), "Database".to_string()),
        ("security".to_string(), "Security".to_string()),
    ])
}

fn default_routes() -> HashMap<String, String> {
    HashMap::from([
        ("database".to_string(), "Database".to_string()),
        ("compute".to_string(), "Platform".to_string()),
        ("network".to_string(), "Network".to_string()),
        ("application".to_string(), "Application".to_string()),
        ("dependency".to_string(), "Platform".to_string()),
        ("security".to_string(), "Security".to_string()),
    ])
}

fn default_team() -> String {
    "Platform".to_string()
}

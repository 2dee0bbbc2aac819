use crate::api::AppState;
use crate::config::RoutingConfig;
use crate::error::{AppError, Result};
use crate::models::{Category, RunbookStep, Severity, Team, TriageResult};
use crate::triage::RoutingTable;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use validator::Validate;

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let client = state.orchestrator.client();

    Json(HealthResponse {
        status: "ok".to_string(),
        service: state.service_name.clone(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        mode: if client.is_live() { "live" } else { "degraded" }.to_string(),
        providers: client
            .providers()
            .iter()
            .map(|p| ProviderHealth {
                name: p.name().to_string(),
                model: p.model().to_string(),
                configured: p.is_configured(),
            })
            .collect(),
    })
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    /// `live` when some provider has credentials, else `degraded`
    pub mode: String,
    pub providers: Vec<ProviderHealth>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProviderHealth {
    pub name: String,
    pub model: String,
    pub configured: bool,
}

/// Triage a free-text alert
pub async fn triage(
    State(state): State<AppState>,
    payload: std::result::Result<Json<TriageRequest>, JsonRejection>,
) -> Result<Json<TriageResponse>> {
    let Json(request) = payload.map_err(reject_body)?;
    request.validate()?;

    run_triage(&state, &request).await
}

#[derive(Debug, Deserialize, Validate)]
pub struct TriageRequest {
    /// Over-long text is truncated by the normalizer, never rejected here
    pub alert_text: String,
    #[validate(length(max = 255))]
    pub service_name: Option<String>,
    #[validate(length(max = 64))]
    pub environment: Option<String>,
    #[serde(default = "default_source")]
    #[validate(length(min = 1, max = 64))]
    pub source: String,
}

fn default_source() -> String {
    "manual".to_string()
}

async fn run_triage(state: &AppState, request: &TriageRequest) -> Result<Json<TriageResponse>> {
    info!(
        source = %request.source,
        service = request.service_name.as_deref().unwrap_or("-"),
        "Triage requested"
    );

    let result = state
        .orchestrator
        .triage(
            &request.alert_text,
            request.service_name.as_deref(),
            request.environment.as_deref(),
        )
        .await?;

    Ok(Json(TriageResponse::from(result)))
}

/// Flat triage verdict as rendered by clients
#[derive(Debug, Serialize, Deserialize)]
pub struct TriageResponse {
    pub severity: Severity,
    pub category: Category,
    pub confidence: f64,
    pub summary: String,
    pub root_cause_hypothesis: String,
    pub runbook_steps: Vec<RunbookStep>,
    pub escalation_team: Team,
    pub escalation_reason: String,
    pub estimated_impact: String,
    pub model_used: String,
    pub pipeline_degraded: bool,
}

impl From<TriageResult> for TriageResponse {
    fn from(result: TriageResult) -> Self {
        let classification = result.classification();

        Self {
            severity: classification.severity(),
            category: classification.category(),
            confidence: classification.confidence(),
            summary: classification.summary().to_string(),
            root_cause_hypothesis: classification.root_cause_hypothesis().to_string(),
            runbook_steps: result.runbook().steps().to_vec(),
            escalation_team: result.escalation().team,
            escalation_reason: result.escalation().reason.clone(),
            estimated_impact: classification.estimated_impact().to_string(),
            model_used: result.model_used().to_string(),
            pipeline_degraded: result.pipeline_degraded(),
        }
    }
}

/// Accept a PagerDuty webhook and triage its first incident
pub async fn pagerduty_webhook(
    State(state): State<AppState>,
    payload: std::result::Result<Json<PagerDutyWebhook>, JsonRejection>,
) -> Result<Json<TriageResponse>> {
    let Json(webhook) = payload.map_err(reject_body)?;

    let incident = webhook.messages.into_iter().next().map(|m| m.incident);
    let alert_text = incident
        .as_ref()
        .and_then(|i| non_blank(&i.description).or_else(|| non_blank(&i.title)));
    let Some(alert_text) = alert_text else {
        return Err(AppError::Validation(
            "could not extract an alert from the PagerDuty payload".to_string(),
        ));
    };
    let service_name = incident.as_ref().and_then(|i| non_blank(&i.service.name));

    let request = TriageRequest {
        alert_text,
        service_name,
        environment: None,
        source: "pagerduty".to_string(),
    };

    run_triage(&state, &request).await
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[derive(Debug, Default, Deserialize)]
pub struct PagerDutyWebhook {
    #[serde(default)]
    pub messages: Vec<PagerDutyMessage>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PagerDutyMessage {
    #[serde(default)]
    pub incident: PagerDutyIncident,
}

#[derive(Debug, Default, Deserialize)]
pub struct PagerDutyIncident {
    pub title: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub service: PagerDutyService,
}

#[derive(Debug, Default, Deserialize)]
pub struct PagerDutyService {
    pub name: Option<String>,
}

/// Current routing tables
pub async fn get_routing(State(state): State<AppState>) -> Json<RoutingConfig> {
    Json(state.orchestrator.routing().snapshot().to_config())
}

/// Replace the routing tables; applies to requests started afterwards
pub async fn replace_routing(
    State(state): State<AppState>,
    payload: std::result::Result<Json<RoutingConfig>, JsonRejection>,
) -> Result<Json<RoutingConfig>> {
    let Json(config) = payload.map_err(reject_body)?;
    let table =
        RoutingTable::from_config(&config).map_err(|e| AppError::Validation(e.to_string()))?;

    let rendered = table.to_config();
    state.orchestrator.routing().replace(table);
    info!(
        overrides = rendered.overrides.len(),
        routes = rendered.routes.len(),
        default_team = %rendered.default_team,
        "Routing table replaced"
    );

    Ok(Json(rendered))
}

/// Prometheus metrics endpoint
///
/// Returns metrics in Prometheus text exposition format
pub async fn metrics() -> (StatusCode, String) {
    let metrics = crate::metrics::gather_metrics();
    (StatusCode::OK, metrics)
}

/// Any unreadable body is a 400 with the usual error shape
fn reject_body(rejection: JsonRejection) -> AppError {
    AppError::Validation(rejection.body_text())
}

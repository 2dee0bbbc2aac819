//! Shared fixtures for integration tests: scripted model answers, a
//! ready-made orchestrator and Prometheus text helpers.

#![allow(dead_code)]

use incident_triage::{
    config::PipelineConfig,
    inference::{InferenceClient, InferenceProvider, ScriptedProvider, ScriptedResponse, Stage},
    triage::{RoutingPolicy, RoutingTable, TriageOrchestrator},
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

pub const MODEL: &str = "scripted-model";

pub const PG_POOL_ALERT: &str = "CRITICAL: orders-db PostgreSQL connection pool exhausted \
    (500/500 connections in use). API p99 latency 12s, checkout requests timing out.";

pub fn classification(severity: &str, category: &str, confidence: f64) -> ScriptedResponse {
    ScriptedResponse::json(json!({
        "severity": severity,
        "category": category,
        "confidence": confidence,
        "summary": format!("{} {} incident", severity, category),
        "root_cause_hypothesis": "Resource exhaustion",
        "estimated_impact": "Customer-facing requests failing"
    }))
}

pub fn runbook(actions: &[&str]) -> ScriptedResponse {
    let steps: Vec<Value> = actions
        .iter()
        .enumerate()
        .map(|(idx, action)| json!({ "step_number": idx + 1, "action": action }))
        .collect();
    ScriptedResponse::json(json!({ "runbook_steps": steps }))
}

pub fn escalation(team: &str, reason: &str) -> ScriptedResponse {
    ScriptedResponse::json(json!({ "team": team, "reason": reason }))
}

/// Provider answering every stage for a confident database incident
pub fn database_provider() -> ScriptedProvider {
    ScriptedProvider::new(MODEL)
        .always(Stage::Classification, classification("P1", "database", 0.93))
        .always(
            Stage::Runbook,
            runbook(&[
                "Check active connections in pg_stat_activity",
                "Terminate idle-in-transaction sessions",
                "Restart pgbouncer if the pool does not drain",
            ]),
        )
        .always(
            Stage::Escalation,
            escalation("Database", "Connection pool saturation on orders-db"),
        )
}

/// Pipeline policy with short backoff so retry tests stay fast
pub fn fast_policy() -> PipelineConfig {
    PipelineConfig {
        retry_backoff_ms: 5,
        stage_timeout_ms: 2_000,
        request_timeout_ms: 5_000,
        ..PipelineConfig::default()
    }
}

pub fn orchestrator(provider: Arc<ScriptedProvider>) -> TriageOrchestrator {
    orchestrator_with(provider, fast_policy())
}

pub fn orchestrator_with(
    provider: Arc<ScriptedProvider>,
    policy: PipelineConfig,
) -> TriageOrchestrator {
    let providers: Vec<Arc<dyn InferenceProvider>> = vec![provider];
    TriageOrchestrator::new(
        InferenceClient::new(providers),
        policy,
        RoutingPolicy::new(RoutingTable::default()),
    )
}

/// Map of metric name to its HELP/TYPE/sample lines
pub fn parse_prometheus_output(output: &str) -> HashMap<String, Vec<String>> {
    let mut metrics = HashMap::new();
    let mut current_metric = String::new();

    for line in output.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if line.starts_with("# HELP") || line.starts_with("# TYPE") {
            if let Some(name) = line.split_whitespace().nth(2) {
                current_metric = name.to_string();
                metrics
                    .entry(current_metric.clone())
                    .or_insert_with(Vec::new)
                    .push(line.to_string());
            }
        } else if !line.starts_with('#') && !current_metric.is_empty() {
            metrics
                .entry(current_metric.clone())
                .or_insert_with(Vec::new)
                .push(line.to_string());
        }
    }

    metrics
}

/// Labels of a sample line: `metric{a="1",b="2"} 3` -> {a: 1, b: 2}
pub fn extract_labels(line: &str) -> HashMap<String, String> {
    let mut labels = HashMap::new();

    if let (Some(start), Some(end)) = (line.find('{'), line.find('}')) {
        for pair in line[start + 1..end].split(',') {
            if let Some((key, value)) = pair.split_once('=') {
                labels.insert(key.trim().to_string(), value.trim().trim_matches('"').to_string());
            }
        }
    }

    labels
}

/// Value of a sample line
pub fn extract_metric_value(line: &str) -> Option<f64> {
    line.split_whitespace().last()?.parse::<f64>().ok()
}

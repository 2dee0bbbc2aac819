//! Prometheus metrics for the triage service.
//!
//! All metrics live in a process-wide registry under the `incident_triage`
//! namespace and are exported by `GET /metrics`. Metrics can be recorded
//! before [`init_metrics`] runs; they only become visible once registered.

mod middleware;

pub use middleware::track_metrics;

use lazy_static::lazy_static;
use prometheus::{Counter, CounterVec, Histogram, HistogramOpts, HistogramVec, Opts, Registry};

const NAMESPACE: &str = "incident_triage";

lazy_static! {
    /// Global Prometheus registry for all metrics
    pub static ref PROMETHEUS_REGISTRY: Registry = Registry::new();

    // ============================================================================
    // HTTP Metrics
    // ============================================================================

    /// Labels: method, path, status_code
    pub static ref HTTP_REQUESTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("http_requests_total", "Total number of HTTP requests")
            .namespace(NAMESPACE),
        &["method", "path", "status_code"]
    ).expect("Failed to create HTTP_REQUESTS_TOTAL metric");

    /// Labels: method, path
    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "http_request_duration_seconds",
            "HTTP request duration in seconds"
        )
        .namespace(NAMESPACE)
        .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        &["method", "path"]
    ).expect("Failed to create HTTP_REQUEST_DURATION_SECONDS metric");

    // ============================================================================
    // Pipeline Metrics
    // ============================================================================

    /// Labels: outcome (completed, rejected, classification_unavailable, timeout, internal_error)
    pub static ref TRIAGE_REQUESTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("triage_requests_total", "Triage requests by final outcome")
            .namespace(NAMESPACE),
        &["outcome"]
    ).expect("Failed to create TRIAGE_REQUESTS_TOTAL metric");

    /// Completed triage results produced through at least one fallback
    pub static ref TRIAGE_DEGRADED_TOTAL: Counter = Counter::with_opts(
        Opts::new("triage_degraded_total", "Triage results flagged as degraded")
            .namespace(NAMESPACE)
    ).expect("Failed to create TRIAGE_DEGRADED_TOTAL metric");

    pub static ref TRIAGE_DURATION_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new("triage_duration_seconds", "End-to-end pipeline duration")
            .namespace(NAMESPACE)
            .buckets(vec![0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 20.0, 30.0, 60.0])
    ).expect("Failed to create TRIAGE_DURATION_SECONDS metric");

    /// Labels: stage
    pub static ref STAGE_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new("triage_stage_duration_seconds", "Duration of each pipeline stage")
            .namespace(NAMESPACE)
            .buckets(vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 20.0]),
        &["stage"]
    ).expect("Failed to create STAGE_DURATION_SECONDS metric");

    /// Labels: stage, kind
    pub static ref INFERENCE_FAILURES_TOTAL: CounterVec = CounterVec::new(
        Opts::new("triage_inference_failures_total", "Failed stage inference calls by failure kind")
            .namespace(NAMESPACE),
        &["stage", "kind"]
    ).expect("Failed to create INFERENCE_FAILURES_TOTAL metric");

    // ============================================================================
    // Inference Metrics
    // ============================================================================

    /// Labels: provider, stage, outcome
    pub static ref INFERENCE_REQUESTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("inference_requests_total", "Inference calls by provider and outcome")
            .namespace(NAMESPACE),
        &["provider", "stage", "outcome"]
    ).expect("Failed to create INFERENCE_REQUESTS_TOTAL metric");

    /// Labels: provider, stage
    pub static ref INFERENCE_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new("inference_duration_seconds", "Inference call latency")
            .namespace(NAMESPACE)
            .buckets(vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 20.0, 30.0]),
        &["provider", "stage"]
    ).expect("Failed to create INFERENCE_DURATION_SECONDS metric");
}

/// Register every metric with the global registry.
///
/// Safe to call more than once; already-registered collectors are skipped.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(HTTP_REQUESTS_TOTAL.clone()),
        Box::new(HTTP_REQUEST_DURATION_SECONDS.clone()),
        Box::new(TRIAGE_REQUESTS_TOTAL.clone()),
        Box::new(TRIAGE_DEGRADED_TOTAL.clone()),
        Box::new(TRIAGE_DURATION_SECONDS.clone()),
        Box::new(STAGE_DURATION_SECONDS.clone()),
        Box::new(INFERENCE_FAILURES_TOTAL.clone()),
        Box::new(INFERENCE_REQUESTS_TOTAL.clone()),
        Box::new(INFERENCE_DURATION_SECONDS.clone()),
    ];

    for collector in collectors {
        match PROMETHEUS_REGISTRY.register(collector) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(e),
        }
    }

    Ok(())
}

/// Gather all metrics in Prometheus text exposition format
pub fn gather_metrics() -> String {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let metric_families = PROMETHEUS_REGISTRY.gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return String::from("# Error encoding metrics\n");
    }

    String::from_utf8(buffer).unwrap_or_else(|e| {
        tracing::error!("Failed to convert metrics to string: {}", e);
        String::from("# Error converting metrics\n")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_initialization_is_idempotent() {
        assert!(init_metrics().is_ok());
        assert!(init_metrics().is_ok());
    }

    #[test]
    fn test_inference_failure_counter() {
        INFERENCE_FAILURES_TOTAL
            .with_label_values(&["runbook", "unavailable"])
            .inc();

        let value = INFERENCE_FAILURES_TOTAL
            .with_label_values(&["runbook", "unavailable"])
            .get();
        assert!(value >= 1.0);
    }

    #[test]
    fn test_gather_metrics() {
        init_metrics().unwrap();
        TRIAGE_REQUESTS_TOTAL.with_label_values(&["completed"]).inc();

        let metrics = gather_metrics();
        assert!(metrics.contains("incident_triage_triage_requests_total"));
    }
}

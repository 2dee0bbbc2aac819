use incident_triage::{
    api::{build_router, AppState},
    config::Config,
    inference::InferenceClient,
    triage::{RoutingPolicy, RoutingTable, TriageOrchestrator},
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let (config, load_error) = match Config::load() {
        Ok(config) => (config, None),
        Err(e) => (Config::default(), Some(e)),
    };

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!(
            "incident_triage={},tower_http=info",
            config.observability.log_level
        )
        .into()
    });
    let registry = tracing_subscriber::registry().with(filter);
    if config.observability.json_logs {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    if let Some(e) = load_error {
        tracing::warn!("Failed to load configuration: {}", e);
        tracing::warn!("Using default configuration");
    }

    tracing::info!("Starting incident triage service v{}", env!("CARGO_PKG_VERSION"));

    config.pipeline.validate()?;

    // Initialize Prometheus metrics
    if config.observability.prometheus_enabled {
        if let Err(e) = incident_triage::metrics::init_metrics() {
            tracing::warn!("Failed to initialize metrics: {}", e);
            tracing::warn!("Continuing without metrics");
        } else {
            tracing::info!("Prometheus metrics initialized");
        }
    } else {
        tracing::info!("Prometheus metrics disabled in configuration");
    }

    // Inference providers
    let client = InferenceClient::from_config(&config.inference)?;
    for provider in client.providers() {
        tracing::info!(
            provider = provider.name(),
            model = provider.model(),
            configured = provider.is_configured(),
            "Inference provider registered"
        );
    }
    if !client.is_live() {
        tracing::warn!("No inference provider has credentials; triage requests will return 503");
    }

    // Routing tables
    let routing = RoutingPolicy::new(RoutingTable::from_config(&config.routing)?);

    let orchestrator = Arc::new(TriageOrchestrator::new(
        client,
        config.pipeline.clone(),
        routing,
    ));

    let state = AppState::new(orchestrator)
        .with_service_name(config.observability.service_name.clone())
        .with_admin_api(config.server.admin_api_enabled);
    let app = build_router(state);

    // Start HTTP server
    let http_addr = format!("{}:{}", config.server.host, config.server.http_port);
    let http_listener = tokio::net::TcpListener::bind(&http_addr).await?;

    tracing::info!("HTTP API server listening on http://{}", http_addr);
    tracing::info!("Press Ctrl+C to shutdown");

    axum::serve(http_listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
            }
        })
        .await?;

    tracing::info!("Shutting down gracefully...");
    Ok(())
}

pub mod handlers;
pub mod routes;

pub use routes::*;

use crate::triage::TriageOrchestrator;
use std::sync::Arc;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<TriageOrchestrator>,
    pub service_name: String,
    /// Mount `/v1/routing`
    pub admin_api_enabled: bool,
}

impl AppState {
    pub fn new(orchestrator: Arc<TriageOrchestrator>) -> Self {
        Self {
            orchestrator,
            service_name: "incident-triage".to_string(),
            admin_api_enabled: true,
        }
    }

    pub fn with_service_name(mut self, service_name: impl Into<String>) -> Self {
        self.service_name = service_name.into();
        self
    }

    pub fn with_admin_api(mut self, enabled: bool) -> Self {
        self.admin_api_enabled = enabled;
        self
    }
}

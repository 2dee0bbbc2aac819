use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};
use uuid::Uuid;

/// Canonical alert handed to the triage stages.
///
/// Only [`crate::triage::AlertNormalizer`] constructs this type, so every
/// instance carries non-empty, trimmed, length-bounded alert text.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct IncidentInput {
    id: Uuid,
    alert_text: String,
    service_name: Option<String>,
    environment: String,
    received_at: DateTime<Utc>,
}

impl IncidentInput {
    pub(crate) fn new(
        alert_text: String,
        service_name: Option<String>,
        environment: String,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            alert_text,
            service_name,
            environment,
            received_at: Utc::now(),
        }
    }

    /// Request-scoped identifier used for log correlation
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn alert_text(&self) -> &str {
        &self.alert_text
    }

    pub fn service_name(&self) -> Option<&str> {
        self.service_name.as_deref()
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }
}

#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, EnumString, Display, EnumIter,
)]
pub enum Severity {
    P1, // Outage, revenue impact, data loss risk
    P2, // Significant degradation, partial outage
    P3, // Minor, single service, no immediate user impact
}

impl Severity {
    /// Get numeric priority (lower is more urgent)
    pub fn priority(&self) -> u8 {
        match self {
            Severity::P1 => 1,
            Severity::P2 => 2,
            Severity::P3 => 3,
        }
    }

    /// Check if severity requires immediate attention
    pub fn is_urgent(&self) -> bool {
        matches!(self, Severity::P1)
    }

    /// Parse a provider-supplied label such as `P1`, `p2` or `SEV-3`
    pub fn from_label(label: &str) -> Option<Self> {
        let normalized: String = label
            .trim()
            .to_ascii_uppercase()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect();

        match normalized.as_str() {
            "P1" | "SEV1" => Some(Severity::P1),
            "P2" | "SEV2" => Some(Severity::P2),
            "P3" | "SEV3" => Some(Severity::P3),
            _ => None,
        }
    }

    /// Pick the most urgent severity out of a set of candidates
    pub fn most_urgent<I>(candidates: I) -> Option<Self>
    where
        I: IntoIterator<Item = Severity>,
    {
        candidates.into_iter().min_by_key(|s| s.priority())
    }
}

/// Bounded incident taxonomy shared with API consumers.
///
/// `Unknown` absorbs provider drift so the set rendered by clients never grows.
#[derive(
    Debug,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    Hash,
    EnumString,
    Display,
    EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Category {
    Database,
    Compute,
    Network,
    Application,
    Dependency,
    Security,
    Unknown,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Database => "database",
            Category::Compute => "compute",
            Category::Network => "network",
            Category::Application => "application",
            Category::Dependency => "dependency",
            Category::Security => "security",
            Category::Unknown => "unknown",
        }
    }

    /// Map a provider label (including common aliases) onto the taxonomy
    pub fn from_label(label: &str) -> Option<Self> {
        let normalized = label.trim().to_ascii_lowercase().replace(['-', ' '], "_");

        match normalized.as_str() {
            "database" | "db" | "data" | "storage" => Some(Category::Database),
            "compute" | "infra" | "infrastructure" | "platform" => Some(Category::Compute),
            "network" | "networking" | "dns" => Some(Category::Network),
            "application" | "app" | "service" => Some(Category::Application),
            "dependency" | "third_party" | "external" | "upstream" => Some(Category::Dependency),
            "security" => Some(Category::Security),
            "unknown" => Some(Category::Unknown),
            _ => None,
        }
    }

    /// Wire names of every category, in declaration order
    pub fn labels() -> Vec<&'static str> {
        Category::iter().map(|c| c.as_str()).collect()
    }
}

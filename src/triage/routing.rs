use crate::config::RoutingConfig;
use crate::models::{Category, Team};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RoutingError {
    #[error("unknown category '{0}' in routing table")]
    UnknownCategory(String),

    #[error("unknown team '{0}' in routing table")]
    UnknownTeam(String),
}

/// Category to team routing used by the escalation stage.
///
/// `overrides` win over any inferred team. `routes` (then `default_team`)
/// answer when inference is skipped or fails.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutingTable {
    overrides: HashMap<Category, Team>,
    routes: HashMap<Category, Team>,
    default_team: Team,
}

impl RoutingTable {
    pub fn from_config(config: &RoutingConfig) -> Result<Self, RoutingError> {
        Ok(Self {
            overrides: parse_table(&config.overrides)?,
            routes: parse_table(&config.routes)?,
            default_team: parse_team(&config.default_team)?,
        })
    }

    pub fn to_config(&self) -> RoutingConfig {
        RoutingConfig {
            overrides: render_table(&self.overrides),
            routes: render_table(&self.routes),
            default_team: self.default_team.to_string(),
        }
    }

    /// Team forced for `category`, regardless of inference
    pub fn override_for(&self, category: Category) -> Option<Team> {
        self.overrides.get(&category).copied()
    }

    /// Deterministic team for `category`: override, then route, then default
    pub fn route(&self, category: Category) -> Team {
        self.override_for(category)
            .or_else(|| self.routes.get(&category).copied())
            .unwrap_or(self.default_team)
    }

    pub fn default_team(&self) -> Team {
        self.default_team
    }
}

impl Default for RoutingTable {
    fn default() -> Self {
        // The built-in configuration only names known categories and teams
        Self::from_config(&RoutingConfig::default()).unwrap_or(Self {
            overrides: HashMap::new(),
            routes: HashMap::new(),
            default_team: Team::Platform,
        })
    }
}

fn parse_team(label: &str) -> Result<Team, RoutingError> {
    Team::from_label(label).ok_or_else(|| RoutingError::UnknownTeam(label.to_string()))
}

fn parse_table(raw: &HashMap<String, String>) -> Result<HashMap<Category, Team>, RoutingError> {
    raw.iter()
        .map(|(category, team)| {
            let category = Category::from_label(category)
                .ok_or_else(|| RoutingError::UnknownCategory(category.clone()))?;
            Ok((category, parse_team(team)?))
        })
        .collect()
}

fn render_table(table: &HashMap<Category, Team>) -> HashMap<String, String> {
    table
        .iter()
        .map(|(category, team)| (category.as_str().to_string(), team.to_string()))
        .collect()
}

/// Shared, runtime-replaceable routing table.
///
/// Requests take a [`snapshot`](Self::snapshot) up front so a concurrent
/// replacement never changes routing halfway through a triage.
#[derive(Debug, Clone, Default)]
pub struct RoutingPolicy {
    table: Arc<RwLock<RoutingTable>>,
}

impl RoutingPolicy {
    pub fn new(table: RoutingTable) -> Self {
        Self {
            table: Arc::new(RwLock::new(table)),
        }
    }

    pub fn snapshot(&self) -> RoutingTable {
        self.table.read().clone()
    }

    /// Swap in a new table, returning the previous one
    pub fn replace(&self, table: RoutingTable) -> RoutingTable {
        std::mem::replace(&mut *self.table.write(), table)
    }
}

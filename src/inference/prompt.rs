use serde::Serialize;
use strum::{Display, IntoStaticStr};

/// Pipeline stage an inference call belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display, IntoStaticStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Stage {
    Classification,
    Runbook,
    Escalation,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        self.into()
    }
}

/// Provider-neutral description of one structured-output request
#[derive(Debug, Clone, PartialEq)]
pub struct StagePrompt {
    pub stage: Stage,
    pub system: String,
    pub user: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl StagePrompt {
    pub fn new(stage: Stage, system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            stage,
            system: system.into(),
            user: user.into(),
            temperature: 0.1,
            max_tokens: 512,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

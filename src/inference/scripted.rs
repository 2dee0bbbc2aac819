use crate::inference::{InferenceError, InferenceProvider, Stage, StagePrompt};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value as JsonValue;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

/// One canned provider answer
#[derive(Debug, Clone)]
pub enum ScriptedResponse {
    /// Raw completion text, returned verbatim
    Reply(String),
    /// Provider-level failure
    Fail(InferenceError),
    /// Wait before producing the inner response
    Delayed(Duration, Box<ScriptedResponse>),
}

impl ScriptedResponse {
    pub fn reply(text: impl Into<String>) -> Self {
        ScriptedResponse::Reply(text.into())
    }

    pub fn json(value: JsonValue) -> Self {
        ScriptedResponse::Reply(value.to_string())
    }

    pub fn fail(error: InferenceError) -> Self {
        ScriptedResponse::Fail(error)
    }

    pub fn delayed(delay: Duration, then: ScriptedResponse) -> Self {
        ScriptedResponse::Delayed(delay, Box::new(then))
    }
}

#[derive(Default)]
struct StageScript {
    queue: VecDeque<ScriptedResponse>,
    fallback: Option<ScriptedResponse>,
    started: usize,
    completed: usize,
    last_user: Option<String>,
}

/// Deterministic provider driven by per-stage response queues.
///
/// Queued responses are consumed in order; once a stage queue is empty the
/// stage's `always` response (if any) is repeated. A stage with nothing left
/// answers `Unavailable`.
pub struct ScriptedProvider {
    name: String,
    model: String,
    scripts: Mutex<HashMap<Stage, StageScript>>,
}

impl ScriptedProvider {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            name: "scripted".to_string(),
            model: model.into(),
            scripts: Mutex::new(HashMap::new()),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Queue a one-shot response for `stage`
    pub fn on(self, stage: Stage, response: ScriptedResponse) -> Self {
        self.push(stage, response);
        self
    }

    /// Response repeated for `stage` after its queue drains
    pub fn always(self, stage: Stage, response: ScriptedResponse) -> Self {
        self.scripts.lock().entry(stage).or_default().fallback = Some(response);
        self
    }

    pub fn push(&self, stage: Stage, response: ScriptedResponse) {
        self.scripts
            .lock()
            .entry(stage)
            .or_default()
            .queue
            .push_back(response);
    }

    /// Calls received for `stage`, including ones later cancelled
    pub fn calls(&self, stage: Stage) -> usize {
        self.scripts.lock().get(&stage).map_or(0, |s| s.started)
    }

    /// Calls for `stage` that ran to completion
    pub fn completed(&self, stage: Stage) -> usize {
        self.scripts.lock().get(&stage).map_or(0, |s| s.completed)
    }

    /// User message of the most recent call for `stage`
    pub fn last_user_prompt(&self, stage: Stage) -> Option<String> {
        self.scripts.lock().get(&stage).and_then(|s| s.last_user.clone())
    }

    fn next_response(&self, prompt: &StagePrompt) -> Option<ScriptedResponse> {
        let mut scripts = self.scripts.lock();
        let script = scripts.entry(prompt.stage).or_default();
        script.started += 1;
        script.last_user = Some(prompt.user.clone());
        script.queue.pop_front().or_else(|| script.fallback.clone())
    }

    fn mark_completed(&self, stage: Stage) {
        self.scripts.lock().entry(stage).or_default().completed += 1;
    }
}

#[async_trait]
impl InferenceProvider for ScriptedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(
        &self,
        prompt: &StagePrompt,
        _timeout: Duration,
    ) -> Result<String, InferenceError> {
        let mut response = self.next_response(prompt).ok_or_else(|| {
            InferenceError::Unavailable(format!("no scripted response for {}", prompt.stage))
        })?;

        loop {
            match response {
                ScriptedResponse::Delayed(delay, inner) => {
                    tokio::time::sleep(delay).await;
                    response = *inner;
                }
                ScriptedResponse::Reply(text) => {
                    self.mark_completed(prompt.stage);
                    return Ok(text);
                }
                ScriptedResponse::Fail(err) => {
                    self.mark_completed(prompt.stage);
                    return Err(err);
                }
            }
        }
    }
}

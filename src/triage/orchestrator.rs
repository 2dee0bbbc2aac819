use crate::config::PipelineConfig;
use crate::inference::{
    FailureKind, InferenceClient, InferenceError, ParsedOutput, ResponseSchema, Stage,
    StagePrompt,
};
use crate::metrics::{
    INFERENCE_FAILURES_TOTAL, STAGE_DURATION_SECONDS, TRIAGE_DEGRADED_TOTAL,
    TRIAGE_DURATION_SECONDS, TRIAGE_REQUESTS_TOTAL,
};
use crate::models::{Classification, IncidentInput, TriageResult};
use crate::triage::{
    AlertNormalizer, ClassifierStage, EscalationStage, FallbackReason, PipelineRun, RoutingPolicy,
    RunbookStage, StageOutcome, TriageState, ValidationError,
};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::time::{sleep, timeout};
use tracing::{error, info, warn};
use uuid::Uuid;

/// Fatal triage outcomes; anything else yields a (possibly degraded) result
#[derive(Error, Debug)]
pub enum TriageError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("classification unavailable after {attempts} attempt(s): {cause}")]
    ClassificationUnavailable { attempts: u32, cause: FailureKind },

    #[error("pipeline exceeded its {0:?} deadline")]
    PipelineTimeout(Duration),

    #[error("invalid pipeline state transition {from} -> {to}")]
    InvalidStateTransition { from: TriageState, to: TriageState },
}

impl TriageError {
    /// Caller-facing description; never includes provider error text
    pub fn detail(&self) -> String {
        match self {
            TriageError::Validation(e) => e.to_string(),
            TriageError::ClassificationUnavailable { attempts, cause } => format!(
                "incident could not be classified after {} attempt(s) ({})",
                attempts, cause
            ),
            TriageError::PipelineTimeout(deadline) => format!(
                "triage did not complete within {} ms",
                deadline.as_millis()
            ),
            TriageError::InvalidStateTransition { .. } => "internal pipeline error".to_string(),
        }
    }

    /// Label used for the `outcome` metric dimension
    pub fn outcome(&self) -> &'static str {
        match self {
            TriageError::Validation(_) => "rejected",
            TriageError::ClassificationUnavailable { .. } => "classification_unavailable",
            TriageError::PipelineTimeout(_) => "timeout",
            TriageError::InvalidStateTransition { .. } => "internal_error",
        }
    }
}

/// Runs the three triage stages for one alert at a time.
///
/// Owns every retry, timeout and fallback decision; the stages themselves only
/// build prompts and interpret output. Safe to share behind an `Arc`: nothing
/// per-request is stored on `self`.
pub struct TriageOrchestrator {
    client: InferenceClient,
    normalizer: AlertNormalizer,
    classifier: ClassifierStage,
    runbook: RunbookStage,
    escalation: EscalationStage,
    routing: RoutingPolicy,
    policy: PipelineConfig,
}

impl TriageOrchestrator {
    pub fn new(client: InferenceClient, policy: PipelineConfig, routing: RoutingPolicy) -> Self {
        Self {
            normalizer: AlertNormalizer::from_config(&policy),
            classifier: ClassifierStage::new(policy.default_category, policy.classifier_temperature),
            runbook: RunbookStage::new(policy.max_runbook_steps, policy.runbook_temperature),
            escalation: EscalationStage::new(policy.escalation_temperature),
            client,
            routing,
            policy,
        }
    }

    pub fn client(&self) -> &InferenceClient {
        &self.client
    }

    pub fn routing(&self) -> &RoutingPolicy {
        &self.routing
    }

    pub fn policy(&self) -> &PipelineConfig {
        &self.policy
    }

    /// Normalise and triage a raw alert
    pub async fn triage(
        &self,
        alert_text: &str,
        service_name: Option<&str>,
        environment: Option<&str>,
    ) -> Result<TriageResult, TriageError> {
        let mut run = PipelineRun::new(Uuid::new_v4());
        let input = match self.normalizer.normalize(alert_text, service_name, environment) {
            Ok(input) => input,
            Err(err) => return Err(self.reject(&mut run, err)),
        };

        self.execute(input, run).await
    }

    /// Triage an already-normalised incident
    pub async fn triage_input(&self, input: IncidentInput) -> Result<TriageResult, TriageError> {
        let run = PipelineRun::new(input.id());
        self.execute(input, run).await
    }

    /// Fail a run whose alert did not survive normalisation
    fn reject(&self, run: &mut PipelineRun, err: ValidationError) -> TriageError {
        let err = TriageError::from(err);
        if let Err(transition_err) = run.transition(TriageState::Failed) {
            return transition_err;
        }

        TRIAGE_REQUESTS_TOTAL.with_label_values(&[err.outcome()]).inc();
        warn!(
            request_id = %run.request_id(),
            state = %run.state(),
            error = %err,
            "Alert rejected"
        );
        err
    }

    async fn execute(
        &self,
        input: IncidentInput,
        mut run: PipelineRun,
    ) -> Result<TriageResult, TriageError> {
        let start = Instant::now();
        let deadline = self.policy.request_timeout();

        info!(
            request_id = %run.request_id(),
            incident_id = %input.id(),
            environment = %input.environment(),
            service = input.service_name().unwrap_or("-"),
            alert_chars = input.alert_text().chars().count(),
            "Triage started"
        );

        let finished = timeout(deadline, self.run_stages(&input, &mut run)).await;
        let outcome = finished.unwrap_or(Err(TriageError::PipelineTimeout(deadline)));
        if outcome.is_err() {
            run.abort();
        }

        TRIAGE_DURATION_SECONDS.observe(start.elapsed().as_secs_f64());

        match &outcome {
            Ok(result) => {
                TRIAGE_REQUESTS_TOTAL.with_label_values(&["completed"]).inc();
                if result.pipeline_degraded() {
                    TRIAGE_DEGRADED_TOTAL.inc();
                }
                info!(
                    request_id = %run.request_id(),
                    severity = %result.classification().severity(),
                    category = %result.classification().category(),
                    team = %result.escalation().team,
                    degraded = result.pipeline_degraded(),
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Triage completed"
                );
            }
            Err(err) => {
                TRIAGE_REQUESTS_TOTAL.with_label_values(&[err.outcome()]).inc();
                error!(
                    request_id = %run.request_id(),
                    state = %run.state(),
                    error = %err,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Triage failed"
                );
            }
        }

        outcome
    }

    async fn run_stages(
        &self,
        input: &IncidentInput,
        run: &mut PipelineRun,
    ) -> Result<TriageResult, TriageError> {
        // Routing stays fixed for the whole request even if replaced meanwhile
        let routing = self.routing.snapshot();

        run.transition(TriageState::Classifying)?;
        let (classification, model_used) = match self.classify(input, run).await {
            Ok(classified) => classified,
            Err(err) => {
                run.transition(TriageState::Failed)?;
                return Err(err);
            }
        };

        run.transition(TriageState::GeneratingRunbook)?;
        let prompt = self.runbook.prompt(&classification, input);
        let inferred = self.call(&prompt, &self.runbook.schema(), run).await?;
        let runbook = self.runbook.resolve(classification.category(), inferred);
        self.note_fallback(run, &prompt, &runbook);

        run.transition(TriageState::Escalating)?;
        let escalation = if classification.confidence() < self.policy.low_confidence_threshold {
            self.escalation
                .decide_by_policy(&classification, &routing, FallbackReason::LowConfidence)
        } else {
            let prompt = self.escalation.prompt(&classification, &runbook.value);
            let inferred = self.call(&prompt, &self.escalation.schema(), run).await?;
            self.escalation.decide(&classification, &routing, inferred)
        };
        if let Some(reason) = escalation.fallback {
            warn!(
                request_id = %run.request_id(),
                stage = "escalation",
                kind = %reason,
                "Escalation routed by policy"
            );
            record_inference_failure(Stage::Escalation, reason);
        }

        let degraded = runbook.is_degraded() || escalation.is_degraded();
        run.transition(TriageState::Completed)?;

        Ok(TriageResult::assemble(
            classification,
            runbook.value,
            escalation.value,
            model_used,
            degraded,
        ))
    }

    /// Classification with retry on transient failures. Returns the
    /// classification and the model that produced it.
    async fn classify(
        &self,
        input: &IncidentInput,
        run: &PipelineRun,
    ) -> Result<(Classification, String), TriageError> {
        let prompt = self.classifier.prompt(input);
        let schema = self.classifier.schema();
        let max_attempts = self.policy.classification_retries + 1;
        let mut attempt = 0;

        loop {
            attempt += 1;

            let err = match self.call(&prompt, &schema, run).await? {
                Ok(output) => match self.classifier.classify(&output) {
                    Ok(classification) => return Ok((classification, output.model)),
                    Err(stage_err) => {
                        warn!(
                            request_id = %run.request_id(),
                            stage = "classification",
                            attempt,
                            error = %stage_err,
                            "Classification output rejected"
                        );
                        let kind = FailureKind::InvalidOutput;
                        INFERENCE_FAILURES_TOTAL
                            .with_label_values(&["classification", kind.as_str()])
                            .inc();
                        return Err(TriageError::ClassificationUnavailable {
                            attempts: attempt,
                            cause: kind,
                        });
                    }
                },
                Err(err) => err,
            };

            INFERENCE_FAILURES_TOTAL
                .with_label_values(&["classification", err.kind().as_str()])
                .inc();

            if err.is_transient() && attempt < max_attempts {
                warn!(
                    request_id = %run.request_id(),
                    stage = "classification",
                    kind = %err.kind(),
                    attempt,
                    backoff_ms = self.policy.retry_backoff_ms,
                    "Classification failed, retrying"
                );
                sleep(self.policy.retry_backoff()).await;
                continue;
            }

            return Err(TriageError::ClassificationUnavailable {
                attempts: attempt,
                cause: err.kind(),
            });
        }
    }

    /// One inference call bounded by the stage timeout and what is left of
    /// the request deadline. A timeout caused by the deadline ends the
    /// pipeline instead of being handed to the stage.
    async fn call(
        &self,
        prompt: &StagePrompt,
        schema: &ResponseSchema,
        run: &PipelineRun,
    ) -> Result<Result<ParsedOutput, InferenceError>, TriageError> {
        let deadline = self.policy.request_timeout();
        let remaining = deadline.saturating_sub(run.elapsed());
        if remaining.is_zero() {
            return Err(TriageError::PipelineTimeout(deadline));
        }
        let stage_timeout = self.policy.stage_timeout();
        let bounded_by_deadline = remaining < stage_timeout;
        let call_timeout = stage_timeout.min(remaining);

        let start = Instant::now();
        let result = self.client.infer(prompt, schema, call_timeout).await;
        STAGE_DURATION_SECONDS
            .with_label_values(&[prompt.stage.as_str()])
            .observe(start.elapsed().as_secs_f64());

        match result {
            Err(InferenceError::Timeout(_)) if bounded_by_deadline => {
                Err(TriageError::PipelineTimeout(deadline))
            }
            other => Ok(other),
        }
    }

    fn note_fallback<T>(&self, run: &PipelineRun, prompt: &StagePrompt, outcome: &StageOutcome<T>) {
        if let Some(reason) = outcome.fallback {
            warn!(
                request_id = %run.request_id(),
                stage = %prompt.stage,
                kind = %reason,
                elapsed_ms = run.elapsed().as_millis() as u64,
                "Stage fell back to deterministic output"
            );
            record_inference_failure(prompt.stage, reason);
        }
    }
}

/// Low confidence skips inference rather than failing it, so only real
/// failures are counted here; degraded results are counted separately.
fn record_inference_failure(stage: Stage, reason: FallbackReason) {
    if let FallbackReason::Failed(kind) = reason {
        INFERENCE_FAILURES_TOTAL
            .with_label_values(&[stage.as_str(), kind.as_str()])
            .inc();
    }
}

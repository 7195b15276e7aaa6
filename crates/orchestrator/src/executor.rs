//! Single-step execution with classification-driven retries

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use forge_core::{AgentStatus, BuildRequest, ErrorClassification, PlanStep, StepOutcome};
use serde_json::Value;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::agents::{AgentContext, AgentOutput, AgentRegistry};
use crate::classifier::FailureClassifier;
use crate::config::RetryConfig;
use crate::failure::AgentFailure;
use crate::status_tracker::StatusTracker;

/// Runs one plan step against the agent registered for its type.
///
/// A failed attempt is classified; retryable failures are absorbed here with
/// exponential backoff until the classification's retry budget is spent.
/// Everything else ends the step as `failed`. The caller only ever sees the
/// final [`StepOutcome`].
#[derive(Clone)]
pub struct AgentExecutor {
    registry: Arc<AgentRegistry>,
    classifier: Arc<dyn FailureClassifier>,
    tracker: StatusTracker,
    retry: RetryConfig,
}

impl AgentExecutor {
    pub fn new(
        registry: Arc<AgentRegistry>,
        classifier: Arc<dyn FailureClassifier>,
        tracker: StatusTracker,
        retry: RetryConfig,
    ) -> Self {
        Self {
            registry,
            classifier,
            tracker,
            retry,
        }
    }

    pub fn tracker(&self) -> &StatusTracker {
        &self.tracker
    }

    pub fn registry(&self) -> &Arc<AgentRegistry> {
        &self.registry
    }

    fn classify(&self, failure: &AgentFailure) -> ErrorClassification {
        match self.classifier.classify(failure) {
            Ok(classification) => classification,
            Err(e) => {
                error!("Failure could not be classified, treating as fatal: {}", e);
                ErrorClassification::classifier_failure()
            }
        }
    }

    async fn attempt(
        &self,
        step: &PlanStep,
        ctx: &AgentContext,
    ) -> Result<AgentOutput, AgentFailure> {
        let agent = self.registry.get(step.agent_type).ok_or_else(|| {
            AgentFailure::new(format!("No agent registered for type: {}", step.agent_type))
        })?;
        let _job = self.registry.begin_job(step.agent_type);
        agent.execute(step, ctx).await
    }

    /// Execute `step` for `request`. `inputs` holds the outputs of the
    /// step's completed dependencies.
    pub async fn execute(
        &self,
        request: Arc<BuildRequest>,
        step: &PlanStep,
        inputs: BTreeMap<String, Value>,
    ) -> StepOutcome {
        let session_id = request.session_id();
        let status_id = match self
            .tracker
            .start(session_id, step, self.retry.default_max_retries)
        {
            Ok(id) => id,
            Err(e) => {
                warn!(step_id = %step.id, "Step could not be started: {}", e);
                return failed_outcome(step, e.to_string(), None, 0);
            }
        };

        info!(
            session_id = %session_id,
            step_id = %step.id,
            agent_type = %step.agent_type,
            action = %step.action,
            "Executing step"
        );

        let mut retry_count = 0u32;
        let mut attempts = 0u32;
        // delays never shrink, even when the failure category changes
        let mut last_delay_ms = 0u64;
        loop {
            attempts += 1;
            let ctx = AgentContext::new(request.clone())
                .with_attempt(attempts)
                .with_inputs(inputs.clone())
                .with_progress(self.tracker.clone(), status_id);

            let failure = match self.attempt(step, &ctx).await {
                Ok(output) => {
                    self.report(status_id, self.tracker.complete(status_id, output.summary.clone()));
                    if retry_count > 0 {
                        info!(
                            step_id = %step.id,
                            retry_count,
                            "Step recovered after retries"
                        );
                    }
                    return StepOutcome {
                        step_id: step.id.clone(),
                        agent_type: step.agent_type,
                        status: AgentStatus::Completed,
                        output: Some(output.output),
                        artifacts: output.artifacts,
                        error: None,
                        classification: None,
                        attempts,
                        recovered: retry_count > 0,
                    };
                }
                Err(failure) => failure,
            };

            let classification = self.classify(&failure);
            let message = failure.to_string();
            let max_retries = classification.max_retries_or(self.retry.default_max_retries);

            if classification.should_retry(retry_count, self.retry.default_max_retries) {
                retry_count += 1;
                let delay_ms = self
                    .retry
                    .backoff_ms(
                        classification.base_delay_or(self.retry.base_delay_ms),
                        retry_count,
                    )
                    .max(last_delay_ms)
                    .min(self.retry.max_delay_ms);
                last_delay_ms = delay_ms;
                warn!(
                    step_id = %step.id,
                    category = %classification.category,
                    retry_count,
                    max_retries,
                    delay_ms,
                    "Attempt failed, retrying: {}",
                    message
                );
                self.report(
                    status_id,
                    self.tracker
                        .retrying(
                            status_id,
                            &message,
                            &classification,
                            retry_count,
                            max_retries,
                            delay_ms,
                        )
                        .await,
                );
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                self.report(status_id, self.tracker.resume(status_id));
                continue;
            }

            error!(
                step_id = %step.id,
                category = %classification.category,
                critical = step.critical,
                attempts,
                "Step failed: {}",
                message
            );
            self.report(
                status_id,
                self.tracker.fail(status_id, &message, &classification).await,
            );
            return failed_outcome(step, message, Some(classification), attempts);
        }
    }

    fn report(&self, status_id: Uuid, result: crate::error::Result<()>) {
        if let Err(e) = result {
            warn!(status_id = %status_id, "Status update rejected: {}", e);
        }
    }
}

fn failed_outcome(
    step: &PlanStep,
    error: String,
    classification: Option<ErrorClassification>,
    attempts: u32,
) -> StepOutcome {
    StepOutcome {
        step_id: step.id.clone(),
        agent_type: step.agent_type,
        status: AgentStatus::Failed,
        output: None,
        artifacts: Vec::new(),
        error: Some(error),
        classification,
        attempts,
        recovered: false,
    }
}

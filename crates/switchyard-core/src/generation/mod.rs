//! The generation orchestrator: drives provider calls under a retry
//! policy, decodes and validates candidates, collects quality issues,
//! applies the accepted plan, and publishes progress events throughout.
//!
//! The control flow is an explicit state machine (see [`state`]); this
//! module performs one effect per state and feeds the outcome back in.
//! Exactly one attempt-outcome event
//! (`generation attempt failed` / `generation attempt succeeded`) is
//! published per attempt, plus validation start/result events and one
//! terminal `generation complete` / `generation failed` event.

pub mod backoff;
pub mod lease;
pub mod state;

pub use backoff::{Backoff, ExponentialBackoff, FixedBackoff};
pub use lease::{GoalLease, GoalLeases};
pub use state::{PipelineState, StepOutcome, next_state};

use std::time::Duration;

use serde_json::json;
use thiserror::Error;
use tokio::time::timeout;
use uuid::Uuid;

use crate::apply::{ApplyError, PlanStore};
use crate::events::{EventBroker, ProgressEvent};
use crate::graph::{self, CandidateGraph, DecodeLimits, Plan};
use crate::provider::{PlanConstraints, PlanPrompt, PlanProvider, ProviderError};
use crate::quality;

/// Tunables for one generation run.
#[derive(Debug, Clone)]
pub struct GenerationConfig {
    /// Upper bound on routes per plan; clamped into 6-20.
    pub max_routes: usize,
    /// Upper bound on tasks per route; clamped into 1-6.
    pub max_tasks_per_route: usize,
    /// Upper bound on work packages per task; clamped into 1-6.
    pub max_work_packages_per_task: usize,
    /// Wall-time budget per provider call.
    pub provider_timeout: Duration,
    /// Total attempt budget, >= 1.
    pub max_attempts: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_routes: 8,
            max_tasks_per_route: 6,
            max_work_packages_per_task: 6,
            provider_timeout: Duration::from_secs(90),
            max_attempts: 3,
        }
    }
}

impl GenerationConfig {
    /// Force every bound into its allowed range.
    pub fn clamped(mut self) -> Self {
        self.max_routes = self.max_routes.clamp(6, 20);
        self.max_tasks_per_route = self.max_tasks_per_route.clamp(1, 6);
        self.max_work_packages_per_task = self.max_work_packages_per_task.clamp(1, 6);
        self.max_attempts = self.max_attempts.max(1);
        self
    }

    pub fn decode_limits(&self) -> DecodeLimits {
        DecodeLimits {
            max_routes: self.max_routes,
            max_tasks_per_route: self.max_tasks_per_route,
            max_work_packages_per_task: self.max_work_packages_per_task,
        }
    }

    pub fn constraints(&self) -> PlanConstraints {
        PlanConstraints {
            max_routes: self.max_routes,
            max_tasks_per_route: self.max_tasks_per_route,
            max_work_packages_per_task: self.max_work_packages_per_task,
        }
    }
}

/// One generation request.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub goal_id: Uuid,
    /// The goal text sent to the provider.
    pub goal: String,
    /// Optional free-text context.
    pub context: String,
    /// Continuation reference delivered with the terminal success event.
    pub redirect: Option<String>,
}

/// Terminal failures of a generation run. Never leaves a partial write
/// behind.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// The provider failed in a way that is not retryable.
    #[error("provider failure is not retryable: {0}")]
    Provider(#[from] ProviderError),

    /// The attempt budget ran out without an accepted plan.
    #[error("no valid plan after {attempts} attempt(s): {last}")]
    AttemptsExhausted { attempts: u32, last: String },

    /// Persisting the accepted plan failed.
    #[error(transparent)]
    Apply(#[from] ApplyError),
}

/// Run one generation to completion.
///
/// The caller must hold the goal's [`GoalLease`] for the duration of the
/// run; the orchestrator itself is lease-agnostic so tests can exercise it
/// directly.
pub async fn run_generation(
    request: &GenerationRequest,
    provider: &dyn PlanProvider,
    store: &dyn PlanStore,
    broker: &EventBroker,
    backoff: &dyn Backoff,
    config: &GenerationConfig,
) -> Result<Plan, GenerationError> {
    let config = config.clone().clamped();
    let goal_id = request.goal_id;
    let limits = config.decode_limits();
    let prompt = PlanPrompt {
        goal: request.goal.clone(),
        context: request.context.clone(),
        constraints: config.constraints(),
    };

    broker.publish(ProgressEvent::info(
        "generation started",
        Some(json!({
            "goal_id": goal_id,
            "provider": provider.name(),
            "max_attempts": config.max_attempts,
        })),
    ));

    let mut current = PipelineState::Attempting { attempt: 1 };
    let mut raw = String::new();
    let mut candidate: Option<CandidateGraph> = None;
    let mut warnings = Vec::new();
    let mut plan: Option<Plan> = None;

    let mut attempts_used: u32 = 0;
    let mut last_error = String::new();
    let mut last_kind = "provider";
    let mut fatal_provider: Option<ProviderError> = None;
    let mut apply_error: Option<ApplyError> = None;

    loop {
        match current {
            PipelineState::Attempting { attempt } => {
                attempts_used = attempt;
                if attempt > 1 {
                    tokio::time::sleep(backoff.delay(attempt - 1)).await;
                }
                tracing::info!(goal_id = %goal_id, attempt, "issuing provider request");

                let outcome = match timeout(config.provider_timeout, provider.complete(&prompt))
                    .await
                {
                    Ok(Ok(text)) => {
                        raw = text;
                        StepOutcome::ProviderSucceeded
                    }
                    Ok(Err(err)) => {
                        last_error = err.to_string();
                        last_kind = "provider";
                        let fatal = err.is_fatal();
                        broker.publish(ProgressEvent::warn(
                            "generation attempt failed",
                            Some(json!({
                                "goal_id": goal_id,
                                "attempt": attempt,
                                "kind": "provider",
                                "fatal": fatal,
                                "error": last_error,
                            })),
                        ));
                        if fatal {
                            fatal_provider = Some(err);
                        }
                        StepOutcome::ProviderFailed { fatal }
                    }
                    Err(_elapsed) => {
                        last_error = ProviderError::Timeout.to_string();
                        last_kind = "timeout";
                        broker.publish(ProgressEvent::warn(
                            "generation attempt failed",
                            Some(json!({
                                "goal_id": goal_id,
                                "attempt": attempt,
                                "kind": "timeout",
                                "timeout_secs": config.provider_timeout.as_secs(),
                            })),
                        ));
                        StepOutcome::ProviderFailed { fatal: false }
                    }
                };
                current = next_state(current, outcome, config.max_attempts);
            }

            PipelineState::Decoding { attempt } => {
                let outcome = match graph::decode_candidate(&raw, &limits) {
                    Ok(decoded) => {
                        candidate = Some(decoded);
                        StepOutcome::DecodeSucceeded
                    }
                    Err(err) => {
                        last_error = err.to_string();
                        last_kind = "decode";
                        broker.publish(ProgressEvent::warn(
                            "generation attempt failed",
                            Some(json!({
                                "goal_id": goal_id,
                                "attempt": attempt,
                                "kind": "decode",
                                "error": last_error,
                            })),
                        ));
                        StepOutcome::DecodeFailed
                    }
                };
                current = next_state(current, outcome, config.max_attempts);
            }

            PipelineState::Validating { attempt } => {
                let decoded = candidate
                    .as_ref()
                    .expect("candidate is decoded before validation");
                broker.publish(ProgressEvent::info(
                    "validating candidate",
                    Some(json!({
                        "goal_id": goal_id,
                        "attempt": attempt,
                        "routes": decoded.routes.len(),
                        "edges": decoded.edges.len(),
                        "decisions": decoded.decisions.len(),
                    })),
                ));

                let report = graph::validate_candidate(decoded);
                let outcome = if report.passed() {
                    broker.publish(ProgressEvent::info(
                        "validation passed",
                        Some(json!({
                            "goal_id": goal_id,
                            "attempt": attempt,
                            "warnings": report.warning_count(),
                        })),
                    ));
                    broker.publish(ProgressEvent::info(
                        "generation attempt succeeded",
                        Some(json!({"goal_id": goal_id, "attempt": attempt})),
                    ));
                    warnings = report.warnings();
                    StepOutcome::ValidationPassed
                } else {
                    last_error = report.summary();
                    last_kind = "validation";
                    broker.publish(ProgressEvent::warn(
                        "validation failed",
                        Some(json!({
                            "goal_id": goal_id,
                            "attempt": attempt,
                            "errors": report.error_count(),
                            "first": last_error,
                        })),
                    ));
                    broker.publish(ProgressEvent::warn(
                        "generation attempt failed",
                        Some(json!({
                            "goal_id": goal_id,
                            "attempt": attempt,
                            "kind": "validation",
                            "error": last_error,
                        })),
                    ));
                    candidate = None;
                    StepOutcome::ValidationFailed
                };
                current = next_state(current, outcome, config.max_attempts);
            }

            PipelineState::CheckingQuality { attempt } => {
                let accepted = candidate
                    .take()
                    .expect("candidate is validated before the quality check");
                let quality_issues = quality::check_plan_quality(&accepted);
                broker.publish(ProgressEvent::info(
                    "quality check",
                    Some(json!({
                        "goal_id": goal_id,
                        "attempt": attempt,
                        "issues": quality_issues.len(),
                    })),
                ));

                plan = Some(Plan {
                    graph: accepted,
                    source: provider.name().to_string(),
                    warnings: std::mem::take(&mut warnings),
                    quality_issues,
                });
                current = next_state(current, StepOutcome::QualityChecked, config.max_attempts);
            }

            PipelineState::Applying => {
                let accepted = plan.as_ref().expect("plan is assembled before apply");
                broker.publish(ProgressEvent::info(
                    "applying plan",
                    Some(json!({
                        "goal_id": goal_id,
                        "routes": accepted.graph.routes.len(),
                        "work_packages": accepted.graph.work_package_count(),
                    })),
                ));

                let outcome = match store.apply(goal_id, accepted).await {
                    Ok(()) => StepOutcome::ApplySucceeded,
                    Err(err) => {
                        last_error = err.to_string();
                        last_kind = "apply";
                        broker.publish(ProgressEvent::error(
                            "plan apply failed",
                            Some(json!({"goal_id": goal_id, "error": last_error})),
                        ));
                        apply_error = Some(err);
                        StepOutcome::ApplyFailed
                    }
                };
                current = next_state(current, outcome, config.max_attempts);
            }

            PipelineState::Succeeded => {
                let mut event = ProgressEvent::info(
                    "generation complete",
                    Some(json!({"goal_id": goal_id, "attempts": attempts_used})),
                );
                if let Some(redirect) = &request.redirect {
                    event = event.with_redirect(redirect.clone());
                }
                broker.publish(event);

                tracing::info!(
                    goal_id = %goal_id,
                    attempts = attempts_used,
                    "generation completed"
                );
                return Ok(plan.expect("pipeline succeeded with a plan"));
            }

            PipelineState::Failed => {
                let error = if let Some(err) = apply_error {
                    GenerationError::Apply(err)
                } else if let Some(err) = fatal_provider {
                    GenerationError::Provider(err)
                } else {
                    GenerationError::AttemptsExhausted {
                        attempts: attempts_used,
                        last: last_error.clone(),
                    }
                };

                broker.publish(ProgressEvent::error(
                    "generation failed",
                    Some(json!({
                        "goal_id": goal_id,
                        "attempts": attempts_used,
                        "kind": last_kind,
                        "error": error.to_string(),
                    })),
                ));

                tracing::warn!(
                    goal_id = %goal_id,
                    attempts = attempts_used,
                    kind = last_kind,
                    error = %error,
                    "generation failed"
                );
                return Err(error);
            }
        }
    }
}

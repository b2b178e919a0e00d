//! The `PlanProvider` trait -- the adapter interface for text-generation
//! backends.
//!
//! Each concrete provider wraps one API surface and translates its failure
//! modes into [`ProviderError`] variants so the orchestrator can classify
//! them as retryable or fatal. The trait is intentionally object-safe so it
//! can be stored as `Arc<dyn PlanProvider>` in server state.

pub mod openai;
mod prompt;

pub use openai::{OpenAiConfig, OpenAiProvider};
pub use prompt::build_plan_prompt;

use async_trait::async_trait;
use thiserror::Error;

/// Structural constraints carried in the provider request.
#[derive(Debug, Clone, Copy)]
pub struct PlanConstraints {
    pub max_routes: usize,
    pub max_tasks_per_route: usize,
    pub max_work_packages_per_task: usize,
}

/// One plan request: the goal, optional free-text context, and the
/// structural constraints the response must respect.
#[derive(Debug, Clone)]
pub struct PlanPrompt {
    pub goal: String,
    pub context: String,
    pub constraints: PlanConstraints,
}

/// Errors from a provider call, classified for the retry policy.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The call exceeded the configured timeout. Retryable.
    #[error("provider request timed out")]
    Timeout,

    /// Connection-level failure. Retryable.
    #[error("network error talking to provider: {0}")]
    Network(String),

    /// Non-success HTTP status. 5xx is retryable, 4xx is fatal.
    #[error("provider returned HTTP status {0}")]
    Status(u16),

    /// Authentication or authorization rejected. Fatal.
    #[error("provider rejected credentials: {0}")]
    Auth(String),

    /// The response envelope did not contain a completion. Retryable, the
    /// provider produced garbage once.
    #[error("malformed provider response envelope: {0}")]
    MalformedEnvelope(String),
}

impl ProviderError {
    /// Fatal errors abandon the remaining retry budget immediately.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Auth(_) => true,
            Self::Status(code) => (400..500).contains(code),
            Self::Timeout | Self::Network(_) | Self::MalformedEnvelope(_) => false,
        }
    }
}

/// Adapter interface for plan-generation backends.
#[async_trait]
pub trait PlanProvider: Send + Sync {
    /// Human-readable name for this provider (e.g. "openai"). Recorded as
    /// the plan source on applied plans.
    fn name(&self) -> &str;

    /// Issue one generation request and return the raw response text.
    ///
    /// Implementations classify failures via [`ProviderError`]; they do
    /// not retry internally -- the orchestrator owns the retry policy.
    async fn complete(&self, prompt: &PlanPrompt) -> Result<String, ProviderError>;
}

// Compile-time assertion: PlanProvider must be object-safe.
const _: () = {
    fn _assert_object_safe(_: &dyn PlanProvider) {}
};

//! The pipeline state machine.
//!
//! Transitions are pure functions over (state, outcome). The async driver
//! in the parent module performs one effect per state, classifies its
//! outcome, and feeds both back into [`next_state`].

/// States of one generation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Issuing provider request number `attempt` (1-based).
    Attempting { attempt: u32 },
    /// Decoding the raw response of `attempt`.
    Decoding { attempt: u32 },
    /// Structurally validating the decoded candidate of `attempt`.
    Validating { attempt: u32 },
    /// Collecting (non-blocking) quality issues for the accepted candidate.
    CheckingQuality { attempt: u32 },
    /// Persisting the accepted plan.
    Applying,
    Succeeded,
    Failed,
}

/// Outcome of the effect performed in a state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    ProviderSucceeded,
    /// `fatal` failures abandon the remaining retry budget immediately.
    ProviderFailed { fatal: bool },
    DecodeSucceeded,
    DecodeFailed,
    ValidationPassed,
    ValidationFailed,
    QualityChecked,
    ApplySucceeded,
    ApplyFailed,
}

/// Compute the next state.
///
/// Retryable failures loop back to `Attempting` with the next attempt
/// number while budget remains, and terminate in `Failed` otherwise. An
/// unexpected state/outcome pairing is a driver bug and lands in `Failed`.
pub fn next_state(state: PipelineState, outcome: StepOutcome, max_attempts: u32) -> PipelineState {
    use PipelineState::*;
    use StepOutcome::*;

    let retry_or_fail = |attempt: u32| {
        if attempt < max_attempts {
            Attempting {
                attempt: attempt + 1,
            }
        } else {
            Failed
        }
    };

    match (state, outcome) {
        (Attempting { attempt }, ProviderSucceeded) => Decoding { attempt },
        (Attempting { .. }, ProviderFailed { fatal: true }) => Failed,
        (Attempting { attempt }, ProviderFailed { fatal: false }) => retry_or_fail(attempt),

        (Decoding { attempt }, DecodeSucceeded) => Validating { attempt },
        (Decoding { attempt }, DecodeFailed) => retry_or_fail(attempt),

        (Validating { attempt }, ValidationPassed) => CheckingQuality { attempt },
        (Validating { attempt }, ValidationFailed) => retry_or_fail(attempt),

        (CheckingQuality { .. }, QualityChecked) => Applying,

        (Applying, ApplySucceeded) => Succeeded,
        (Applying, ApplyFailed) => Failed,

        _ => Failed,
    }
}

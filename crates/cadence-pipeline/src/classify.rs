//! Turns what a step observed into a verdict.

use cadence_types::{CadenceError, Result, StepVerdict};

use crate::config::FailurePolicy;
use crate::step::{StepKind, StepRun};

/// Classify a handler outcome under `policy`.
///
/// Handler errors are system errors and always fail. A failing test run is
/// only tolerated when it reported at least `min_recognized_tests` tests;
/// otherwise its output could not be read and the run is treated as broken.
pub fn classify(
    kind: StepKind,
    policy: FailurePolicy,
    outcome: &Result<StepRun>,
    min_recognized_tests: u64,
) -> StepVerdict {
    let run = match outcome {
        Ok(run) => run,
        Err(e) => return StepVerdict::failed(e.reason()),
    };
    if run.succeeded {
        return StepVerdict::Success;
    }

    let reason = || {
        run.failure
            .clone()
            .unwrap_or_else(|| "step did not succeed".to_string())
    };

    if let Some(counts) = run.detail.test_counts() {
        if counts.total < min_recognized_tests {
            return StepVerdict::failed(
                CadenceError::UnrecognizedOutput {
                    tool: "test".into(),
                    found: counts.total,
                    required: min_recognized_tests,
                }
                .to_string(),
            );
        }
        return match policy {
            FailurePolicy::Tolerant => StepVerdict::Partial,
            FailurePolicy::Fatal => StepVerdict::failed(reason()),
        };
    }

    match policy {
        FailurePolicy::Tolerant => StepVerdict::Warning,
        FailurePolicy::Fatal => {
            tracing::debug!(step = kind.key(), "Fatal step did not succeed");
            StepVerdict::failed(reason())
        }
    }
}

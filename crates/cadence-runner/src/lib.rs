//! Process execution for Cadence pipeline steps.
//!
//! Provides the `ProcessRunner` trait, the `LocalProcessRunner` that spawns
//! real subprocesses, the `ScriptedRunner` used for deterministic runs, and
//! output truncation helpers.

pub mod local;
pub mod runner;
pub mod scripted;
pub mod truncation;

pub use local::LocalProcessRunner;
pub use runner::{ProcessOutput, ProcessRunner, RunOptions, BUILD_TIMEOUT_MS, TEST_TIMEOUT_MS};
pub use scripted::{ScriptedResponse, ScriptedRunner};
pub use truncation::{truncate_output, TruncationMode};

//! Step handler trait and the context handed to every step.

use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;
use cadence_runner::{
    truncate_output, ProcessOutput, ProcessRunner, RunOptions, TruncationMode,
};
use cadence_types::{CadenceError, Result, StepDetail};

use crate::config::PipelineSettings;
use crate::parsers::ParserSet;

/// Longest stretch of collaborator output kept in a failure reason.
const FAILURE_OUTPUT_CHARS: usize = 400;

// ---------------------------------------------------------------------------
// StepKind
// ---------------------------------------------------------------------------

/// The fixed pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepKind {
    Environment,
    Install,
    Audit,
    Lint,
    Test,
    Coverage,
    Artifacts,
}

impl StepKind {
    pub const SEQUENCE: [StepKind; 7] = [
        StepKind::Environment,
        StepKind::Install,
        StepKind::Audit,
        StepKind::Lint,
        StepKind::Test,
        StepKind::Coverage,
        StepKind::Artifacts,
    ];

    /// Name recorded in the report.
    pub fn display_name(&self) -> &'static str {
        match self {
            StepKind::Environment => "Environment validation",
            StepKind::Install => "Dependency installation",
            StepKind::Audit => "Security audit",
            StepKind::Lint => "Lint",
            StepKind::Test => "Test execution",
            StepKind::Coverage => "Coverage report",
            StepKind::Artifacts => "Artifact creation",
        }
    }

    /// Short identifier used in logs and events.
    pub fn key(&self) -> &'static str {
        match self {
            StepKind::Environment => "environment",
            StepKind::Install => "install",
            StepKind::Audit => "audit",
            StepKind::Lint => "lint",
            StepKind::Test => "tests",
            StepKind::Coverage => "coverage",
            StepKind::Artifacts => "artifacts",
        }
    }

    /// Test-class steps get the longer timeout budget.
    pub fn is_test_class(&self) -> bool {
        matches!(self, StepKind::Test | StepKind::Coverage)
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

// ---------------------------------------------------------------------------
// StepContext
// ---------------------------------------------------------------------------

/// Everything a step may touch while it runs.
pub struct StepContext<'a> {
    pub settings: &'a PipelineSettings,
    pub runner: &'a dyn ProcessRunner,
    pub parsers: &'a ParserSet,
}

impl<'a> StepContext<'a> {
    pub fn new(
        settings: &'a PipelineSettings,
        runner: &'a dyn ProcessRunner,
        parsers: &'a ParserSet,
    ) -> Self {
        Self {
            settings,
            runner,
            parsers,
        }
    }

    /// Run options for a command issued by a step of `kind`.
    pub fn options(&self, kind: StepKind) -> RunOptions {
        let mut options = RunOptions::with_timeout(self.settings.timeouts.for_kind(kind))
            .cwd(&self.settings.working_dir)
            .capture_output(self.settings.capture_output);
        for (key, value) in &self.settings.env {
            options = options.env(key, value);
        }
        options
    }

    /// Run `command` for a step of `kind`.
    ///
    /// A non-zero exit comes back as data; a timeout is turned into
    /// [`CadenceError::CommandTimeout`] so it can never be mistaken for one.
    pub async fn run(&self, kind: StepKind, command: &str) -> Result<ProcessOutput> {
        let options = self.options(kind);
        let output = self.runner.run(command, &options).await?;
        if output.timed_out {
            return Err(CadenceError::CommandTimeout {
                command: command.to_string(),
                timeout_ms: options.timeout_ms,
            });
        }
        Ok(output)
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.settings.resolve(relative)
    }
}

// ---------------------------------------------------------------------------
// StepRun
// ---------------------------------------------------------------------------

/// What a handler observed; the orchestrator turns it into a verdict.
#[derive(Debug, Clone, PartialEq)]
pub struct StepRun {
    /// Exit zero and the step's own success predicate held.
    pub succeeded: bool,
    pub detail: StepDetail,
    pub metrics: Vec<(String, f64)>,
    /// Why the step did not succeed; used as the reason when it is fatal.
    pub failure: Option<String>,
}

impl StepRun {
    pub fn passed(detail: StepDetail) -> Self {
        Self {
            succeeded: true,
            detail,
            metrics: Vec::new(),
            failure: None,
        }
    }

    pub fn failed(detail: StepDetail, reason: impl Into<String>) -> Self {
        Self {
            succeeded: false,
            detail,
            metrics: Vec::new(),
            failure: Some(reason.into()),
        }
    }

    pub fn with_metric(mut self, name: impl Into<String>, value: f64) -> Self {
        self.metrics.push((name.into(), value));
        self
    }
}

/// Reason string for a command that exited non-zero.
pub(crate) fn exit_failure(output: &ProcessOutput) -> String {
    let combined = output.combined();
    let tail = combined.trim();
    if tail.is_empty() {
        format!("exited with code {}", output.exit_code)
    } else {
        format!(
            "exited with code {}: {}",
            output.exit_code,
            truncate_output(tail, FAILURE_OUTPUT_CHARS, TruncationMode::Tail)
        )
    }
}

// ---------------------------------------------------------------------------
// StepHandler
// ---------------------------------------------------------------------------

#[async_trait]
pub trait StepHandler: Send + Sync {
    fn kind(&self) -> StepKind;

    /// Name recorded in the report; defaults to the kind's display name.
    fn name(&self) -> &str {
        self.kind().display_name()
    }

    /// Do the step's work. A returned error is a system error.
    async fn execute(&self, ctx: &StepContext<'_>) -> Result<StepRun>;
}

//! Shared types, errors, and the report model for the Cadence pipeline.
//!
//! This crate provides the foundational types used across all other Cadence crates:
//! - `CadenceError` — unified error taxonomy
//! - `StepStatus` / `PipelineStatus` — per-step and overall verdicts
//! - `StepDetail` — typed payload attached to each step
//! - `StepResult` — immutable outcome of one pipeline step
//! - `ReportDraft` / `PipelineReport` — the report lifecycle, from the first
//!   appended step to the finalized, read-only document

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod detail;

pub use detail::{
    ArtifactDetail, AuditDetail, CoverageDetail, CoverageSummary, EnvironmentDetail,
    InstallDetail, LintDetail, StepDetail, TestCounts, TestDetail,
};

/// Unified error type for all Cadence subsystems.
#[derive(Debug, thiserror::Error)]
pub enum CadenceError {
    // === Process Errors ===
    #[error("Failed to start '{command}': {message}")]
    SpawnFailed { command: String, message: String },

    #[error("Command '{command}' timed out after {timeout_ms}ms")]
    CommandTimeout { command: String, timeout_ms: u64 },

    // === Step Errors ===
    #[error("Step '{step}' panicked: {message}")]
    StepPanicked { step: String, message: String },

    #[error("No recognizable {tool} results: found {found}, need at least {required}")]
    UnrecognizedOutput {
        tool: String,
        found: u64,
        required: u64,
    },

    #[error("Required file '{path}' not found")]
    MissingFile { path: String },

    // === Configuration / Rendering ===
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Failed to render {format} report: {message}")]
    Render { format: String, message: String },

    // === Generic ===
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl CadenceError {
    /// Returns `true` if the error came from a command exceeding its time budget.
    pub fn is_timeout(&self) -> bool {
        matches!(self, CadenceError::CommandTimeout { .. })
    }

    /// Errors that abort the pipeline regardless of the step's failure policy.
    pub fn is_system_error(&self) -> bool {
        matches!(
            self,
            CadenceError::SpawnFailed { .. }
                | CadenceError::CommandTimeout { .. }
                | CadenceError::StepPanicked { .. }
                | CadenceError::UnrecognizedOutput { .. }
        )
    }

    /// Short reason recorded in the report when this error aborts a step.
    ///
    /// Timeouts collapse to the bare word `timeout`; the budget is logged
    /// separately.
    pub fn reason(&self) -> String {
        match self {
            CadenceError::CommandTimeout { .. } => "timeout".to_string(),
            other => other.to_string(),
        }
    }
}

/// A convenience alias for `Result<T, CadenceError>`.
pub type Result<T> = std::result::Result<T, CadenceError>;

// ---------------------------------------------------------------------------
// Metric names
// ---------------------------------------------------------------------------

/// Well-known metric keys written into [`PipelineReport::metrics`].
pub mod metrics {
    pub const TESTS_PASSED: &str = "tests.passed";
    pub const TESTS_FAILED: &str = "tests.failed";
    pub const TESTS_SKIPPED: &str = "tests.skipped";
    pub const TESTS_TOTAL: &str = "tests.total";
    pub const TESTS_PASS_RATE: &str = "tests.pass_rate";

    /// Key for a coverage category, e.g. `coverage.branches`.
    pub fn coverage(category: &str) -> String {
        format!("coverage.{category}")
    }
}

// ---------------------------------------------------------------------------
// StepStatus / StepVerdict
// ---------------------------------------------------------------------------

/// Terminal status of a single pipeline step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepStatus {
    Success,
    Warning,
    Partial,
    Failed,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Success => "SUCCESS",
            StepStatus::Warning => "WARNING",
            StepStatus::Partial => "PARTIAL",
            StepStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification of a step, carrying the failure reason when there is one.
///
/// This is the only way to build a [`StepResult`], which keeps
/// `error_message` present exactly when the status is `FAILED`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepVerdict {
    Success,
    Warning,
    Partial,
    Failed { reason: String },
}

impl StepVerdict {
    pub fn failed(reason: impl Into<String>) -> Self {
        StepVerdict::Failed {
            reason: reason.into(),
        }
    }

    pub fn status(&self) -> StepStatus {
        match self {
            StepVerdict::Success => StepStatus::Success,
            StepVerdict::Warning => StepStatus::Warning,
            StepVerdict::Partial => StepStatus::Partial,
            StepVerdict::Failed { .. } => StepStatus::Failed,
        }
    }
}

// ---------------------------------------------------------------------------
// StepResult
// ---------------------------------------------------------------------------

/// Immutable record of one executed pipeline step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub name: String,
    pub status: StepStatus,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub detail: StepDetail,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl StepResult {
    pub fn new(
        name: impl Into<String>,
        started_at: DateTime<Utc>,
        duration_ms: u64,
        detail: StepDetail,
        verdict: StepVerdict,
    ) -> Self {
        let status = verdict.status();
        let error_message = match verdict {
            StepVerdict::Failed { reason } => Some(reason),
            _ => None,
        };
        Self {
            name: name.into(),
            status,
            started_at,
            duration_ms,
            detail,
            error_message,
        }
    }
}

// ---------------------------------------------------------------------------
// PipelineStatus
// ---------------------------------------------------------------------------

/// Overall verdict of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineStatus {
    Success,
    Partial,
    Failed,
}

impl PipelineStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStatus::Success => "SUCCESS",
            PipelineStatus::Partial => "PARTIAL",
            PipelineStatus::Failed => "FAILED",
        }
    }

    /// Aggregate step statuses and the number of quality violations.
    ///
    /// FAILED whenever any step failed; SUCCESS only with every step
    /// successful and no violations; PARTIAL otherwise.
    pub fn aggregate(steps: &[StepResult], violations: usize) -> Self {
        if steps.iter().any(|s| s.status == StepStatus::Failed) {
            PipelineStatus::Failed
        } else if violations > 0 || steps.iter().any(|s| s.status != StepStatus::Success) {
            PipelineStatus::Partial
        } else {
            PipelineStatus::Success
        }
    }
}

impl fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Quality gate verdict
// ---------------------------------------------------------------------------

/// Result of evaluating the quality gate over final metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityGateVerdict {
    pub passed: bool,
    pub pass_rate: f64,
    pub violations: Vec<String>,
}

// ---------------------------------------------------------------------------
// Report lifecycle
// ---------------------------------------------------------------------------

/// Descriptive metadata; never consulted for control flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportMetadata {
    pub project: String,
    pub revision: Option<String>,
    pub build_number: Option<String>,
    pub run_id: String,
}

impl ReportMetadata {
    /// Metadata for `project` with a fresh run id.
    pub fn new(project: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            revision: None,
            build_number: None,
            run_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    pub fn with_revision(mut self, revision: Option<String>) -> Self {
        self.revision = revision;
        self
    }

    pub fn with_build_number(mut self, build_number: Option<String>) -> Self {
        self.build_number = build_number;
        self
    }
}

/// Append-only report accumulated while the pipeline runs.
///
/// Steps, metrics and errors can only be added. [`finalize`](Self::finalize)
/// consumes the draft, so a report is finalized at most once.
#[derive(Debug)]
pub struct ReportDraft {
    metadata: ReportMetadata,
    timestamp: DateTime<Utc>,
    clock: std::time::Instant,
    steps: Vec<StepResult>,
    metrics: BTreeMap<String, f64>,
    errors: Vec<String>,
}

impl ReportDraft {
    pub fn new(metadata: ReportMetadata) -> Self {
        Self {
            metadata,
            timestamp: Utc::now(),
            clock: std::time::Instant::now(),
            steps: Vec::new(),
            metrics: BTreeMap::new(),
            errors: Vec::new(),
        }
    }

    pub fn push_step(&mut self, step: StepResult) {
        self.steps.push(step);
    }

    /// Record a metric. A later value for the same name replaces the earlier one.
    pub fn record_metric(&mut self, name: impl Into<String>, value: f64) {
        self.metrics.insert(name.into(), value);
    }

    pub fn push_error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    pub fn steps(&self) -> &[StepResult] {
        &self.steps
    }

    pub fn metrics(&self) -> &BTreeMap<String, f64> {
        &self.metrics
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn metadata(&self) -> &ReportMetadata {
        &self.metadata
    }

    /// Whether any appended step failed.
    pub fn has_failure(&self) -> bool {
        self.steps.iter().any(|s| s.status == StepStatus::Failed)
    }

    /// Compute the overall status and freeze the report.
    pub fn finalize(self, quality_gate: Option<QualityGateVerdict>) -> PipelineReport {
        let violations = quality_gate.as_ref().map_or(0, |g| g.violations.len());
        let mut status = PipelineStatus::aggregate(&self.steps, violations);
        if !self.errors.is_empty() {
            status = PipelineStatus::Failed;
        }
        PipelineReport {
            status,
            timestamp: self.timestamp,
            project: self.metadata.project,
            revision: self.metadata.revision,
            build_number: self.metadata.build_number,
            run_id: self.metadata.run_id,
            build_time_ms: self.clock.elapsed().as_millis() as u64,
            steps: self.steps,
            metrics: self.metrics,
            errors: self.errors,
            quality_gate,
        }
    }
}

/// Finalized, read-only pipeline report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineReport {
    pub status: PipelineStatus,
    pub timestamp: DateTime<Utc>,
    pub project: String,
    pub revision: Option<String>,
    pub build_number: Option<String>,
    pub run_id: String,
    pub build_time_ms: u64,
    pub steps: Vec<StepResult>,
    pub metrics: BTreeMap<String, f64>,
    pub errors: Vec<String>,
    #[serde(default)]
    pub quality_gate: Option<QualityGateVerdict>,
}

impl PipelineReport {
    /// Look up a step by name.
    pub fn step(&self, name: &str) -> Option<&StepResult> {
        self.steps.iter().find(|s| s.name == name)
    }

    pub fn metric(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).copied()
    }

    /// Number of steps that ended in `status`.
    pub fn count_status(&self, status: StepStatus) -> usize {
        self.steps.iter().filter(|s| s.status == status).count()
    }

    /// Read a report previously written as JSON.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let report: Self = serde_json::from_str(&data)?;
        Ok(report)
    }
}

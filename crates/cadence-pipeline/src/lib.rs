//! Pipeline orchestrator, step handlers, quality gate, and report rendering.
//!
//! This crate drives the fixed build/test sequence: each step's outcome is
//! classified against a per-step failure policy, appended to the report,
//! and at the end the quality gate runs and both report documents are written.

pub mod classify;
pub mod config;
pub mod engine;
pub mod events;
pub mod parsers;
pub mod quality_gate;
pub mod render;
pub mod step;
pub mod steps;

pub use classify::classify;
pub use config::{
    ArtifactSettings, Comparison, ExitPolicy, FailurePolicy, PipelineSettings, PolicyTable,
    QualityThresholds, StepCommands, TestReporter, Threshold, Timeouts,
};
pub use engine::{PipelineOrchestrator, PipelineRun};
pub use events::{EventEmitter, PipelineEvent, RunPhase};
pub use parsers::{
    EslintSummaryParser, IstanbulSummaryParser, JestSummaryParser, LintCounts,
    MochaSummaryParser, NpmAuditParser, ParserSet, TextResultParser,
};
pub use quality_gate::evaluate as evaluate_quality_gate;
pub use render::{DocumentOutcome, ReportRenderer, HTML_REPORT, JSON_REPORT};
pub use step::{StepContext, StepHandler, StepKind, StepRun};
pub use steps::default_steps;

//! Pipeline configuration.
//!
//! Everything the orchestrator would otherwise read from process-wide
//! constants lives in [`PipelineSettings`]: the per-step failure policy, the
//! timeout budgets, the quality thresholds and the collaborator commands.
//! Every field has a default, so a JSON config file only needs to name what
//! it overrides.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use cadence_runner::{BUILD_TIMEOUT_MS, TEST_TIMEOUT_MS};
use cadence_types::{CadenceError, PipelineStatus, Result};
use serde::{Deserialize, Serialize};

use crate::step::StepKind;

// ---------------------------------------------------------------------------
// Failure policy
// ---------------------------------------------------------------------------

/// What a non-zero exit means for a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Failure aborts the pipeline.
    Fatal,
    /// Failure is recorded and execution continues.
    Tolerant,
}

/// Fixed per-step failure policy table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyTable {
    pub environment: FailurePolicy,
    pub install: FailurePolicy,
    pub audit: FailurePolicy,
    pub lint: FailurePolicy,
    pub tests: FailurePolicy,
    pub coverage: FailurePolicy,
    pub artifacts: FailurePolicy,
}

impl PolicyTable {
    pub fn policy(&self, kind: StepKind) -> FailurePolicy {
        match kind {
            StepKind::Environment => self.environment,
            StepKind::Install => self.install,
            StepKind::Audit => self.audit,
            StepKind::Lint => self.lint,
            StepKind::Test => self.tests,
            StepKind::Coverage => self.coverage,
            StepKind::Artifacts => self.artifacts,
        }
    }
}

impl Default for PolicyTable {
    fn default() -> Self {
        Self {
            environment: FailurePolicy::Fatal,
            install: FailurePolicy::Fatal,
            audit: FailurePolicy::Tolerant,
            lint: FailurePolicy::Tolerant,
            tests: FailurePolicy::Tolerant,
            coverage: FailurePolicy::Tolerant,
            artifacts: FailurePolicy::Fatal,
        }
    }
}

// ---------------------------------------------------------------------------
// Timeouts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    pub build_ms: u64,
    pub test_ms: u64,
}

impl Timeouts {
    pub fn for_kind(&self, kind: StepKind) -> u64 {
        if kind.is_test_class() {
            self.test_ms
        } else {
            self.build_ms
        }
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            build_ms: BUILD_TIMEOUT_MS,
            test_ms: TEST_TIMEOUT_MS,
        }
    }
}

// ---------------------------------------------------------------------------
// Quality thresholds
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    /// Actual value must be greater than or equal to the threshold.
    #[default]
    Gte,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Threshold {
    pub threshold: f64,
    #[serde(default)]
    pub comparison: Comparison,
}

impl Threshold {
    pub fn gte(threshold: f64) -> Self {
        Self {
            threshold,
            comparison: Comparison::Gte,
        }
    }

    pub fn is_met(&self, actual: f64) -> bool {
        match self.comparison {
            Comparison::Gte => actual >= self.threshold,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityThresholds {
    /// Coverage category (`statements`, `branches`, ...) → threshold in percent.
    pub coverage: BTreeMap<String, Threshold>,
    /// Minimum test pass rate in percent.
    pub pass_rate: Threshold,
}

impl QualityThresholds {
    /// Every coverage category and the pass rate at the same threshold.
    pub fn uniform(threshold: f64) -> Self {
        let coverage = ["statements", "branches", "functions", "lines"]
            .into_iter()
            .map(|name| (name.to_string(), Threshold::gte(threshold)))
            .collect();
        Self {
            coverage,
            pass_rate: Threshold::gte(threshold),
        }
    }
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            pass_rate: Threshold::gte(90.0),
            ..Self::uniform(80.0)
        }
    }
}

// ---------------------------------------------------------------------------
// Collaborator commands
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StepCommands {
    /// Tool checks run during environment validation; stdout is the version.
    pub environment: Vec<String>,
    pub install: String,
    pub audit: String,
    pub lint: String,
    pub test: String,
    /// Empty to only read an existing coverage summary.
    pub coverage: String,
    /// Optional packaging command run before artifacts are collected.
    pub package: Option<String>,
}

impl Default for StepCommands {
    fn default() -> Self {
        Self {
            environment: vec!["node --version".into(), "npm --version".into()],
            install: "npm ci".into(),
            audit: "npm audit --audit-level=moderate".into(),
            lint: "npm run lint".into(),
            test: "npm test".into(),
            coverage: "npm run coverage".into(),
            package: None,
        }
    }
}

/// Which test-runner summary format to scrape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestReporter {
    /// `N passing` / `N failing` / `N pending`
    #[default]
    Mocha,
    /// `Tests: N failed, N skipped, N passed, N total`
    Jest,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactSettings {
    pub directory: String,
    /// Glob patterns, relative to the working directory, copied into `directory`.
    pub patterns: Vec<String>,
}

impl Default for ArtifactSettings {
    fn default() -> Self {
        Self {
            directory: "artifacts".into(),
            patterns: vec!["package.json".into(), "dist/**".into()],
        }
    }
}

// ---------------------------------------------------------------------------
// Exit policy
// ---------------------------------------------------------------------------

/// Maps the final pipeline status to a process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitPolicy {
    /// Non-zero only when the pipeline FAILED.
    #[default]
    Tolerant,
    /// Non-zero for anything other than SUCCESS.
    Strict,
}

impl ExitPolicy {
    pub fn exit_code(&self, status: PipelineStatus) -> i32 {
        match (self, status) {
            (_, PipelineStatus::Failed) => 1,
            (ExitPolicy::Strict, PipelineStatus::Partial) => 2,
            _ => 0,
        }
    }
}

// ---------------------------------------------------------------------------
// PipelineSettings
// ---------------------------------------------------------------------------

/// Configuration for a pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    /// Report project name; defaults to the manifest `name`, then the directory name.
    pub project_name: Option<String>,
    pub working_dir: PathBuf,
    /// Where both report documents are written; relative to `working_dir`.
    pub reports_dir: PathBuf,
    /// Project manifest; its absence fails environment validation.
    pub manifest: String,
    /// Collaborator config file; only its presence is recorded.
    pub config_file: Option<String>,
    pub coverage_summary: String,
    pub commands: StepCommands,
    pub policies: PolicyTable,
    pub timeouts: Timeouts,
    pub thresholds: QualityThresholds,
    pub artifacts: ArtifactSettings,
    pub test_reporter: TestReporter,
    /// Fewer recognized tests than this on a failing run is a system error.
    pub min_recognized_tests: u64,
    pub capture_output: bool,
    /// Extra environment for every command.
    pub env: HashMap<String, String>,
    pub exit_policy: ExitPolicy,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        let mut env = HashMap::new();
        env.insert("CI".to_string(), "true".to_string());
        Self {
            project_name: None,
            working_dir: PathBuf::from("."),
            reports_dir: PathBuf::from("reports"),
            manifest: "package.json".into(),
            config_file: Some("wdio.conf.js".into()),
            coverage_summary: "coverage/coverage-summary.json".into(),
            commands: StepCommands::default(),
            policies: PolicyTable::default(),
            timeouts: Timeouts::default(),
            thresholds: QualityThresholds::default(),
            artifacts: ArtifactSettings::default(),
            test_reporter: TestReporter::default(),
            min_recognized_tests: 1,
            capture_output: true,
            env,
            exit_policy: ExitPolicy::default(),
        }
    }
}

impl PipelineSettings {
    /// Read settings from a JSON file. Missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let settings: Self = serde_json::from_str(&data)
            .map_err(|e| CadenceError::Config(format!("{}: {}", path.display(), e)))?;
        Ok(settings)
    }

    /// Settings rooted at `working_dir`, everything else default.
    pub fn for_dir(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
            ..Self::default()
        }
    }

    /// Reject settings no run could succeed with.
    pub fn validate(&self) -> Result<()> {
        if self.timeouts.build_ms == 0 || self.timeouts.test_ms == 0 {
            return Err(CadenceError::Config("timeouts must be positive".into()));
        }
        if self.commands.environment.is_empty() {
            return Err(CadenceError::Config(
                "at least one environment check command is required".into(),
            ));
        }
        let all = self
            .thresholds
            .coverage
            .iter()
            .map(|(name, t)| (name.as_str(), t.threshold))
            .chain(std::iter::once(("pass_rate", self.thresholds.pass_rate.threshold)));
        for (name, value) in all {
            if !(0.0..=100.0).contains(&value) {
                return Err(CadenceError::Config(format!(
                    "threshold for {name} must be between 0 and 100, got {value}"
                )));
            }
        }
        for category in self.thresholds.coverage.keys() {
            if !["statements", "branches", "functions", "lines"].contains(&category.as_str()) {
                return Err(CadenceError::Config(format!(
                    "unknown coverage category '{category}'"
                )));
            }
        }
        if self.artifacts.directory.trim().is_empty() {
            return Err(CadenceError::Config("artifact directory must be set".into()));
        }
        Ok(())
    }

    /// Resolve `relative` against the working directory.
    pub fn resolve(&self, relative: impl AsRef<Path>) -> PathBuf {
        let relative = relative.as_ref();
        if relative.is_absolute() {
            relative.to_path_buf()
        } else {
            self.working_dir.join(relative)
        }
    }

    pub fn reports_path(&self) -> PathBuf {
        self.resolve(&self.reports_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_table() {
        let table = PolicyTable::default();
        assert_eq!(table.policy(StepKind::Environment), FailurePolicy::Fatal);
        assert_eq!(table.policy(StepKind::Install), FailurePolicy::Fatal);
        assert_eq!(table.policy(StepKind::Audit), FailurePolicy::Tolerant);
        assert_eq!(table.policy(StepKind::Lint), FailurePolicy::Tolerant);
        assert_eq!(table.policy(StepKind::Test), FailurePolicy::Tolerant);
        assert_eq!(table.policy(StepKind::Coverage), FailurePolicy::Tolerant);
        assert_eq!(table.policy(StepKind::Artifacts), FailurePolicy::Fatal);
    }

    #[test]
    fn timeouts_by_class() {
        let t = Timeouts::default();
        assert_eq!(t.for_kind(StepKind::Install), 300_000);
        assert_eq!(t.for_kind(StepKind::Lint), 300_000);
        assert_eq!(t.for_kind(StepKind::Test), 600_000);
        assert_eq!(t.for_kind(StepKind::Coverage), 600_000);
    }

    #[test]
    fn default_thresholds() {
        let t = QualityThresholds::default();
        assert_eq!(t.pass_rate.threshold, 90.0);
        assert_eq!(t.coverage.len(), 4);
        assert!(t.coverage.values().all(|th| th.threshold == 80.0));
    }

    #[test]
    fn threshold_is_inclusive() {
        let t = Threshold::gte(80.0);
        assert!(t.is_met(80.0));
        assert!(t.is_met(80.1));
        assert!(!t.is_met(79.99));
    }

    #[test]
    fn exit_codes() {
        assert_eq!(ExitPolicy::Tolerant.exit_code(PipelineStatus::Success), 0);
        assert_eq!(ExitPolicy::Tolerant.exit_code(PipelineStatus::Partial), 0);
        assert_eq!(ExitPolicy::Tolerant.exit_code(PipelineStatus::Failed), 1);
        assert_eq!(ExitPolicy::Strict.exit_code(PipelineStatus::Partial), 2);
        assert_eq!(ExitPolicy::Strict.exit_code(PipelineStatus::Success), 0);
    }

    #[test]
    fn partial_json_takes_defaults() {
        let json = r#"{
            "policies": { "lint": "fatal" },
            "thresholds": { "pass_rate": { "threshold": 75 } },
            "commands": { "test": "npx wdio run wdio.conf.js" }
        }"#;
        let settings: PipelineSettings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.policies.lint, FailurePolicy::Fatal);
        assert_eq!(settings.policies.audit, FailurePolicy::Tolerant);
        assert_eq!(settings.thresholds.pass_rate.threshold, 75.0);
        assert_eq!(settings.thresholds.coverage.len(), 4);
        assert_eq!(settings.commands.test, "npx wdio run wdio.conf.js");
        assert_eq!(settings.commands.install, "npm ci");
        assert_eq!(settings.min_recognized_tests, 1);
    }

    #[test]
    fn load_reports_config_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cadence.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = PipelineSettings::load(&path).unwrap_err();
        assert!(matches!(err, CadenceError::Config(_)));

        std::fs::write(&path, r#"{"min_recognized_tests": 3}"#).unwrap();
        let settings = PipelineSettings::load(&path).unwrap();
        assert_eq!(settings.min_recognized_tests, 3);
    }

    #[test]
    fn validate_rejects_bad_values() {
        assert!(PipelineSettings::default().validate().is_ok());

        let mut s = PipelineSettings::default();
        s.timeouts.test_ms = 0;
        assert!(s.validate().is_err());

        let mut s = PipelineSettings::default();
        s.thresholds.pass_rate = Threshold::gte(120.0);
        assert!(s.validate().unwrap_err().to_string().contains("pass_rate"));

        let mut s = PipelineSettings::default();
        s.thresholds
            .coverage
            .insert("mutations".into(), Threshold::gte(50.0));
        assert!(s.validate().unwrap_err().to_string().contains("mutations"));

        let mut s = PipelineSettings::default();
        s.commands.environment.clear();
        assert!(s.validate().is_err());
    }

    #[test]
    fn paths_resolve_against_working_dir() {
        let s = PipelineSettings::for_dir("/work/app");
        assert_eq!(s.reports_path(), PathBuf::from("/work/app/reports"));
        assert_eq!(s.resolve("/abs/file"), PathBuf::from("/abs/file"));
    }
}

//! Typed detail payloads, one variant per step kind.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Structured payload attached to a [`StepResult`](crate::StepResult).
///
/// The orchestrator only looks inside `Tests` (to tell a mixed run from a
/// broken one); everything else is for the renderer, via [`summary`](Self::summary).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepDetail {
    #[default]
    None,
    Message {
        text: String,
    },
    Environment(EnvironmentDetail),
    Install(InstallDetail),
    Audit(AuditDetail),
    Lint(LintDetail),
    Tests(TestDetail),
    Coverage(CoverageDetail),
    Artifacts(ArtifactDetail),
}

impl StepDetail {
    pub fn message(text: impl Into<String>) -> Self {
        StepDetail::Message { text: text.into() }
    }

    /// Test counts when this is a test-execution payload.
    pub fn test_counts(&self) -> Option<&TestCounts> {
        match self {
            StepDetail::Tests(t) => Some(&t.counts),
            _ => None,
        }
    }

    /// One-line human-readable summary.
    pub fn summary(&self) -> String {
        match self {
            StepDetail::None => String::new(),
            StepDetail::Message { text } => text.clone(),
            StepDetail::Environment(d) => d.summary(),
            StepDetail::Install(d) => d.summary(),
            StepDetail::Audit(d) => d.summary(),
            StepDetail::Lint(d) => d.summary(),
            StepDetail::Tests(d) => d.summary(),
            StepDetail::Coverage(d) => d.summary(),
            StepDetail::Artifacts(d) => d.summary(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EnvironmentDetail {
    /// Tool command → reported version string.
    pub tools: BTreeMap<String, String>,
    pub manifest: String,
    pub manifest_present: bool,
    pub config_file: Option<String>,
    pub config_present: bool,
}

impl EnvironmentDetail {
    fn summary(&self) -> String {
        let mut parts: Vec<String> = self
            .tools
            .iter()
            .map(|(tool, version)| format!("{tool}: {version}"))
            .collect();
        parts.push(format!(
            "{} {}",
            self.manifest,
            if self.manifest_present { "present" } else { "missing" }
        ));
        if let Some(ref config) = self.config_file {
            parts.push(format!(
                "{} {}",
                config,
                if self.config_present { "present" } else { "absent" }
            ));
        }
        parts.join(", ")
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct InstallDetail {
    pub dependencies: u64,
    pub dev_dependencies: u64,
    pub exit_code: i32,
}

impl InstallDetail {
    fn summary(&self) -> String {
        format!(
            "{} dependencies, {} dev dependencies",
            self.dependencies, self.dev_dependencies
        )
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AuditDetail {
    pub vulnerabilities: u64,
    pub exit_code: i32,
    /// Tail of the scanner output, kept for triage.
    pub output: String,
}

impl AuditDetail {
    fn summary(&self) -> String {
        if self.exit_code == 0 && self.vulnerabilities == 0 {
            "no known vulnerabilities".to_string()
        } else {
            format!(
                "{} vulnerabilities (exit code {})",
                self.vulnerabilities, self.exit_code
            )
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LintDetail {
    pub errors: u64,
    pub warnings: u64,
    pub exit_code: i32,
    pub output: String,
}

impl LintDetail {
    fn summary(&self) -> String {
        format!(
            "{} errors, {} warnings (exit code {})",
            self.errors, self.warnings, self.exit_code
        )
    }
}

/// Pass/fail/skip counts scraped from test-runner output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TestCounts {
    pub passed: u64,
    pub failed: u64,
    pub skipped: u64,
    pub total: u64,
}

impl TestCounts {
    /// Build counts, deriving `total` from the parts.
    pub fn new(passed: u64, failed: u64, skipped: u64) -> Self {
        Self {
            passed,
            failed,
            skipped,
            total: passed.saturating_add(failed).saturating_add(skipped),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TestDetail {
    pub counts: TestCounts,
    pub exit_code: i32,
}

impl TestDetail {
    fn summary(&self) -> String {
        format!(
            "{} passed, {} failed, {} skipped of {}",
            self.counts.passed, self.counts.failed, self.counts.skipped, self.counts.total
        )
    }
}

/// Coverage percentages per category.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CoverageSummary {
    pub statements: f64,
    pub branches: f64,
    pub functions: f64,
    pub lines: f64,
}

impl CoverageSummary {
    pub const CATEGORIES: [&'static str; 4] = ["statements", "branches", "functions", "lines"];

    pub fn get(&self, category: &str) -> Option<f64> {
        match category {
            "statements" => Some(self.statements),
            "branches" => Some(self.branches),
            "functions" => Some(self.functions),
            "lines" => Some(self.lines),
            _ => None,
        }
    }

    /// `(category, percentage)` pairs in a fixed order.
    pub fn entries(&self) -> [(&'static str, f64); 4] {
        [
            ("statements", self.statements),
            ("branches", self.branches),
            ("functions", self.functions),
            ("lines", self.lines),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CoverageDetail {
    pub summary: CoverageSummary,
    /// Path of the coverage summary document that was read.
    pub source: String,
    /// False when the summary document was absent or unreadable.
    pub found: bool,
    pub exit_code: i32,
}

impl CoverageDetail {
    fn summary(&self) -> String {
        if !self.found {
            return format!("no coverage summary at {}", self.source);
        }
        self.summary
            .entries()
            .iter()
            .map(|(name, pct)| format!("{name} {pct}%"))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ArtifactDetail {
    pub directory: String,
    pub files: Vec<String>,
    pub total_bytes: u64,
}

impl ArtifactDetail {
    fn summary(&self) -> String {
        format!(
            "{} files ({} bytes) in {}",
            self.files.len(),
            self.total_bytes,
            self.directory
        )
    }
}

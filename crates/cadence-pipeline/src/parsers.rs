//! Scrapers for collaborator output.
//!
//! Each collaborator tool gets a [`TextResultParser`]. Parsers never fail:
//! text that does not match the well-known pattern yields zero counts, and
//! the step decides what an empty result means.

use cadence_types::{CoverageSummary, TestCounts};
use regex::Regex;

use crate::config::{PipelineSettings, TestReporter};

pub trait TextResultParser: Send + Sync {
    type Output;

    /// Tool name used in logs.
    fn tool(&self) -> &str;

    fn parse(&self, text: &str) -> Self::Output;
}

/// Sum of the first capture group over every match of `pattern`.
fn sum_matches(pattern: &str, text: &str) -> u64 {
    let Ok(re) = Regex::new(pattern) else {
        return 0;
    };
    re.captures_iter(text)
        .filter_map(|caps| caps.get(1)?.as_str().parse::<u64>().ok())
        .fold(0, u64::saturating_add)
}

/// First capture group of the first match of `pattern`.
fn first_match(pattern: &str, text: &str) -> Option<u64> {
    let re = Regex::new(pattern).ok()?;
    re.captures(text)?.get(1)?.as_str().parse().ok()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

/// Mocha-style summaries: `N passing`, `N failing`, `N pending`.
///
/// Runners that print one summary per spec file (WebdriverIO) are summed.
#[derive(Debug, Default)]
pub struct MochaSummaryParser;

impl TextResultParser for MochaSummaryParser {
    type Output = TestCounts;

    fn tool(&self) -> &str {
        "mocha"
    }

    fn parse(&self, text: &str) -> TestCounts {
        TestCounts::new(
            sum_matches(r"(\d+)\s+passing", text),
            sum_matches(r"(\d+)\s+failing", text),
            sum_matches(r"(\d+)\s+pending", text),
        )
    }
}

/// Jest summary line: `Tests: 1 failed, 2 skipped, 9 passed, 12 total`.
#[derive(Debug, Default)]
pub struct JestSummaryParser;

impl TextResultParser for JestSummaryParser {
    type Output = TestCounts;

    fn tool(&self) -> &str {
        "jest"
    }

    fn parse(&self, text: &str) -> TestCounts {
        let Some(line) = text
            .lines()
            .rev()
            .find(|line| line.trim_start().starts_with("Tests:"))
        else {
            return TestCounts::default();
        };
        TestCounts::new(
            first_match(r"(\d+) passed", line).unwrap_or(0),
            first_match(r"(\d+) failed", line).unwrap_or(0),
            first_match(r"(\d+) skipped", line)
                .unwrap_or(0)
                .saturating_add(first_match(r"(\d+) todo", line).unwrap_or(0)),
        )
    }
}

// ---------------------------------------------------------------------------
// Audit / lint
// ---------------------------------------------------------------------------

/// `found N vulnerabilities` (npm 6), or `N vulnerabilities (…)` and
/// `N high severity vulnerability` (npm 7+).
#[derive(Debug, Default)]
pub struct NpmAuditParser;

impl TextResultParser for NpmAuditParser {
    type Output = u64;

    fn tool(&self) -> &str {
        "npm audit"
    }

    fn parse(&self, text: &str) -> u64 {
        first_match(r"found (\d+) vulnerabilit", text)
            .or_else(|| first_match(r"(\d+) (?:\w+ severity )?vulnerabilit(?:y|ies)", text))
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LintCounts {
    pub errors: u64,
    pub warnings: u64,
}

/// ESLint footer: `✖ N problems (E errors, W warnings)`.
#[derive(Debug, Default)]
pub struct EslintSummaryParser;

impl TextResultParser for EslintSummaryParser {
    type Output = LintCounts;

    fn tool(&self) -> &str {
        "eslint"
    }

    fn parse(&self, text: &str) -> LintCounts {
        let Ok(re) = Regex::new(r"(\d+) problems? \((\d+) errors?, (\d+) warnings?\)") else {
            return LintCounts::default();
        };
        let Some(caps) = re.captures(text) else {
            return LintCounts::default();
        };
        let group = |i: usize| {
            caps.get(i)
                .and_then(|m| m.as_str().parse::<u64>().ok())
                .unwrap_or(0)
        };
        LintCounts {
            errors: group(2),
            warnings: group(3),
        }
    }
}

// ---------------------------------------------------------------------------
// Coverage
// ---------------------------------------------------------------------------

/// Istanbul `coverage-summary.json`: `total.<category>.pct`.
///
/// Returns `None` when the text is not JSON or has no `total` object.
/// Non-numeric percentages (`"Unknown"` for empty projects) read as zero.
#[derive(Debug, Default)]
pub struct IstanbulSummaryParser;

impl TextResultParser for IstanbulSummaryParser {
    type Output = Option<CoverageSummary>;

    fn tool(&self) -> &str {
        "istanbul"
    }

    fn parse(&self, text: &str) -> Option<CoverageSummary> {
        let doc: serde_json::Value = serde_json::from_str(text).ok()?;
        let total = doc.get("total")?.as_object()?;
        let pct = |category: &str| {
            total
                .get(category)
                .and_then(|c| c.get("pct"))
                .and_then(|p| p.as_f64())
                .unwrap_or(0.0)
        };
        Some(CoverageSummary {
            statements: pct("statements"),
            branches: pct("branches"),
            functions: pct("functions"),
            lines: pct("lines"),
        })
    }
}

// ---------------------------------------------------------------------------
// ParserSet
// ---------------------------------------------------------------------------

/// One parser per collaborator; swap any of them to support another tool.
pub struct ParserSet {
    pub tests: Box<dyn TextResultParser<Output = TestCounts>>,
    pub audit: Box<dyn TextResultParser<Output = u64>>,
    pub lint: Box<dyn TextResultParser<Output = LintCounts>>,
    pub coverage: Box<dyn TextResultParser<Output = Option<CoverageSummary>>>,
}

impl ParserSet {
    pub fn from_settings(settings: &PipelineSettings) -> Self {
        let tests: Box<dyn TextResultParser<Output = TestCounts>> = match settings.test_reporter
        {
            TestReporter::Mocha => Box::new(MochaSummaryParser),
            TestReporter::Jest => Box::new(JestSummaryParser),
        };
        Self {
            tests,
            ..Self::default()
        }
    }
}

impl Default for ParserSet {
    fn default() -> Self {
        Self {
            tests: Box::new(MochaSummaryParser),
            audit: Box::new(NpmAuditParser),
            lint: Box::new(EslintSummaryParser),
            coverage: Box::new(IstanbulSummaryParser),
        }
    }
}

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

/// Default time budget for build-class commands (install, audit, lint, package).
pub const BUILD_TIMEOUT_MS: u64 = 300_000;

/// Default time budget for test-class commands (test execution, coverage).
pub const TEST_TIMEOUT_MS: u64 = 600_000;

/// Options for a single command invocation.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub timeout_ms: u64,
    /// When false, the child inherits stdout/stderr and nothing is captured.
    pub capture_output: bool,
    pub cwd: Option<PathBuf>,
    pub env: HashMap<String, String>,
}

impl RunOptions {
    pub fn with_timeout(timeout_ms: u64) -> Self {
        Self {
            timeout_ms,
            ..Self::default()
        }
    }

    pub fn cwd(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn capture_output(mut self, capture: bool) -> Self {
        self.capture_output = capture;
        self
    }
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            timeout_ms: BUILD_TIMEOUT_MS,
            capture_output: true,
            cwd: None,
            env: HashMap::new(),
        }
    }
}

/// Result of executing a command. A non-zero exit is data, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
    pub duration_ms: u64,
}

impl ProcessOutput {
    /// Output of a command that ran to completion.
    pub fn exited(exit_code: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: stdout.into(),
            stderr: stderr.into(),
            timed_out: false,
            duration_ms: 0,
        }
    }

    /// Output of a command that was killed after exceeding `timeout_ms`.
    pub fn timed_out(timeout_ms: u64) -> Self {
        Self {
            exit_code: -1,
            stdout: String::new(),
            stderr: format!("Command timed out after {}ms", timeout_ms),
            timed_out: true,
            duration_ms: timeout_ms,
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0 && !self.timed_out
    }

    /// stdout followed by stderr, for parsers that scan both streams.
    pub fn combined(&self) -> String {
        if self.stderr.is_empty() {
            self.stdout.clone()
        } else if self.stdout.is_empty() {
            self.stderr.clone()
        } else {
            format!("{}\n{}", self.stdout, self.stderr)
        }
    }
}

/// Executes external commands on behalf of pipeline steps.
///
/// Implementations return `Err` only when the command could not be started;
/// exit status and timeouts are reported through [`ProcessOutput`].
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn run(
        &self,
        command: &str,
        options: &RunOptions,
    ) -> cadence_types::Result<ProcessOutput>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options_use_build_budget() {
        let opts = RunOptions::default();
        assert_eq!(opts.timeout_ms, 300_000);
        assert!(opts.capture_output);
        assert!(opts.cwd.is_none());
    }

    #[test]
    fn builder_sets_fields() {
        let opts = RunOptions::with_timeout(TEST_TIMEOUT_MS)
            .cwd("/tmp")
            .env("CI", "true")
            .capture_output(false);
        assert_eq!(opts.timeout_ms, 600_000);
        assert_eq!(opts.cwd.as_deref(), Some(Path::new("/tmp")));
        assert_eq!(opts.env.get("CI").map(String::as_str), Some("true"));
        assert!(!opts.capture_output);
    }

    #[test]
    fn combined_joins_streams() {
        assert_eq!(ProcessOutput::exited(0, "out", "").combined(), "out");
        assert_eq!(ProcessOutput::exited(0, "", "err").combined(), "err");
        assert_eq!(ProcessOutput::exited(1, "out", "err").combined(), "out\nerr");
    }

    #[test]
    fn timed_out_is_never_success() {
        let out = ProcessOutput::timed_out(100);
        assert!(out.timed_out);
        assert!(!out.success());
        assert!(out.stderr.contains("100ms"));
    }
}

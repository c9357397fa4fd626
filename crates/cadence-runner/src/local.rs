use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use cadence_types::CadenceError;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::runner::{ProcessOutput, ProcessRunner, RunOptions};

/// Grace period between SIGTERM and SIGKILL when a command times out.
const TERMINATE_GRACE: Duration = Duration::from_secs(2);

/// Runs commands through `sh -c` on the local machine.
pub struct LocalProcessRunner {
    working_dir: PathBuf,
}

impl LocalProcessRunner {
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
        }
    }

    pub fn current_dir() -> std::io::Result<Self> {
        Ok(Self::new(std::env::current_dir()?))
    }

    pub fn working_directory(&self) -> &Path {
        &self.working_dir
    }

    /// Resolve a path relative to the working directory if it is not absolute.
    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.working_dir.join(path)
        }
    }

    /// Filter environment variables, removing secrets and keeping safe defaults.
    fn filtered_env() -> HashMap<String, String> {
        let exclude_suffixes: &[&str] = &[
            "_api_key",
            "_secret",
            "_token",
            "_password",
            "_credential",
        ];
        let always_include: &[&str] = &[
            "PATH", "HOME", "USER", "SHELL", "LANG", "TERM", "TMPDIR", "CI",
        ];

        std::env::vars()
            .filter(|(key, _)| {
                let lower = key.to_lowercase();
                always_include.contains(&key.as_str())
                    || !exclude_suffixes.iter().any(|s| lower.ends_with(s))
            })
            .collect()
    }
}

async fn read_pipe<R: AsyncRead + Unpin>(pipe: Option<R>) -> String {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        let _ = pipe.read_to_end(&mut buf).await;
    }
    String::from_utf8_lossy(&buf).into_owned()
}

async fn collect(handle: tokio::task::JoinHandle<String>) -> String {
    match tokio::time::timeout(Duration::from_secs(1), handle).await {
        Ok(Ok(text)) => text,
        _ => String::new(),
    }
}

#[async_trait]
impl ProcessRunner for LocalProcessRunner {
    async fn run(
        &self,
        command: &str,
        options: &RunOptions,
    ) -> cadence_types::Result<ProcessOutput> {
        let work_dir = options
            .cwd
            .as_deref()
            .map(|p| self.resolve(p))
            .unwrap_or_else(|| self.working_dir.clone());

        let mut cmd = tokio::process::Command::new("sh");
        cmd.args(["-c", command])
            .current_dir(&work_dir)
            .env_clear()
            .envs(Self::filtered_env())
            .envs(&options.env)
            .kill_on_drop(true);

        if options.capture_output {
            cmd.stdout(std::process::Stdio::piped())
                .stderr(std::process::Stdio::piped());
        } else {
            cmd.stdout(std::process::Stdio::inherit())
                .stderr(std::process::Stdio::inherit());
        }

        // A dedicated process group lets a timeout take down grandchildren too.
        #[cfg(unix)]
        {
            cmd.process_group(0);
        }

        tracing::debug!(command = %command, cwd = %work_dir.display(), timeout_ms = options.timeout_ms, "Spawning command");

        let start = tokio::time::Instant::now();
        let mut child = cmd.spawn().map_err(|e| CadenceError::SpawnFailed {
            command: command.to_string(),
            message: e.to_string(),
        })?;

        let stdout_task = tokio::spawn(read_pipe(child.stdout.take()));
        let stderr_task = tokio::spawn(read_pipe(child.stderr.take()));

        let timeout_dur = Duration::from_millis(options.timeout_ms);

        tokio::select! {
            status = child.wait() => {
                let status = status?;
                let stdout = collect(stdout_task).await;
                let stderr = collect(stderr_task).await;
                let duration_ms = start.elapsed().as_millis() as u64;
                let exit_code = status.code().unwrap_or(-1);
                tracing::debug!(command = %command, exit_code, duration_ms, "Command finished");
                Ok(ProcessOutput {
                    exit_code,
                    stdout,
                    stderr,
                    timed_out: false,
                    duration_ms,
                })
            }
            _ = tokio::time::sleep(timeout_dur) => {
                #[cfg(unix)]
                {
                    if let Some(pid) = child.id() {
                        // Negative pid addresses the whole process group.
                        unsafe { libc::kill(-(pid as i32), libc::SIGTERM); }
                    }
                    tokio::select! {
                        _ = child.wait() => {}
                        _ = tokio::time::sleep(TERMINATE_GRACE) => {
                            if let Some(pid) = child.id() {
                                unsafe { libc::kill(-(pid as i32), libc::SIGKILL); }
                            }
                            let _ = child.kill().await;
                        }
                    }
                }
                #[cfg(not(unix))]
                {
                    let _ = child.kill().await;
                }

                let stdout = collect(stdout_task).await;
                let partial_stderr = collect(stderr_task).await;
                let duration_ms = start.elapsed().as_millis() as u64;
                tracing::warn!(command = %command, timeout_ms = options.timeout_ms, "Command timed out");

                let mut output = ProcessOutput::timed_out(options.timeout_ms);
                output.stdout = stdout;
                if !partial_stderr.is_empty() {
                    output.stderr = format!("{}\n{}", partial_stderr, output.stderr);
                }
                output.duration_ms = duration_ms;
                Ok(output)
            }
        }
    }
}

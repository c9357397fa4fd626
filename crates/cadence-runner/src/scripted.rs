//! A [`ProcessRunner`] that replays canned responses.
//!
//! Responses are keyed by the exact command text. When several responses are
//! queued for one command they are handed out in order, and the last one
//! repeats. Every invocation is recorded so tests can assert on what ran.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use cadence_types::CadenceError;

use crate::runner::{ProcessOutput, ProcessRunner, RunOptions};

/// One canned reaction to a command.
#[derive(Debug, Clone)]
pub enum ScriptedResponse {
    Output(ProcessOutput),
    /// Behave as if the timeout fired.
    Timeout,
    /// Fail to start the process.
    SpawnError(String),
}

pub struct ScriptedRunner {
    responses: Mutex<HashMap<String, VecDeque<ScriptedResponse>>>,
    fallback: Option<ScriptedResponse>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedRunner {
    /// Runner where unscripted commands succeed with empty output.
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(HashMap::new()),
            fallback: Some(ScriptedResponse::Output(ProcessOutput::exited(0, "", ""))),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Runner where unscripted commands fail to spawn.
    pub fn strict() -> Self {
        Self {
            fallback: None,
            ..Self::new()
        }
    }

    pub fn respond(self, command: impl Into<String>, response: ScriptedResponse) -> Self {
        self.responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(command.into())
            .or_default()
            .push_back(response);
        self
    }

    /// Script an exit code with stdout.
    pub fn exit(self, command: impl Into<String>, exit_code: i32, stdout: &str) -> Self {
        self.respond(
            command,
            ScriptedResponse::Output(ProcessOutput::exited(exit_code, stdout, "")),
        )
    }

    pub fn timeout(self, command: impl Into<String>) -> Self {
        self.respond(command, ScriptedResponse::Timeout)
    }

    pub fn spawn_error(self, command: impl Into<String>, message: impl Into<String>) -> Self {
        self.respond(command, ScriptedResponse::SpawnError(message.into()))
    }

    /// Commands run so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn next_response(&self, command: &str) -> Option<ScriptedResponse> {
        let mut responses = self.responses.lock().unwrap_or_else(|e| e.into_inner());
        match responses.get_mut(command) {
            Some(queue) if queue.len() > 1 => queue.pop_front(),
            Some(queue) => queue.front().cloned(),
            None => self.fallback.clone(),
        }
    }
}

impl Default for ScriptedRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProcessRunner for ScriptedRunner {
    async fn run(
        &self,
        command: &str,
        options: &RunOptions,
    ) -> cadence_types::Result<ProcessOutput> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(command.to_string());

        match self.next_response(command) {
            Some(ScriptedResponse::Output(mut output)) => {
                if !options.capture_output {
                    output.stdout.clear();
                    output.stderr.clear();
                }
                Ok(output)
            }
            Some(ScriptedResponse::Timeout) => Ok(ProcessOutput::timed_out(options.timeout_ms)),
            Some(ScriptedResponse::SpawnError(message)) => Err(CadenceError::SpawnFailed {
                command: command.to_string(),
                message,
            }),
            None => Err(CadenceError::SpawnFailed {
                command: command.to_string(),
                message: "no scripted response".into(),
            }),
        }
    }
}

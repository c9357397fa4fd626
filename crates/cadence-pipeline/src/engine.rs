//! Pipeline orchestrator: the step loop and the report lifecycle.
//!
//! Steps run strictly in order. Each one goes through the same envelope:
//! record the start, execute the handler, catch error returns and panics,
//! classify, append. A FAILED step aborts the sequence. Finalization always
//! runs and always attempts to write both report documents.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use cadence_runner::ProcessRunner;
use cadence_types::{
    metrics, CadenceError, PipelineReport, ReportDraft, ReportMetadata, StepDetail, StepResult,
    StepStatus,
};
use chrono::Utc;
use futures::FutureExt;

use crate::classify::classify;
use crate::config::{ExitPolicy, PipelineSettings};
use crate::events::{EventEmitter, PipelineEvent, RunPhase};
use crate::parsers::ParserSet;
use crate::quality_gate;
use crate::render::{DocumentOutcome, ReportRenderer};
use crate::step::{StepContext, StepHandler};
use crate::steps::default_steps;

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

pub struct PipelineOrchestrator {
    settings: PipelineSettings,
    runner: Arc<dyn ProcessRunner>,
    steps: Vec<Box<dyn StepHandler>>,
    parsers: ParserSet,
    renderer: ReportRenderer,
    events: EventEmitter,
}

/// A finished run: the frozen report and what happened to its documents.
#[derive(Debug)]
pub struct PipelineRun {
    pub report: PipelineReport,
    pub documents: Vec<DocumentOutcome>,
}

impl PipelineRun {
    pub fn exit_code(&self, policy: ExitPolicy) -> i32 {
        policy.exit_code(self.report.status)
    }

    pub fn document(&self, format: &str) -> Option<&DocumentOutcome> {
        self.documents.iter().find(|d| d.format == format)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

// ---------------------------------------------------------------------------
// PipelineOrchestrator
// ---------------------------------------------------------------------------

impl PipelineOrchestrator {
    /// Orchestrator with the standard step sequence and parsers chosen by `settings`.
    pub fn new(settings: PipelineSettings, runner: Arc<dyn ProcessRunner>) -> Self {
        let parsers = ParserSet::from_settings(&settings);
        let renderer = ReportRenderer::new(settings.reports_path());
        Self {
            settings,
            runner,
            steps: default_steps(),
            parsers,
            renderer,
            events: EventEmitter::default(),
        }
    }

    pub fn with_steps(mut self, steps: Vec<Box<dyn StepHandler>>) -> Self {
        self.steps = steps;
        self
    }

    pub fn with_parsers(mut self, parsers: ParserSet) -> Self {
        self.parsers = parsers;
        self
    }

    pub fn with_events(mut self, events: EventEmitter) -> Self {
        self.events = events;
        self
    }

    pub fn events(&self) -> &EventEmitter {
        &self.events
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    fn enter_phase(&self, phase: RunPhase) {
        tracing::debug!(phase = phase.as_str(), "Pipeline phase");
        self.events.emit(PipelineEvent::PhaseChanged { phase });
    }

    /// Run every step, finalize the report and write both documents.
    ///
    /// Never fails: every fault ends up in the report.
    pub async fn run(&self, metadata: ReportMetadata) -> PipelineRun {
        let mut draft = ReportDraft::new(metadata);
        let run_id = draft.metadata().run_id.clone();
        tracing::info!(
            project = %draft.metadata().project,
            run_id = %run_id,
            steps = self.steps.len(),
            "Pipeline started"
        );
        self.events.emit(PipelineEvent::PipelineStarted {
            project: draft.metadata().project.clone(),
            run_id,
            step_count: self.steps.len(),
        });
        self.enter_phase(RunPhase::Running);

        for (index, handler) in self.steps.iter().enumerate() {
            let (result, step_metrics) = self.execute_step(handler.as_ref(), index).await;
            for (name, value) in step_metrics {
                draft.record_metric(name, value);
            }

            let abort_reason = match result.status {
                StepStatus::Failed => result.error_message.clone(),
                _ => None,
            };
            let step_name = result.name.clone();
            draft.push_step(result);

            if let Some(reason) = abort_reason {
                self.enter_phase(RunPhase::Aborting);
                tracing::error!(step = %step_name, reason = %reason, "Pipeline aborted");
                draft.push_error(format!("{step_name} failed: {reason}"));
                self.events.emit(PipelineEvent::PipelineAborted {
                    step: step_name,
                    reason,
                });
                break;
            }
        }

        self.enter_phase(RunPhase::Finalizing);
        let gate = if draft.has_failure() {
            None
        } else {
            let verdict = quality_gate::evaluate(draft.metrics(), &self.settings.thresholds);
            draft.record_metric(metrics::TESTS_PASS_RATE, verdict.pass_rate);
            for violation in &verdict.violations {
                tracing::warn!(violation = %violation, "Quality gate violation");
            }
            self.events.emit(PipelineEvent::QualityGateEvaluated {
                passed: verdict.passed,
                violations: verdict.violations.clone(),
            });
            Some(verdict)
        };

        let report = draft.finalize(gate);
        let documents = self.renderer.write_all(&report).await;
        for doc in &documents {
            let event = match &doc.error {
                None => PipelineEvent::ReportWritten {
                    format: doc.format.to_string(),
                    path: doc.path.display().to_string(),
                },
                Some(error) => PipelineEvent::ReportFailed {
                    format: doc.format.to_string(),
                    error: error.clone(),
                },
            };
            self.events.emit(event);
        }

        self.enter_phase(RunPhase::Finished);
        tracing::info!(
            status = %report.status,
            build_time_ms = report.build_time_ms,
            "Pipeline finished"
        );
        self.events.emit(PipelineEvent::PipelineFinished {
            status: report.status,
            build_time_ms: report.build_time_ms,
        });

        PipelineRun { report, documents }
    }

    /// The step envelope. Nothing a handler does escapes it.
    async fn execute_step(
        &self,
        handler: &dyn StepHandler,
        index: usize,
    ) -> (StepResult, Vec<(String, f64)>) {
        let kind = handler.kind();
        let name = handler.name().to_string();
        self.events.emit(PipelineEvent::StepStarted {
            step: name.clone(),
            index,
        });
        tracing::info!(step = %name, "Step started");

        let started_at = Utc::now();
        let clock = Instant::now();
        let ctx = StepContext::new(&self.settings, self.runner.as_ref(), &self.parsers);

        let outcome = match AssertUnwindSafe(handler.execute(&ctx)).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(payload) => Err(CadenceError::StepPanicked {
                step: name.clone(),
                message: panic_message(payload.as_ref()),
            }),
        };
        let duration_ms = clock.elapsed().as_millis() as u64;

        let policy = self.settings.policies.policy(kind);
        let verdict = classify(kind, policy, &outcome, self.settings.min_recognized_tests);
        let (detail, step_metrics) = match outcome {
            Ok(run) => (run.detail, run.metrics),
            Err(e) => (StepDetail::message(e.to_string()), Vec::new()),
        };

        let result = StepResult::new(name, started_at, duration_ms, detail, verdict);
        let summary = result.detail.summary();
        match result.status {
            StepStatus::Success => {
                tracing::info!(step = %result.name, status = %result.status, duration_ms, "Step completed")
            }
            StepStatus::Warning | StepStatus::Partial => {
                tracing::warn!(step = %result.name, status = %result.status, duration_ms, summary = %summary, "Step completed with issues")
            }
            StepStatus::Failed => tracing::error!(
                step = %result.name,
                status = %result.status,
                duration_ms,
                error = result.error_message.as_deref().unwrap_or(""),
                "Step failed"
            ),
        }
        self.events.emit(PipelineEvent::StepCompleted {
            step: result.name.clone(),
            status: result.status,
            duration_ms,
            summary,
        });

        (result, step_metrics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::{StepKind, StepRun};
    use async_trait::async_trait;
    use cadence_runner::ScriptedRunner;
    use cadence_types::PipelineStatus;
    use tempfile::TempDir;

    struct Fixed {
        kind: StepKind,
        run: StepRun,
    }

    #[async_trait]
    impl StepHandler for Fixed {
        fn kind(&self) -> StepKind {
            self.kind
        }

        async fn execute(&self, _ctx: &StepContext<'_>) -> cadence_types::Result<StepRun> {
            Ok(self.run.clone())
        }
    }

    struct Panics;

    #[async_trait]
    impl StepHandler for Panics {
        fn kind(&self) -> StepKind {
            StepKind::Lint
        }

        async fn execute(&self, _ctx: &StepContext<'_>) -> cadence_types::Result<StepRun> {
            panic!("linter exploded");
        }
    }

    fn orchestrator(dir: &TempDir, steps: Vec<Box<dyn StepHandler>>) -> PipelineOrchestrator {
        let mut settings = PipelineSettings::for_dir(dir.path());
        settings.thresholds = crate::config::QualityThresholds {
            coverage: Default::default(),
            pass_rate: crate::config::Threshold::gte(0.0),
        };
        PipelineOrchestrator::new(settings, Arc::new(ScriptedRunner::new())).with_steps(steps)
    }

    #[test]
    fn panic_payloads() {
        let boxed: Box<dyn Any + Send> = Box::new("static");
        assert_eq!(panic_message(boxed.as_ref()), "static");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(boxed.as_ref()), "owned");
        let boxed: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(boxed.as_ref()), "unknown panic");
    }

    #[tokio::test]
    async fn panicking_step_is_a_failed_result() {
        let dir = TempDir::new().unwrap();
        let orch = orchestrator(
            &dir,
            vec![
                Box::new(Panics),
                Box::new(Fixed {
                    kind: StepKind::Artifacts,
                    run: StepRun::passed(StepDetail::None),
                }),
            ],
        );

        let run = orch.run(ReportMetadata::new("app")).await;
        assert_eq!(run.report.status, PipelineStatus::Failed);
        assert_eq!(run.report.steps.len(), 1);
        assert_eq!(
            run.report.errors,
            vec!["Lint failed: Step 'Lint' panicked: linter exploded".to_string()]
        );
        assert!(run.report.quality_gate.is_none());
        assert!(run.documents.iter().all(DocumentOutcome::written));
    }

    #[tokio::test]
    async fn events_follow_the_lifecycle() {
        let dir = TempDir::new().unwrap();
        let orch = orchestrator(
            &dir,
            vec![Box::new(Fixed {
                kind: StepKind::Audit,
                run: StepRun::failed(StepDetail::None, "exited with code 1"),
            })],
        );
        let mut rx = orch.events().subscribe();

        let run = orch.run(ReportMetadata::new("app")).await;
        assert_eq!(run.report.status, PipelineStatus::Partial);

        let mut phases = Vec::new();
        let mut completed = Vec::new();
        while let Ok(event) = rx.try_recv() {
            match event {
                PipelineEvent::PhaseChanged { phase } => phases.push(phase),
                PipelineEvent::StepCompleted { step, status, .. } => completed.push((step, status)),
                _ => {}
            }
        }
        assert_eq!(
            phases,
            vec![RunPhase::Running, RunPhase::Finalizing, RunPhase::Finished]
        );
        assert_eq!(
            completed,
            vec![("Security audit".to_string(), StepStatus::Warning)]
        );
    }

    #[tokio::test]
    async fn pass_rate_is_recorded_with_the_gate() {
        let dir = TempDir::new().unwrap();
        let orch = orchestrator(
            &dir,
            vec![Box::new(Fixed {
                kind: StepKind::Test,
                run: StepRun::passed(StepDetail::None)
                    .with_metric(metrics::TESTS_PASSED, 3.0)
                    .with_metric(metrics::TESTS_TOTAL, 4.0),
            })],
        );

        let run = orch.run(ReportMetadata::new("app")).await;
        assert_eq!(run.report.metric(metrics::TESTS_PASS_RATE), Some(75.0));
        assert_eq!(run.report.status, PipelineStatus::Success);
        assert_eq!(run.exit_code(ExitPolicy::Strict), 0);
        assert!(run.document("json").is_some_and(DocumentOutcome::written));
    }

    /// Counts `ok` lines as passing tests.
    struct TapLike;

    impl crate::parsers::TextResultParser for TapLike {
        type Output = cadence_types::TestCounts;

        fn tool(&self) -> &str {
            "tap"
        }

        fn parse(&self, text: &str) -> cadence_types::TestCounts {
            let passed = text.lines().filter(|l| l.starts_with("ok")).count() as u64;
            cadence_types::TestCounts::new(passed, 0, 0)
        }
    }

    #[tokio::test]
    async fn custom_parsers_and_shared_emitter() {
        let dir = TempDir::new().unwrap();
        let emitter = EventEmitter::new(32);
        let mut rx = emitter.subscribe();
        let runner = ScriptedRunner::new().exit("npm test", 0, "ok 1 login\nok 2 checkout\n");
        let parsers = ParserSet {
            tests: Box::new(TapLike),
            ..ParserSet::default()
        };

        let settings = orchestrator(&dir, Vec::new()).settings().clone();
        let orch = PipelineOrchestrator::new(settings, Arc::new(runner))
            .with_steps(vec![Box::new(crate::steps::TestStep)])
            .with_parsers(parsers)
            .with_events(emitter);

        let run = orch.run(ReportMetadata::new("app")).await;
        assert_eq!(run.report.metric(metrics::TESTS_PASSED), Some(2.0));
        assert_eq!(run.report.status, PipelineStatus::Success);
        assert!(matches!(
            rx.try_recv(),
            Ok(PipelineEvent::PipelineStarted { step_count: 1, .. })
        ));
    }
}

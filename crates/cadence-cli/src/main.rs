//! CLI binary for running the build/test pipeline and inspecting its reports.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use cadence_pipeline::{
    ExitPolicy, PipelineEvent, PipelineOrchestrator, PipelineSettings, ReportRenderer, RunPhase,
    JSON_REPORT,
};
use cadence_runner::{LocalProcessRunner, ProcessRunner, ScriptedRunner};
use cadence_types::{PipelineReport, ReportDraft, ReportMetadata};
use clap::{Parser, Subcommand};
use tokio::sync::broadcast::error::RecvError;

#[derive(Parser)]
#[command(name = "cadence", version, about = "Build/test pipeline runner with JSON and HTML reports")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline
    Run {
        /// JSON settings file; missing fields take their defaults
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Project directory (overrides the settings file)
        #[arg(short, long)]
        workdir: Option<PathBuf>,

        /// Reports directory, relative to the project directory
        #[arg(short, long)]
        reports: Option<PathBuf>,

        /// Project name shown in the report (default: manifest name)
        #[arg(long)]
        project: Option<String>,

        /// Source revision recorded in the report
        #[arg(long, env = "CADENCE_REVISION")]
        revision: Option<String>,

        /// CI build number recorded in the report
        #[arg(long, env = "BUILD_NUMBER")]
        build_number: Option<String>,

        /// Exit non-zero unless the pipeline fully succeeds
        #[arg(long)]
        strict: bool,

        /// Answer every command with an empty success instead of running it
        #[arg(long)]
        rehearse: bool,
    },

    /// Validate a settings file and print the effective configuration
    ValidateConfig {
        /// JSON settings file (default: built-in settings)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Summarize a previously written JSON report
    Show {
        /// Path to pipeline-report.json
        report: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run {
            config,
            workdir,
            reports,
            project,
            revision,
            build_number,
            strict,
            rehearse,
        } => {
            let overrides = RunOverrides {
                workdir,
                reports,
                project,
                strict,
            };
            let (settings, config_error) = match load_settings(config.as_deref()) {
                Ok(mut settings) => {
                    overrides.apply(&mut settings);
                    let error = settings.validate().err().map(anyhow::Error::from);
                    (settings, error)
                }
                Err(e) => {
                    let mut fallback = PipelineSettings::default();
                    overrides.apply(&mut fallback);
                    (fallback, Some(e))
                }
            };
            let metadata = ReportMetadata::new(project_name(&settings))
                .with_revision(revision)
                .with_build_number(build_number);

            if let Some(error) = config_error {
                println!("[ERROR] {error:#}");
                record_config_failure(&settings, metadata, &error).await;
                std::process::exit(1);
            }

            let code = cmd_run(settings, metadata, rehearse).await?;
            if code != 0 {
                std::process::exit(code);
            }
        }
        Commands::ValidateConfig { config } => {
            cmd_validate_config(config.as_deref())?;
        }
        Commands::Show { report } => {
            cmd_show(&report)?;
        }
    }

    Ok(())
}

/// `run` flags that override the settings file.
struct RunOverrides {
    workdir: Option<PathBuf>,
    reports: Option<PathBuf>,
    project: Option<String>,
    strict: bool,
}

impl RunOverrides {
    fn apply(&self, settings: &mut PipelineSettings) {
        if let Some(dir) = &self.workdir {
            settings.working_dir = dir.clone();
        }
        if let Some(dir) = &self.reports {
            settings.reports_dir = dir.clone();
        }
        if self.project.is_some() {
            settings.project_name = self.project.clone();
        }
        if self.strict {
            settings.exit_policy = ExitPolicy::Strict;
        }
    }
}

fn load_settings(path: Option<&Path>) -> anyhow::Result<PipelineSettings> {
    match path {
        Some(path) => Ok(PipelineSettings::load(path)?),
        None => Ok(PipelineSettings::default()),
    }
}

/// Explicit name, then the manifest's `name`, then the directory name.
fn project_name(settings: &PipelineSettings) -> String {
    if let Some(name) = &settings.project_name {
        return name.clone();
    }
    let from_manifest = std::fs::read_to_string(settings.resolve(&settings.manifest))
        .ok()
        .and_then(|text| serde_json::from_str::<serde_json::Value>(&text).ok())
        .and_then(|doc| doc.get("name")?.as_str().map(str::to_string));
    if let Some(name) = from_manifest {
        return name;
    }
    std::fs::canonicalize(&settings.working_dir)
        .ok()
        .and_then(|dir| dir.file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "project".to_string())
}

/// Console line for a pipeline event, if it deserves one.
fn narrate(event: &PipelineEvent) -> Option<String> {
    match event {
        PipelineEvent::PipelineStarted {
            project,
            run_id,
            step_count,
        } => Some(format!("Running pipeline for {project} ({step_count} steps, run {run_id})")),
        PipelineEvent::StepStarted { step, index } => Some(format!("[{}] {}...", index + 1, step)),
        PipelineEvent::StepCompleted {
            step,
            status,
            duration_ms,
            summary,
        } => {
            let mut line = format!(
                "    {:<8} {} ({:.1}s)",
                status.as_str(),
                step,
                *duration_ms as f64 / 1000.0
            );
            if !summary.is_empty() {
                line.push_str(" - ");
                line.push_str(summary);
            }
            Some(line)
        }
        PipelineEvent::PipelineAborted { step, reason } => {
            Some(format!("Aborting: {step} failed: {reason}"))
        }
        PipelineEvent::PhaseChanged { phase } => match phase {
            RunPhase::Finalizing => Some("Finalizing report...".to_string()),
            _ => None,
        },
        PipelineEvent::QualityGateEvaluated { passed, violations } => {
            if *passed {
                Some("Quality gate passed".to_string())
            } else {
                let mut text = String::from("Quality gate violations:");
                for v in violations {
                    text.push_str("\n  - ");
                    text.push_str(v);
                }
                Some(text)
            }
        }
        PipelineEvent::ReportWritten { format, path } => {
            Some(format!("Wrote {format} report: {path}"))
        }
        PipelineEvent::ReportFailed { format, error } => {
            Some(format!("Could not write {format} report: {error}"))
        }
        PipelineEvent::PipelineFinished {
            status,
            build_time_ms,
        } => Some(format!(
            "Pipeline {} in {:.1}s",
            status,
            *build_time_ms as f64 / 1000.0
        )),
    }
}

async fn cmd_run(
    settings: PipelineSettings,
    metadata: ReportMetadata,
    rehearse: bool,
) -> anyhow::Result<i32> {
    let exit_policy = settings.exit_policy;

    let runner: Arc<dyn ProcessRunner> = if rehearse {
        println!("(rehearsal: commands are not executed)");
        Arc::new(ScriptedRunner::new())
    } else {
        Arc::new(LocalProcessRunner::current_dir()?)
    };

    let orchestrator = PipelineOrchestrator::new(settings, runner);
    let mut rx = orchestrator.events().subscribe();
    let narrator = tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if let Some(line) = narrate(&event) {
                        println!("{line}");
                    }
                }
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
    });

    let result = orchestrator.run(metadata).await;
    // Dropping the orchestrator closes the event channel and ends the narrator.
    drop(orchestrator);
    let _ = narrator.await;

    let code = result.exit_code(exit_policy);
    tracing::debug!(
        status = %result.report.status,
        exit_code = code,
        documents = result.documents.iter().filter(|d| d.written()).count(),
        "Run complete"
    );
    Ok(code)
}

/// Write a FAILED report for a run that could not start because its
/// configuration was rejected.
async fn record_config_failure(
    settings: &PipelineSettings,
    metadata: ReportMetadata,
    error: &anyhow::Error,
) -> PipelineReport {
    let mut draft = ReportDraft::new(metadata);
    draft.push_error(format!("Configuration failed: {error:#}"));
    let report = draft.finalize(None);

    let renderer = ReportRenderer::new(settings.reports_path());
    for doc in renderer.write_all(&report).await {
        match &doc.error {
            None => println!("Wrote {} report: {}", doc.format, doc.path.display()),
            Some(e) => println!("Could not write {} report: {e}", doc.format),
        }
    }
    report
}

fn cmd_validate_config(path: Option<&Path>) -> anyhow::Result<()> {
    let settings = load_settings(path)?;
    match settings.validate() {
        Ok(()) => {
            println!("{}", serde_json::to_string_pretty(&settings)?);
            println!("Configuration is valid");
            Ok(())
        }
        Err(e) => {
            println!("[ERROR] {e}");
            std::process::exit(1);
        }
    }
}

fn render_summary(report: &PipelineReport) -> String {
    let mut lines = vec![
        format!("Project: {}", report.project),
        format!("Status: {}", report.status),
        format!("Run: {} at {}", report.run_id, report.timestamp.to_rfc3339()),
    ];
    if let Some(revision) = &report.revision {
        lines.push(format!("Revision: {revision}"));
    }
    if let Some(build) = &report.build_number {
        lines.push(format!("Build: {build}"));
    }
    lines.push(format!("Build time: {:.1}s", report.build_time_ms as f64 / 1000.0));

    lines.push("\nSteps:".to_string());
    for step in &report.steps {
        let mut line = format!("  {:<8} {}", step.status.as_str(), step.name);
        let summary = step.detail.summary();
        if !summary.is_empty() {
            line.push_str(&format!(" - {summary}"));
        }
        if let Some(message) = &step.error_message {
            line.push_str(&format!(" [{message}]"));
        }
        lines.push(line);
    }

    if !report.metrics.is_empty() {
        lines.push("\nMetrics:".to_string());
        for (name, value) in &report.metrics {
            lines.push(format!("  {name} = {value}"));
        }
    }

    match &report.quality_gate {
        Some(gate) if gate.passed => lines.push("\nQuality gate: passed".to_string()),
        Some(gate) => {
            lines.push("\nQuality gate: violated".to_string());
            for v in &gate.violations {
                lines.push(format!("  - {v}"));
            }
        }
        None => lines.push("\nQuality gate: not evaluated".to_string()),
    }

    if !report.errors.is_empty() {
        lines.push("\nErrors:".to_string());
        for e in &report.errors {
            lines.push(format!("  - {e}"));
        }
    }
    lines.join("\n")
}

fn cmd_show(path: &Path) -> anyhow::Result<()> {
    let report = PipelineReport::load(path)?;
    println!("{}", render_summary(&report));
    Ok(())
}

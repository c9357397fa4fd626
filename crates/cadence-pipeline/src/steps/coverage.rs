use async_trait::async_trait;
use cadence_types::{metrics, CoverageDetail, Result, StepDetail};

use crate::step::{exit_failure, StepContext, StepHandler, StepKind, StepRun};

/// Runs the coverage command and reads the generated summary document.
pub struct CoverageStep;

#[async_trait]
impl StepHandler for CoverageStep {
    fn kind(&self) -> StepKind {
        StepKind::Coverage
    }

    async fn execute(&self, ctx: &StepContext<'_>) -> Result<StepRun> {
        let settings = ctx.settings;
        let output = if settings.commands.coverage.trim().is_empty() {
            None
        } else {
            Some(ctx.run(self.kind(), &settings.commands.coverage).await?)
        };

        let source = ctx.path(&settings.coverage_summary);
        let summary = match tokio::fs::read_to_string(&source).await {
            Ok(text) => ctx.parsers.coverage.parse(&text),
            Err(e) => {
                tracing::warn!(path = %source.display(), error = %e, "Coverage summary unavailable");
                None
            }
        };

        let exit_code = output.as_ref().map_or(0, |o| o.exit_code);
        let detail = StepDetail::Coverage(CoverageDetail {
            summary: summary.unwrap_or_default(),
            source: settings.coverage_summary.clone(),
            found: summary.is_some(),
            exit_code,
        });

        let mut run = match &output {
            Some(out) if !out.success() => StepRun::failed(detail, exit_failure(out)),
            _ => StepRun::passed(detail),
        };
        if let Some(summary) = summary {
            for (category, pct) in summary.entries() {
                run = run.with_metric(metrics::coverage(category), pct);
            }
        }
        Ok(run)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineSettings;
    use crate::parsers::ParserSet;
    use cadence_runner::ScriptedRunner;
    use tempfile::TempDir;

    fn write_summary(dir: &TempDir, statements: f64, branches: f64) {
        std::fs::create_dir_all(dir.path().join("coverage")).unwrap();
        let doc = serde_json::json!({
            "total": {
                "statements": {"pct": statements},
                "branches": {"pct": branches},
                "functions": {"pct": 90},
                "lines": {"pct": 88.5}
            }
        });
        std::fs::write(
            dir.path().join("coverage/coverage-summary.json"),
            doc.to_string(),
        )
        .unwrap();
    }

    #[tokio::test]
    async fn reads_summary_into_metrics() {
        let dir = TempDir::new().unwrap();
        write_summary(&dir, 85.0, 72.0);
        let settings = PipelineSettings::for_dir(dir.path());
        let runner = ScriptedRunner::new();
        let parsers = ParserSet::default();
        let ctx = StepContext::new(&settings, &runner, &parsers);

        let run = CoverageStep.execute(&ctx).await.unwrap();
        assert!(run.succeeded);
        assert!(run
            .metrics
            .contains(&("coverage.branches".to_string(), 72.0)));
        assert!(run.metrics.contains(&("coverage.lines".to_string(), 88.5)));
        assert_eq!(runner.calls(), vec!["npm run coverage".to_string()]);
    }

    #[tokio::test]
    async fn missing_summary_records_nothing() {
        let dir = TempDir::new().unwrap();
        let settings = PipelineSettings::for_dir(dir.path());
        let runner = ScriptedRunner::new();
        let parsers = ParserSet::default();
        let ctx = StepContext::new(&settings, &runner, &parsers);

        let run = CoverageStep.execute(&ctx).await.unwrap();
        assert!(run.succeeded);
        assert!(run.metrics.is_empty());
        match run.detail {
            StepDetail::Coverage(d) => assert!(!d.found),
            other => panic!("unexpected detail {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_command_only_reads_summary() {
        let dir = TempDir::new().unwrap();
        write_summary(&dir, 99.0, 99.0);
        let mut settings = PipelineSettings::for_dir(dir.path());
        settings.commands.coverage = String::new();
        let runner = ScriptedRunner::strict();
        let parsers = ParserSet::default();
        let ctx = StepContext::new(&settings, &runner, &parsers);

        let run = CoverageStep.execute(&ctx).await.unwrap();
        assert!(run.succeeded);
        assert_eq!(run.metrics.len(), 4);
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn failing_command_keeps_summary() {
        let dir = TempDir::new().unwrap();
        write_summary(&dir, 50.0, 40.0);
        let settings = PipelineSettings::for_dir(dir.path());
        let runner = ScriptedRunner::new().exit("npm run coverage", 1, "");
        let parsers = ParserSet::default();
        let ctx = StepContext::new(&settings, &runner, &parsers);

        let run = CoverageStep.execute(&ctx).await.unwrap();
        assert!(!run.succeeded);
        assert_eq!(run.metrics.len(), 4);
    }
}

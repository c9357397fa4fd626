use async_trait::async_trait;
use cadence_types::{metrics, Result, StepDetail, TestDetail};

use crate::step::{exit_failure, StepContext, StepHandler, StepKind, StepRun};

/// Runs the test suite and scrapes its summary counts.
pub struct TestStep;

#[async_trait]
impl StepHandler for TestStep {
    fn kind(&self) -> StepKind {
        StepKind::Test
    }

    async fn execute(&self, ctx: &StepContext<'_>) -> Result<StepRun> {
        let output = ctx.run(self.kind(), &ctx.settings.commands.test).await?;
        let counts = ctx.parsers.tests.parse(&output.combined());
        tracing::info!(
            parser = ctx.parsers.tests.tool(),
            passed = counts.passed,
            failed = counts.failed,
            skipped = counts.skipped,
            exit_code = output.exit_code,
            "Test results"
        );

        let detail = StepDetail::Tests(TestDetail {
            counts,
            exit_code: output.exit_code,
        });

        let run = if !output.success() {
            StepRun::failed(detail, exit_failure(&output))
        } else if counts.failed > 0 {
            StepRun::failed(detail, format!("{} failing tests", counts.failed))
        } else {
            StepRun::passed(detail)
        };

        Ok(run
            .with_metric(metrics::TESTS_PASSED, counts.passed as f64)
            .with_metric(metrics::TESTS_FAILED, counts.failed as f64)
            .with_metric(metrics::TESTS_SKIPPED, counts.skipped as f64)
            .with_metric(metrics::TESTS_TOTAL, counts.total as f64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineSettings;
    use crate::parsers::ParserSet;
    use cadence_runner::ScriptedRunner;
    use cadence_types::TestCounts;

    #[tokio::test]
    async fn mixed_results() {
        let settings = PipelineSettings::default();
        let runner = ScriptedRunner::new().exit("npm test", 1, "  8 passing (3s)\n  2 failing\n");
        let parsers = ParserSet::default();
        let ctx = StepContext::new(&settings, &runner, &parsers);

        let run = TestStep.execute(&ctx).await.unwrap();
        assert!(!run.succeeded);
        assert_eq!(run.detail.test_counts(), Some(&TestCounts::new(8, 2, 0)));
        assert!(run
            .metrics
            .contains(&(metrics::TESTS_TOTAL.to_string(), 10.0)));
    }

    #[tokio::test]
    async fn zero_exit_with_failures_is_not_success() {
        let settings = PipelineSettings::default();
        let runner = ScriptedRunner::new().exit("npm test", 0, "5 passing\n1 failing\n");
        let parsers = ParserSet::default();
        let ctx = StepContext::new(&settings, &runner, &parsers);

        let run = TestStep.execute(&ctx).await.unwrap();
        assert!(!run.succeeded);
        assert_eq!(run.failure.as_deref(), Some("1 failing tests"));
    }

    #[tokio::test]
    async fn uses_test_timeout() {
        let settings = PipelineSettings::default();
        let runner = ScriptedRunner::new().timeout("npm test");
        let parsers = ParserSet::default();
        let ctx = StepContext::new(&settings, &runner, &parsers);

        let err = TestStep.execute(&ctx).await.unwrap_err();
        match err {
            cadence_types::CadenceError::CommandTimeout { timeout_ms, .. } => {
                assert_eq!(timeout_ms, 600_000)
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}

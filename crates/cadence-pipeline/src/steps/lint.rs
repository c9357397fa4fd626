use async_trait::async_trait;
use cadence_runner::{truncate_output, TruncationMode};
use cadence_types::{LintDetail, Result, StepDetail};

use crate::step::{exit_failure, StepContext, StepHandler, StepKind, StepRun};

const LINT_OUTPUT_CHARS: usize = 2_000;

pub struct LintStep;

#[async_trait]
impl StepHandler for LintStep {
    fn kind(&self) -> StepKind {
        StepKind::Lint
    }

    async fn execute(&self, ctx: &StepContext<'_>) -> Result<StepRun> {
        let output = ctx.run(self.kind(), &ctx.settings.commands.lint).await?;
        let combined = output.combined();
        let counts = ctx.parsers.lint.parse(&combined);

        let detail = StepDetail::Lint(LintDetail {
            errors: counts.errors,
            warnings: counts.warnings,
            exit_code: output.exit_code,
            output: truncate_output(combined.trim(), LINT_OUTPUT_CHARS, TruncationMode::Tail),
        });

        if output.success() {
            Ok(StepRun::passed(detail))
        } else {
            Ok(StepRun::failed(detail, exit_failure(&output)))
        }
    }
}

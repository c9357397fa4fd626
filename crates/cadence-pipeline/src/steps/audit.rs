use async_trait::async_trait;
use cadence_runner::{truncate_output, TruncationMode};
use cadence_types::{AuditDetail, Result, StepDetail};

use crate::step::{exit_failure, StepContext, StepHandler, StepKind, StepRun};

/// Output kept in the audit detail.
const AUDIT_OUTPUT_CHARS: usize = 2_000;

/// Runs the vulnerability scanner and records the count it reports.
pub struct AuditStep;

#[async_trait]
impl StepHandler for AuditStep {
    fn kind(&self) -> StepKind {
        StepKind::Audit
    }

    async fn execute(&self, ctx: &StepContext<'_>) -> Result<StepRun> {
        let output = ctx.run(self.kind(), &ctx.settings.commands.audit).await?;
        let combined = output.combined();
        let vulnerabilities = ctx.parsers.audit.parse(&combined);
        tracing::debug!(
            parser = ctx.parsers.audit.tool(),
            vulnerabilities,
            exit_code = output.exit_code,
            "Audit parsed"
        );

        let detail = StepDetail::Audit(AuditDetail {
            vulnerabilities,
            exit_code: output.exit_code,
            output: truncate_output(combined.trim(), AUDIT_OUTPUT_CHARS, TruncationMode::HeadTail),
        });

        if output.success() {
            Ok(StepRun::passed(detail))
        } else {
            Ok(StepRun::failed(detail, exit_failure(&output)))
        }
    }
}

use async_trait::async_trait;
use cadence_types::{InstallDetail, Result, StepDetail};

use crate::step::{exit_failure, StepContext, StepHandler, StepKind, StepRun};

/// Runs the install command and counts declared dependencies.
pub struct InstallStep;

/// `(dependencies, devDependencies)` declared in a package manifest.
///
/// An unreadable or malformed manifest counts as empty.
pub(crate) fn count_dependencies(manifest: &str) -> (u64, u64) {
    let Ok(doc) = serde_json::from_str::<serde_json::Value>(manifest) else {
        return (0, 0);
    };
    let count = |key: &str| {
        doc.get(key)
            .and_then(|v| v.as_object())
            .map_or(0, |deps| deps.len() as u64)
    };
    (count("dependencies"), count("devDependencies"))
}

#[async_trait]
impl StepHandler for InstallStep {
    fn kind(&self) -> StepKind {
        StepKind::Install
    }

    async fn execute(&self, ctx: &StepContext<'_>) -> Result<StepRun> {
        let output = ctx.run(self.kind(), &ctx.settings.commands.install).await?;

        let manifest = tokio::fs::read_to_string(ctx.path(&ctx.settings.manifest))
            .await
            .unwrap_or_default();
        let (dependencies, dev_dependencies) = count_dependencies(&manifest);

        let detail = StepDetail::Install(InstallDetail {
            dependencies,
            dev_dependencies,
            exit_code: output.exit_code,
        });

        if output.success() {
            Ok(StepRun::passed(detail))
        } else {
            Ok(StepRun::failed(detail, exit_failure(&output)))
        }
    }
}

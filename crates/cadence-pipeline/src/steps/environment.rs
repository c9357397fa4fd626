use std::collections::BTreeMap;

use async_trait::async_trait;
use cadence_types::{CadenceError, EnvironmentDetail, Result, StepDetail};

use crate::step::{exit_failure, StepContext, StepHandler, StepKind, StepRun};

/// Records tool versions and checks the project files exist.
pub struct EnvironmentStep;

async fn exists(path: &std::path::Path) -> bool {
    tokio::fs::metadata(path).await.is_ok()
}

#[async_trait]
impl StepHandler for EnvironmentStep {
    fn kind(&self) -> StepKind {
        StepKind::Environment
    }

    async fn execute(&self, ctx: &StepContext<'_>) -> Result<StepRun> {
        let settings = ctx.settings;
        let mut tools = BTreeMap::new();
        let mut failure = None;

        for command in &settings.commands.environment {
            let output = ctx.run(self.kind(), command).await?;
            let version = output.stdout.lines().next().unwrap_or("").trim().to_string();
            tracing::debug!(tool = %command, version = %version, exit_code = output.exit_code, "Tool check");
            if !output.success() && failure.is_none() {
                failure = Some(format!("'{}' {}", command, exit_failure(&output)));
            }
            tools.insert(command.clone(), version);
        }

        let manifest_present = exists(&ctx.path(&settings.manifest)).await;
        let config_present = match &settings.config_file {
            Some(file) => exists(&ctx.path(file)).await,
            None => false,
        };

        if !manifest_present && failure.is_none() {
            failure = Some(
                CadenceError::MissingFile {
                    path: settings.manifest.clone(),
                }
                .to_string(),
            );
        }

        let detail = StepDetail::Environment(EnvironmentDetail {
            tools,
            manifest: settings.manifest.clone(),
            manifest_present,
            config_file: settings.config_file.clone(),
            config_present,
        });

        Ok(match failure {
            Some(reason) => StepRun::failed(detail, reason),
            None => StepRun::passed(detail),
        })
    }
}

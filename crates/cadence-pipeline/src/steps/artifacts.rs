use std::path::{Path, PathBuf};

use async_trait::async_trait;
use cadence_types::{ArtifactDetail, CadenceError, Result, StepDetail};
use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::step::{exit_failure, StepContext, StepHandler, StepKind, StepRun};

/// Directories never searched for artifacts.
const SKIP_DIRS: &[&str] = &["node_modules", ".git"];

/// Packages the build output into the artifacts directory.
pub struct ArtifactsStep;

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern)
            .map_err(|e| CadenceError::Config(format!("artifact pattern '{pattern}': {e}")))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| CadenceError::Config(format!("artifact patterns: {e}")))
}

fn is_skipped(rel: &Path, skip: &[PathBuf]) -> bool {
    skip.iter().any(|s| s == rel)
        || rel
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| SKIP_DIRS.contains(&n))
}

/// Recursively collect files under `current` whose path relative to `base`
/// matches `set`, without descending into `skip`.
///
/// Symlinked directories are not followed. Entries that cannot be read are
/// logged and skipped; only a matching entry that cannot be resolved to a
/// file fails the walk.
async fn collect_matches(
    base: &Path,
    current: &Path,
    set: &GlobSet,
    skip: &[PathBuf],
    matches: &mut Vec<PathBuf>,
) -> Result<()> {
    let mut read_dir = match tokio::fs::read_dir(current).await {
        Ok(read_dir) => read_dir,
        Err(e) if current == base => return Err(e.into()),
        Err(e) => {
            tracing::warn!(path = %current.display(), error = %e, "Skipping unreadable directory");
            return Ok(());
        }
    };

    loop {
        let entry = match read_dir.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(path = %current.display(), error = %e, "Stopped reading directory");
                break;
            }
        };
        let path = entry.path();
        let rel = path.strip_prefix(base).unwrap_or(&path).to_path_buf();
        let file_type = match entry.file_type().await {
            Ok(file_type) => file_type,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable entry");
                continue;
            }
        };

        if file_type.is_dir() {
            if !is_skipped(&rel, skip) {
                Box::pin(collect_matches(base, &path, set, skip, matches)).await?;
            }
        } else if set.is_match(&rel) {
            if file_type.is_symlink() {
                // A matching link must resolve to a regular file.
                let meta = tokio::fs::metadata(&path).await?;
                if !meta.is_file() {
                    tracing::debug!(path = %path.display(), "Skipping link to non-file");
                    continue;
                }
            }
            matches.push(rel);
        }
    }
    Ok(())
}

/// Every file under `dir` as `(relative path, size)`, sorted by path.
async fn list_files(dir: &Path) -> Result<Vec<(String, u64)>> {
    let mut pending = vec![dir.to_path_buf()];
    let mut files = Vec::new();
    while let Some(current) = pending.pop() {
        let mut read_dir = tokio::fs::read_dir(&current).await?;
        while let Some(entry) = read_dir.next_entry().await? {
            let meta = entry.metadata().await?;
            let path = entry.path();
            if meta.is_dir() {
                pending.push(path);
            } else if let Ok(rel) = path.strip_prefix(dir) {
                files.push((rel.to_string_lossy().replace('\\', "/"), meta.len()));
            }
        }
    }
    files.sort();
    Ok(files)
}

#[async_trait]
impl StepHandler for ArtifactsStep {
    fn kind(&self) -> StepKind {
        StepKind::Artifacts
    }

    async fn execute(&self, ctx: &StepContext<'_>) -> Result<StepRun> {
        let settings = ctx.settings;
        let directory = settings.artifacts.directory.clone();
        let target = ctx.path(&directory);
        tokio::fs::create_dir_all(&target).await?;

        if let Some(command) = &settings.commands.package {
            let output = ctx.run(self.kind(), command).await?;
            if !output.success() {
                let detail = StepDetail::Artifacts(ArtifactDetail {
                    directory,
                    ..Default::default()
                });
                return Ok(StepRun::failed(detail, exit_failure(&output)));
            }
        }

        let set = build_globset(&settings.artifacts.patterns)?;
        let mut skip = vec![PathBuf::from(&directory)];
        if settings.reports_dir.is_relative() {
            skip.push(settings.reports_dir.clone());
        }
        let base = settings.working_dir.as_path();
        let mut matches = Vec::new();
        collect_matches(base, base, &set, &skip, &mut matches).await?;

        for rel in &matches {
            let dest = target.join(rel);
            if let Some(parent) = dest.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::copy(base.join(rel), &dest).await?;
        }
        tracing::debug!(copied = matches.len(), path = %target.display(), "Artifacts copied");

        let listed = list_files(&target).await?;
        let total_bytes = listed.iter().fold(0, |acc: u64, (_, size)| acc.saturating_add(*size));
        let files = listed.into_iter().map(|(name, _)| name).collect();

        Ok(StepRun::passed(StepDetail::Artifacts(ArtifactDetail {
            directory,
            files,
            total_bytes,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineSettings;
    use crate::parsers::ParserSet;
    use cadence_runner::ScriptedRunner;
    use tempfile::TempDir;

    fn artifact_detail(run: StepRun) -> ArtifactDetail {
        match run.detail {
            StepDetail::Artifacts(d) => d,
            other => panic!("unexpected detail {other:?}"),
        }
    }

    #[tokio::test]
    async fn copies_matching_files() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        std::fs::write(root.join("package.json"), "{}").unwrap();
        std::fs::create_dir_all(root.join("dist/js")).unwrap();
        std::fs::write(root.join("dist/app.js"), "console.log(1)").unwrap();
        std::fs::write(root.join("dist/js/vendor.js"), "v").unwrap();
        std::fs::create_dir_all(root.join("node_modules/dist")).unwrap();
        std::fs::write(root.join("node_modules/dist/x.js"), "x").unwrap();
        std::fs::write(root.join("README.md"), "readme").unwrap();

        let settings = PipelineSettings::for_dir(root);
        let runner = ScriptedRunner::strict();
        let parsers = ParserSet::default();
        let ctx = StepContext::new(&settings, &runner, &parsers);

        let run = ArtifactsStep.execute(&ctx).await.unwrap();
        assert!(run.succeeded);
        let detail = artifact_detail(run);
        assert_eq!(
            detail.files,
            vec!["dist/app.js", "dist/js/vendor.js", "package.json"]
        );
        assert_eq!(detail.total_bytes, 14 + 1 + 2);
        assert!(root.join("artifacts/dist/js/vendor.js").exists());
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn second_run_does_not_copy_artifacts_into_themselves() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        std::fs::write(root.join("package.json"), "{}").unwrap();
        let mut settings = PipelineSettings::for_dir(root);
        settings.artifacts.patterns = vec!["**/*.json".into()];
        let runner = ScriptedRunner::new();
        let parsers = ParserSet::default();
        let ctx = StepContext::new(&settings, &runner, &parsers);

        ArtifactsStep.execute(&ctx).await.unwrap();
        let detail = artifact_detail(ArtifactsStep.execute(&ctx).await.unwrap());
        assert_eq!(detail.files, vec!["package.json"]);
    }

    #[tokio::test]
    async fn failing_package_command() {
        let dir = TempDir::new().unwrap();
        let mut settings = PipelineSettings::for_dir(dir.path());
        settings.commands.package = Some("npm pack".into());
        let runner = ScriptedRunner::new().exit("npm pack", 1, "");
        let parsers = ParserSet::default();
        let ctx = StepContext::new(&settings, &runner, &parsers);

        let run = ArtifactsStep.execute(&ctx).await.unwrap();
        assert!(!run.succeeded);
        assert_eq!(run.failure.as_deref(), Some("exited with code 1"));
        assert!(dir.path().join("artifacts").is_dir());
    }

    #[tokio::test]
    async fn invalid_pattern_is_config_error() {
        let dir = TempDir::new().unwrap();
        let mut settings = PipelineSettings::for_dir(dir.path());
        settings.artifacts.patterns = vec!["dist/[".into()];
        let runner = ScriptedRunner::new();
        let parsers = ParserSet::default();
        let ctx = StepContext::new(&settings, &runner, &parsers);

        let err = ArtifactsStep.execute(&ctx).await.unwrap_err();
        assert!(matches!(err, CadenceError::Config(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn unrelated_broken_links_are_ignored() {
        use std::os::unix::fs::symlink;

        let dir = TempDir::new().unwrap();
        let root = dir.path();
        std::fs::write(root.join("package.json"), "{}").unwrap();
        std::fs::create_dir_all(root.join("src")).unwrap();
        // Editor lock file pointing nowhere.
        symlink("/nonexistent/target", root.join("src/.#app.js")).unwrap();
        // Directory loop.
        symlink("..", root.join("src/again")).unwrap();

        let settings = PipelineSettings::for_dir(root);
        let runner = ScriptedRunner::new();
        let parsers = ParserSet::default();
        let ctx = StepContext::new(&settings, &runner, &parsers);

        let run = ArtifactsStep.execute(&ctx).await.unwrap();
        assert!(run.succeeded);
        assert_eq!(artifact_detail(run).files, vec!["package.json"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn broken_link_matching_a_pattern_fails() {
        use std::os::unix::fs::symlink;

        let dir = TempDir::new().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("dist")).unwrap();
        symlink("/nonexistent/bundle.js", root.join("dist/bundle.js")).unwrap();

        let settings = PipelineSettings::for_dir(root);
        let runner = ScriptedRunner::new();
        let parsers = ParserSet::default();
        let ctx = StepContext::new(&settings, &runner, &parsers);

        let err = ArtifactsStep.execute(&ctx).await.unwrap_err();
        assert!(matches!(err, CadenceError::Io(_)));
    }
}

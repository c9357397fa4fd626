//! JSON and HTML rendering of a finalized report.
//!
//! Both documents land in the reports directory under fixed names and are
//! written atomically (temp file + rename), replacing the previous run's.
//! Rendering and write faults are logged and reported back as data; they
//! never change the pipeline verdict.

use std::path::{Path, PathBuf};

use cadence_types::{
    metrics, CadenceError, PipelineReport, PipelineStatus, Result, StepStatus,
};

pub const JSON_REPORT: &str = "pipeline-report.json";
pub const HTML_REPORT: &str = "pipeline-report.html";

/// Outcome of writing one report document.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentOutcome {
    pub format: &'static str,
    pub path: PathBuf,
    pub error: Option<String>,
}

impl DocumentOutcome {
    pub fn written(&self) -> bool {
        self.error.is_none()
    }
}

pub struct ReportRenderer {
    reports_dir: PathBuf,
}

impl ReportRenderer {
    pub fn new(reports_dir: impl Into<PathBuf>) -> Self {
        Self {
            reports_dir: reports_dir.into(),
        }
    }

    pub fn reports_dir(&self) -> &Path {
        &self.reports_dir
    }

    pub fn render_json(report: &PipelineReport) -> Result<String> {
        serde_json::to_string_pretty(report).map_err(|e| CadenceError::Render {
            format: "json".into(),
            message: e.to_string(),
        })
    }

    pub fn render_html(report: &PipelineReport) -> String {
        html::render(report)
    }

    /// Write both documents. Never fails; each outcome carries its own error.
    pub async fn write_all(&self, report: &PipelineReport) -> Vec<DocumentOutcome> {
        let dir_error = tokio::fs::create_dir_all(&self.reports_dir)
            .await
            .err()
            .map(|e| format!("cannot create {}: {}", self.reports_dir.display(), e));

        let json = Self::render_json(report);
        let page = Ok(Self::render_html(report));

        let mut outcomes = Vec::with_capacity(2);
        for (format, file, rendered) in [("json", JSON_REPORT, json), ("html", HTML_REPORT, page)] {
            let path = self.reports_dir.join(file);
            let error = match (&dir_error, rendered) {
                (Some(e), _) => Some(e.clone()),
                (None, Err(e)) => Some(e.to_string()),
                (None, Ok(content)) => write_atomic(&path, &content)
                    .await
                    .err()
                    .map(|e| e.to_string()),
            };
            match &error {
                None => tracing::info!(format, path = %path.display(), "Report written"),
                Some(e) => {
                    tracing::error!(format, path = %path.display(), error = %e, "Report not written")
                }
            }
            outcomes.push(DocumentOutcome {
                format,
                path,
                error,
            });
        }
        outcomes
    }
}

/// Write `content` to a sibling temp file, then rename it over `path`.
async fn write_atomic(path: &Path, content: &str) -> Result<()> {
    let mut temp_path = path.as_os_str().to_owned();
    temp_path.push(".tmp");
    let temp_path = PathBuf::from(temp_path);
    tokio::fs::write(&temp_path, content).await?;
    if let Err(e) = tokio::fs::rename(&temp_path, path).await {
        let _ = tokio::fs::remove_file(&temp_path).await;
        return Err(e.into());
    }
    Ok(())
}

mod html {
    use std::fmt::Write as _;

    use super::*;

    pub(super) fn escape(text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        for c in text.chars() {
            match c {
                '&' => out.push_str("&amp;"),
                '<' => out.push_str("&lt;"),
                '>' => out.push_str("&gt;"),
                '"' => out.push_str("&quot;"),
                '\'' => out.push_str("&#39;"),
                other => out.push(other),
            }
        }
        out
    }

    pub(super) fn step_color(status: StepStatus) -> &'static str {
        match status {
            StepStatus::Success => "#2e7d32",
            StepStatus::Warning => "#f9a825",
            StepStatus::Partial => "#ef6c00",
            StepStatus::Failed => "#c62828",
        }
    }

    fn pipeline_color(status: PipelineStatus) -> &'static str {
        match status {
            PipelineStatus::Success => step_color(StepStatus::Success),
            PipelineStatus::Partial => step_color(StepStatus::Partial),
            PipelineStatus::Failed => step_color(StepStatus::Failed),
        }
    }

    fn badge(label: &str, color: &str) -> String {
        format!(r#"<span class="badge" style="background:{color}">{label}</span>"#)
    }

    fn seconds(ms: u64) -> String {
        format!("{:.2}s", ms as f64 / 1000.0)
    }

    const STYLE: &str = "body{font-family:-apple-system,Segoe UI,Helvetica,Arial,sans-serif;margin:2rem;color:#212121}\
table{border-collapse:collapse;width:100%;margin-bottom:1.5rem}\
th,td{border:1px solid #e0e0e0;padding:.4rem .6rem;text-align:left;vertical-align:top}\
th{background:#f5f5f5}\
.badge{color:#fff;border-radius:4px;padding:.1rem .5rem;font-weight:600;font-size:.85em}\
.meta{color:#616161}\
.error{color:#c62828}";

    pub(super) fn render(report: &PipelineReport) -> String {
        let mut out = String::new();
        let title = format!("{} pipeline report", report.project);

        // Writing into a String cannot fail.
        let _ = write!(
            out,
            "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n<title>{}</title>\n<style>{}</style>\n</head>\n<body>\n",
            escape(&title),
            STYLE
        );
        let _ = writeln!(
            out,
            "<h1>{} {}</h1>",
            escape(&title),
            badge(report.status.as_str(), pipeline_color(report.status))
        );

        let mut meta = vec![
            format!("Run {}", escape(&report.run_id)),
            format!("started {}", escape(&report.timestamp.to_rfc3339())),
            format!("build time {}", seconds(report.build_time_ms)),
        ];
        if let Some(revision) = &report.revision {
            meta.push(format!("revision {}", escape(revision)));
        }
        if let Some(build) = &report.build_number {
            meta.push(format!("build #{}", escape(build)));
        }
        let _ = writeln!(out, "<p class=\"meta\">{}</p>", meta.join(" &middot; "));

        render_steps(&mut out, report);
        render_metrics(&mut out, report);
        render_gate(&mut out, report);
        render_errors(&mut out, report);

        out.push_str("</body>\n</html>\n");
        out
    }

    fn render_steps(out: &mut String, report: &PipelineReport) {
        out.push_str("<h2>Steps</h2>\n<table>\n<tr><th>Step</th><th>Status</th><th>Duration</th><th>Detail</th></tr>\n");
        for step in &report.steps {
            let mut detail = escape(&step.detail.summary());
            if let Some(message) = &step.error_message {
                if !detail.is_empty() {
                    detail.push_str("<br>");
                }
                let _ = write!(detail, "<span class=\"error\">{}</span>", escape(message));
            }
            let _ = writeln!(
                out,
                "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
                escape(&step.name),
                badge(step.status.as_str(), step_color(step.status)),
                seconds(step.duration_ms),
                detail
            );
        }
        out.push_str("</table>\n");
    }

    fn render_metrics(out: &mut String, report: &PipelineReport) {
        out.push_str("<h2>Metrics</h2>\n");
        if report.metrics.is_empty() {
            out.push_str("<p class=\"meta\">No metrics recorded.</p>\n");
            return;
        }
        out.push_str("<table>\n<tr><th>Metric</th><th>Value</th></tr>\n");
        for (name, value) in &report.metrics {
            let shown = if name.starts_with("coverage.") || name == metrics::TESTS_PASS_RATE {
                format!("{value}%")
            } else {
                value.to_string()
            };
            let _ = writeln!(
                out,
                "<tr><td>{}</td><td>{}</td></tr>",
                escape(name),
                escape(&shown)
            );
        }
        out.push_str("</table>\n");
    }

    fn render_gate(out: &mut String, report: &PipelineReport) {
        out.push_str("<h2>Quality gate</h2>\n");
        match &report.quality_gate {
            None => out.push_str("<p class=\"meta\">Not evaluated: the pipeline aborted.</p>\n"),
            Some(gate) if gate.passed => {
                let _ = writeln!(
                    out,
                    "<p>{} pass rate {}%</p>",
                    badge("PASSED", step_color(StepStatus::Success)),
                    gate.pass_rate
                );
            }
            Some(gate) => {
                let _ = writeln!(
                    out,
                    "<p>{} pass rate {}%</p>\n<ul>",
                    badge("VIOLATED", step_color(StepStatus::Partial)),
                    gate.pass_rate
                );
                for violation in &gate.violations {
                    let _ = writeln!(out, "<li>{}</li>", escape(violation));
                }
                out.push_str("</ul>\n");
            }
        }
    }

    fn render_errors(out: &mut String, report: &PipelineReport) {
        if report.errors.is_empty() {
            return;
        }
        out.push_str("<h2>Errors</h2>\n<ul class=\"error\">\n");
        for error in &report.errors {
            let _ = writeln!(out, "<li>{}</li>", escape(error));
        }
        out.push_str("</ul>\n");
    }
}

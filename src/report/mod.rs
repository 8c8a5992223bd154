//! Persisted run and batch reports.
//!
//! One JSON report per synthesis run, one JSON plus an optional static
//! HTML table per batch. Field names are camelCase and stable, matching
//! the rest of the wire contract.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DarnerError, Result};
use crate::ports::filesystem::FileSystem;
use crate::synth::RunState;

/// What happened in one controller iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IterationRecord {
    /// 1-based iteration number.
    pub iteration: u32,
    /// Id of the addressed method.
    pub method_id: String,
    /// Display name of the addressed method.
    pub method_display_name: String,
    /// Number of tests the backend proposed.
    pub tests_proposed: u32,
    /// Verification verdict; absent when verification was skipped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accepted: Option<bool>,
    /// Why the batch was rejected, when it was.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
    /// Diagnostics collected during the iteration.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

/// Aggregate counters for one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    /// Targets addressed, successfully or not.
    pub targets_attempted: u32,
    /// Total tests proposed across all iterations.
    pub tests_proposed: u32,
    /// Iterations whose emitted tests were accepted.
    pub accepted: u32,
    /// Iterations whose emitted tests were rejected.
    pub rejected: u32,
    /// Iterations actually performed.
    pub iterations_used: u32,
    /// False when the run was cancelled before reaching a terminal
    /// condition on its own.
    pub completed: bool,
}

/// Line and branch rates of one coverage measurement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoverageRates {
    /// Line coverage, percent.
    pub line_rate: f64,
    /// Branch coverage, percent.
    pub branch_rate: f64,
}

/// Everything persisted about one synthesis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    /// Run id, also names the report file.
    pub run_id: String,
    /// Solution the run targeted.
    pub solution_path: String,
    /// Generation backend used.
    pub provider: String,
    /// Terminal controller state.
    pub state: RunState,
    /// When the run started.
    pub started_at_utc: DateTime<Utc>,
    /// When the run finished.
    pub finished_at_utc: DateTime<Utc>,
    /// Configured iteration budget.
    pub iteration_budget: u32,
    /// Rates measured before synthesis; absent in generate-all mode,
    /// which never measures coverage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baseline_coverage: Option<CoverageRates>,
    /// Rates after the last accepted batch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_coverage: Option<CoverageRates>,
    /// Per-iteration records in order.
    pub iterations: Vec<IterationRecord>,
    /// Aggregate counters.
    pub summary: RunSummary,
}

/// Writes a run report as pretty JSON under `dir`, returning the path.
///
/// # Errors
///
/// Fails when the directory cannot be created or the file cannot be
/// written.
pub fn write_run_report(
    fs: &dyn FileSystem,
    report: &RunReport,
    dir: &Path,
) -> Result<PathBuf> {
    fs.create_dir_all(dir)
        .map_err(|e| DarnerError::output_directory(dir.display().to_string(), e.to_string()))?;
    let path = dir.join(format!("run-{}.json", report.run_id));
    let json = serde_json::to_string_pretty(report)?;
    fs.write(&path, &json)
        .map_err(|e| DarnerError::report(format!("cannot write {}: {e}", path.display())))?;
    Ok(path)
}

/// Loads a stored run report from a file path or from a directory
/// containing one or more `run-*.json` files (the newest-named wins).
///
/// # Errors
///
/// Fails when no report file can be found or the JSON is malformed.
pub fn read_run_report(fs: &dyn FileSystem, path: &Path) -> Result<RunReport> {
    let content = match fs.read_to_string(path) {
        Ok(content) => content,
        Err(_) => {
            let mut candidates = fs
                .find_files(path, ".json")
                .map_err(|e| DarnerError::report(format!("cannot scan {}: {e}", path.display())))?;
            candidates.retain(|p| {
                p.file_name()
                    .map(|n| n.to_string_lossy().starts_with("run-"))
                    .unwrap_or(false)
            });
            let Some(found) = candidates.pop() else {
                return Err(DarnerError::report(format!(
                    "no run report found under {}",
                    path.display()
                )));
            };
            fs.read_to_string(&found)
                .map_err(|e| DarnerError::report(format!("cannot read {}: {e}", found.display())))?
        }
    };
    Ok(serde_json::from_str(&content)?)
}

/// Renders a stored run report as the same human-readable summary the
/// live run prints.
#[must_use]
pub fn render_run_summary(report: &RunReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Run {} ({})", report.run_id, report.solution_path);
    let _ = writeln!(out, "Provider: {}", report.provider);
    let _ = writeln!(
        out,
        "State: {:?}, {} of {} iterations used",
        report.state, report.summary.iterations_used, report.iteration_budget
    );
    if let (Some(baseline), Some(final_rates)) = (report.baseline_coverage, report.final_coverage) {
        let _ = writeln!(
            out,
            "Coverage: {:.1}% -> {:.1}% lines, {:.1}% -> {:.1}% branches",
            baseline.line_rate, final_rates.line_rate, baseline.branch_rate, final_rates.branch_rate
        );
    }
    for record in &report.iterations {
        let verdict = match record.accepted {
            Some(true) => "accepted".to_string(),
            Some(false) => format!(
                "rejected: {}",
                record.rejection_reason.as_deref().unwrap_or("unknown")
            ),
            None => "not verified".to_string(),
        };
        let _ = writeln!(
            out,
            "  {}. {} proposed {}, {}",
            record.iteration, record.method_display_name, record.tests_proposed, verdict
        );
    }
    let _ = writeln!(
        out,
        "Summary: {} targets attempted, {} tests proposed, {} accepted, {} rejected",
        report.summary.targets_attempted,
        report.summary.tests_proposed,
        report.summary.accepted,
        report.summary.rejected
    );
    out
}

/// Terminal status of one batch project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProjectStatus {
    /// Ran to completion.
    Completed,
    /// Aborted with a fatal error.
    Failed,
    /// Disabled in the config or unclonable.
    Skipped,
}

/// Before/after metrics for one batch project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectMetrics {
    /// Project name from the batch config.
    pub name: String,
    /// Terminal status.
    pub status: ProjectStatus,
    /// Line coverage before synthesis, percent.
    pub baseline_line_rate: f64,
    /// Branch coverage before synthesis, percent.
    pub baseline_branch_rate: f64,
    /// Line coverage after synthesis, percent.
    pub final_line_rate: f64,
    /// Branch coverage after synthesis, percent.
    pub final_branch_rate: f64,
    /// Accepted test batches.
    pub tests_accepted: u32,
    /// Wall-clock duration of the project run.
    pub duration_seconds: f64,
    /// Diagnostics, e.g. why a project was skipped.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

impl ProjectMetrics {
    /// A skipped project with zeroed metrics and one explanatory note.
    #[must_use]
    pub fn skipped(name: impl Into<String>, note: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: ProjectStatus::Skipped,
            baseline_line_rate: 0.0,
            baseline_branch_rate: 0.0,
            final_line_rate: 0.0,
            final_branch_rate: 0.0,
            tests_accepted: 0,
            duration_seconds: 0.0,
            notes: vec![note.into()],
        }
    }
}

/// Aggregate counters across a batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    /// Projects that ran to completion.
    pub projects_completed: u32,
    /// Projects that aborted.
    pub projects_failed: u32,
    /// Projects skipped or disabled.
    pub projects_skipped: u32,
    /// Accepted test batches across all projects.
    pub tests_accepted: u32,
}

/// Everything persisted about one batch run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    /// When the batch finished.
    pub generated_at_utc: DateTime<Utc>,
    /// Per-project metrics, sorted by project name.
    pub projects: Vec<ProjectMetrics>,
    /// Aggregate counters.
    pub summary: BatchSummary,
}

impl BatchReport {
    /// Builds a report from per-project metrics, sorting by name and
    /// deriving the aggregate counters.
    #[must_use]
    pub fn from_projects(mut projects: Vec<ProjectMetrics>, now: DateTime<Utc>) -> Self {
        projects.sort_by(|a, b| a.name.cmp(&b.name));
        let mut summary = BatchSummary::default();
        for project in &projects {
            match project.status {
                ProjectStatus::Completed => summary.projects_completed += 1,
                ProjectStatus::Failed => summary.projects_failed += 1,
                ProjectStatus::Skipped => summary.projects_skipped += 1,
            }
            summary.tests_accepted += project.tests_accepted;
        }
        Self {
            generated_at_utc: now,
            projects,
            summary,
        }
    }
}

/// Writes the batch JSON report (and the HTML table when asked) under
/// `dir`, returning the JSON path.
///
/// # Errors
///
/// Fails when the directory cannot be created or a file cannot be
/// written.
pub fn write_batch_report(
    fs: &dyn FileSystem,
    report: &BatchReport,
    dir: &Path,
    with_html: bool,
) -> Result<PathBuf> {
    fs.create_dir_all(dir)
        .map_err(|e| DarnerError::output_directory(dir.display().to_string(), e.to_string()))?;
    let json_path = dir.join("batch-report.json");
    let json = serde_json::to_string_pretty(report)?;
    fs.write(&json_path, &json)
        .map_err(|e| DarnerError::report(format!("cannot write {}: {e}", json_path.display())))?;

    if with_html {
        let html_path = dir.join("batch-report.html");
        fs.write(&html_path, &render_comparative_html(report))
            .map_err(|e| DarnerError::report(format!("cannot write {}: {e}", html_path.display())))?;
    }
    Ok(json_path)
}

/// Renders the batch comparison as a single self-contained HTML table.
#[must_use]
pub fn render_comparative_html(report: &BatchReport) -> String {
    let mut out = String::new();
    out.push_str("<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n");
    out.push_str("<title>darner batch report</title>\n<style>\n");
    out.push_str("body { font-family: sans-serif; margin: 2em; }\n");
    out.push_str("table { border-collapse: collapse; }\n");
    out.push_str("th, td { border: 1px solid #ccc; padding: 6px 12px; text-align: left; }\n");
    out.push_str("th { background: #f0f0f0; }\n");
    out.push_str("</style>\n</head>\n<body>\n");
    out.push_str("<h1>Multi-project synthesis report</h1>\n");
    let _ = writeln!(
        out,
        "<p>Generated {}</p>",
        report.generated_at_utc.format("%Y-%m-%d %H:%M:%S UTC")
    );
    out.push_str("<table>\n<tr><th>Project</th><th>Line %</th><th>Branch %</th>");
    out.push_str("<th>Accepted</th><th>Duration (s)</th><th>Status</th></tr>\n");
    for project in &report.projects {
        let status = match project.status {
            ProjectStatus::Completed => "completed",
            ProjectStatus::Failed => "failed",
            ProjectStatus::Skipped => "skipped",
        };
        let _ = writeln!(
            out,
            "<tr><td>{}</td><td>{:.1} &rarr; {:.1}</td><td>{:.1} &rarr; {:.1}</td><td>{}</td><td>{:.1}</td><td>{}</td></tr>",
            escape_html(&project.name),
            project.baseline_line_rate,
            project.final_line_rate,
            project.baseline_branch_rate,
            project.final_branch_rate,
            project.tests_accepted,
            project.duration_seconds,
            status
        );
    }
    out.push_str("</table>\n</body>\n</html>\n");
    out
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

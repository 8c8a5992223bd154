//! Multi-project batch orchestration.
//!
//! A JSON config lists projects to synthesize tests for; the batch runner
//! optionally clones each one, runs a full synthesis loop per project,
//! and writes per-project run reports plus one comparative batch report.
//! Projects run sequentially or in parallel under a concurrency cap.
//! One broken project never aborts the batch; it is recorded as failed
//! (or skipped, when it cannot even be cloned) and the rest proceed.

use std::fmt;
use std::fmt::Write as _;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::context::ServiceContext;
use crate::error::{DarnerError, Result};
use crate::generate::{build_generator, GenerationOptions};
use crate::ports::filesystem::FileSystem;
use crate::ports::process::ProcessRequest;
use crate::report::{
    write_batch_report, write_run_report, BatchReport, ProjectMetrics, ProjectStatus,
};
use crate::synth::controller::SynthesisLoop;
use crate::synth::{SynthesisConfig, ThresholdPolicy};

/// How the batch schedules its projects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutionMode {
    /// One project at a time, in config order.
    #[default]
    Sequential,
    /// Up to `parallelismDegree` projects at once.
    Parallel,
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Sequential => "sequential",
            Self::Parallel => "parallel",
        })
    }
}

/// Top-level batch configuration, loaded from JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultiProjectConfig {
    /// Scheduling mode.
    #[serde(default)]
    pub execution_mode: ExecutionMode,
    /// Concurrency cap for parallel mode.
    #[serde(default = "default_parallelism")]
    pub parallelism_degree: usize,
    /// Root for per-project artifacts and the batch report.
    #[serde(default = "default_output_directory")]
    pub output_directory: PathBuf,
    /// Also render the batch report as a static HTML table.
    #[serde(default = "default_true")]
    pub generate_comparative_report: bool,
    /// In sequential mode, skip remaining projects after a failure.
    #[serde(default)]
    pub stop_on_first_failure: bool,
    /// Projects to run.
    pub projects: Vec<ProjectConfig>,
}

/// One project in the batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectConfig {
    /// Display name; also names the project's artifact directory.
    pub name: String,
    /// Free-form description, echoed in the narration.
    #[serde(default)]
    pub description: String,
    /// Disabled projects are recorded as skipped.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Repository to clone when the project is not already on disk.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_repo: Option<String>,
    /// Where to clone; also anchors relative project paths.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clone_path: Option<PathBuf>,
    /// Solution file, relative to `clonePath` when that is set.
    pub solution_path: PathBuf,
    /// Test projects, same anchoring as the solution.
    pub test_project_paths: Vec<PathBuf>,
    /// Overall coverage target for this project.
    #[serde(default = "default_threshold")]
    pub coverage_threshold: f64,
    /// Synthesis iteration budget for this project.
    #[serde(default = "default_budget")]
    pub iteration_budget: u32,
    /// Operator notes, carried through untouched.
    #[serde(default)]
    pub notes: String,
}

fn default_parallelism() -> usize {
    2
}

fn default_output_directory() -> PathBuf {
    PathBuf::from("artifacts/multi-project")
}

fn default_true() -> bool {
    true
}

fn default_threshold() -> f64 {
    80.0
}

fn default_budget() -> u32 {
    10
}

/// Loads and parses a batch config file.
///
/// # Errors
///
/// Fails when the file cannot be read or is not valid JSON.
pub fn load_batch_config(fs: &dyn FileSystem, path: &Path) -> Result<MultiProjectConfig> {
    let content = fs
        .read_to_string(path)
        .map_err(|e| DarnerError::config(format!("cannot read batch config {}: {e}", path.display())))?;
    serde_json::from_str(&content)
        .map_err(|e| DarnerError::config(format!("invalid batch config {}: {e}", path.display())))
}

struct ProjectOutcome {
    metrics: ProjectMetrics,
    narration: String,
}

/// Runs every enabled project and writes the batch report.
///
/// Each project's narration is buffered and written to `writer` when the
/// project finishes, so parallel runs never interleave their output.
///
/// # Errors
///
/// Fails when the batch report cannot be written, the writer breaks, or a
/// parallel worker panics. Per-project failures are recorded in the
/// report instead.
pub async fn run_batch<W: Write>(
    ctx: Arc<ServiceContext>,
    config: MultiProjectConfig,
    base_generation: GenerationOptions,
    writer: &mut W,
) -> Result<BatchReport> {
    let MultiProjectConfig {
        execution_mode,
        parallelism_degree,
        output_directory,
        generate_comparative_report,
        stop_on_first_failure,
        projects,
    } = config;

    writeln!(writer, "Batch: {} projects, {execution_mode} mode", projects.len())?;

    let mut metrics: Vec<ProjectMetrics> = Vec::new();
    let mut pending: Vec<ProjectConfig> = Vec::new();
    for project in projects {
        if project.enabled {
            pending.push(project);
        } else {
            writeln!(writer, "Skipping disabled project: {}", project.name)?;
            metrics.push(ProjectMetrics::skipped(&project.name, "disabled in config"));
        }
    }

    match execution_mode {
        ExecutionMode::Sequential => {
            let mut halted = false;
            for project in pending {
                if halted {
                    metrics.push(ProjectMetrics::skipped(
                        &project.name,
                        "skipped after an earlier failure",
                    ));
                    continue;
                }
                let outcome = run_project(
                    Arc::clone(&ctx),
                    project,
                    output_directory.clone(),
                    base_generation.clone(),
                )
                .await;
                writer.write_all(outcome.narration.as_bytes())?;
                if stop_on_first_failure && outcome.metrics.status == ProjectStatus::Failed {
                    writeln!(writer, "Stopping after failure in {}", outcome.metrics.name)?;
                    halted = true;
                }
                metrics.push(outcome.metrics);
            }
        }
        ExecutionMode::Parallel => {
            let semaphore = Arc::new(Semaphore::new(parallelism_degree.max(1)));
            let mut workers = JoinSet::new();
            for project in pending {
                let ctx = Arc::clone(&ctx);
                let semaphore = Arc::clone(&semaphore);
                let output_directory = output_directory.clone();
                let generation = base_generation.clone();
                workers.spawn(async move {
                    // The semaphore is never closed, so this only fails
                    // during runtime shutdown.
                    let _permit = semaphore.acquire_owned().await.ok();
                    run_project(ctx, project, output_directory, generation).await
                });
            }
            while let Some(joined) = workers.join_next().await {
                let outcome = joined
                    .map_err(|e| DarnerError::report(format!("batch worker crashed: {e}")))?;
                writer.write_all(outcome.narration.as_bytes())?;
                metrics.push(outcome.metrics);
            }
        }
    }

    let report = BatchReport::from_projects(metrics, ctx.clock.now());
    write_batch_report(
        ctx.fs.as_ref(),
        &report,
        &output_directory,
        generate_comparative_report,
    )?;
    writeln!(
        writer,
        "\nBatch complete: {} completed, {} failed, {} skipped, {} tests accepted",
        report.summary.projects_completed,
        report.summary.projects_failed,
        report.summary.projects_skipped,
        report.summary.tests_accepted
    )?;
    Ok(report)
}

async fn run_project(
    ctx: Arc<ServiceContext>,
    project: ProjectConfig,
    output_directory: PathBuf,
    base_generation: GenerationOptions,
) -> ProjectOutcome {
    let started = ctx.clock.now();
    let mut narration = String::new();
    let _ = writeln!(narration, "=== Project: {} ===", project.name);
    if !project.description.is_empty() {
        let _ = writeln!(narration, "{}", project.description);
    }

    let mut metrics = run_project_inner(
        ctx.as_ref(),
        &project,
        &output_directory,
        &base_generation,
        &mut narration,
    )
    .await;
    metrics.duration_seconds = elapsed_seconds(started, ctx.clock.now());
    ProjectOutcome { metrics, narration }
}

async fn run_project_inner(
    ctx: &ServiceContext,
    project: &ProjectConfig,
    output_directory: &Path,
    base_generation: &GenerationOptions,
    narration: &mut String,
) -> ProjectMetrics {
    if let (Some(repo), Some(clone_dir)) = (&project.git_repo, &project.clone_path) {
        if ctx.fs.exists(clone_dir) {
            let _ = writeln!(
                narration,
                "Clone directory exists, skipping clone: {}",
                clone_dir.display()
            );
        } else {
            let _ = writeln!(narration, "Cloning {repo} into {}", clone_dir.display());
            let request = ProcessRequest::new(
                "git",
                vec![
                    "clone".to_string(),
                    "--depth".to_string(),
                    "1".to_string(),
                    repo.clone(),
                    clone_dir.display().to_string(),
                ],
            );
            match ctx.process.run(&request).await {
                Ok(output) if output.exit_code == 0 => {}
                Ok(output) => {
                    return ProjectMetrics::skipped(
                        &project.name,
                        format!(
                            "git clone failed with exit code {}: {}",
                            output.exit_code,
                            output.stderr.trim()
                        ),
                    );
                }
                Err(e) => {
                    return ProjectMetrics::skipped(
                        &project.name,
                        format!("git clone failed: {e}"),
                    );
                }
            }
        }
    }

    let base = project.clone_path.as_deref();
    let solution_path = anchored(base, &project.solution_path);
    if !ctx.fs.exists(&solution_path) {
        return failed_metrics(
            &project.name,
            format!("solution not found: {}", solution_path.display()),
        );
    }
    let test_project_paths = project
        .test_project_paths
        .iter()
        .map(|p| anchored(base, p))
        .collect();

    let mut synth_config = SynthesisConfig::new(solution_path, test_project_paths);
    synth_config.artifacts_dir = output_directory.join(&project.name);
    synth_config.thresholds = ThresholdPolicy::overall_only(project.coverage_threshold);
    synth_config.iteration_budget = project.iteration_budget;
    synth_config.generation = base_generation.clone();
    let artifacts_dir = synth_config.artifacts_dir.clone();

    let generator = match build_generator(base_generation.clone(), Arc::clone(&ctx.credentials)) {
        Ok(generator) => generator,
        Err(e) => {
            return failed_metrics(
                &project.name,
                format!("cannot build generation backend: {e}"),
            );
        }
    };

    let mut sink = Vec::new();
    let mut synth = SynthesisLoop::new(synth_config, &mut sink);
    let outcome = synth.run(ctx, generator.as_ref()).await;
    drop(synth);
    narration.push_str(&String::from_utf8_lossy(&sink));

    match outcome {
        Ok(report) => {
            let mut notes = Vec::new();
            if let Err(e) = write_run_report(ctx.fs.as_ref(), &report, &artifacts_dir) {
                notes.push(format!("run report not persisted: {e}"));
            }
            let baseline = report.baseline_coverage.unwrap_or_default();
            let final_rates = report.final_coverage.unwrap_or_default();
            ProjectMetrics {
                name: project.name.clone(),
                status: ProjectStatus::Completed,
                baseline_line_rate: baseline.line_rate,
                baseline_branch_rate: baseline.branch_rate,
                final_line_rate: final_rates.line_rate,
                final_branch_rate: final_rates.branch_rate,
                tests_accepted: report.summary.accepted,
                duration_seconds: 0.0,
                notes,
            }
        }
        Err(e) => failed_metrics(&project.name, e.to_string()),
    }
}

fn failed_metrics(name: &str, note: String) -> ProjectMetrics {
    ProjectMetrics {
        name: name.to_string(),
        status: ProjectStatus::Failed,
        baseline_line_rate: 0.0,
        baseline_branch_rate: 0.0,
        final_line_rate: 0.0,
        final_branch_rate: 0.0,
        tests_accepted: 0,
        duration_seconds: 0.0,
        notes: vec![note],
    }
}

fn anchored(base: Option<&Path>, path: &Path) -> PathBuf {
    match base {
        Some(base) if path.is_relative() => base.join(path),
        _ => path.to_path_buf(),
    }
}

#[allow(clippy::cast_precision_loss)]
fn elapsed_seconds(started: DateTime<Utc>, finished: DateTime<Utc>) -> f64 {
    (finished - started).num_milliseconds() as f64 / 1000.0
}

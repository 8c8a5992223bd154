//! Drives the external build/test/coverage toolchain.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::cancel::CancellationToken;
use crate::context::ServiceContext;
use crate::coverage::CoverageFormat;
use crate::error::{DarnerError, Result};
use crate::ports::process::ProcessRequest;

/// Options for one instrumented test run.
#[derive(Debug, Clone)]
pub struct RunnerOptions {
    /// Solution or project file handed to `dotnet test`.
    pub solution_or_project_path: PathBuf,
    /// Test projects appended to the invocation.
    pub test_project_paths: Vec<PathBuf>,
    /// Root for per-run artifact directories.
    pub artifacts_dir: PathBuf,
    /// Report format coverlet is asked to produce.
    pub format: CoverageFormat,
    /// Pin the toolchain's locale and first-run behavior.
    pub deterministic_env: bool,
    /// Hard limit on the test run.
    pub timeout: Option<Duration>,
}

impl RunnerOptions {
    /// Defaults: `artifacts/` root, Cobertura output, deterministic
    /// environment, no timeout.
    #[must_use]
    pub fn new(solution_or_project_path: PathBuf, test_project_paths: Vec<PathBuf>) -> Self {
        Self {
            solution_or_project_path,
            test_project_paths,
            artifacts_dir: PathBuf::from("artifacts"),
            format: CoverageFormat::Cobertura,
            deterministic_env: true,
            timeout: None,
        }
    }
}

/// Outcome of one instrumented test run.
///
/// A failing test suite is data here, not an error; only an unstartable
/// toolchain aborts.
#[derive(Debug, Clone)]
pub struct CoverageRun {
    /// Unique id naming this run's artifact directory.
    pub run_id: String,
    /// When the run started.
    pub timestamp_utc: DateTime<Utc>,
    /// Solution or project the run was invoked against.
    pub solution_or_project_path: PathBuf,
    /// Test projects included in the invocation.
    pub test_project_paths: Vec<PathBuf>,
    /// Report files the run produced.
    pub coverage_xml_paths: Vec<PathBuf>,
    /// Exit code of `dotnet test`.
    pub exit_code: i32,
    /// Captured standard output.
    pub stdout_path: PathBuf,
    /// Captured standard error.
    pub stderr_path: PathBuf,
}

impl CoverageRun {
    /// True when every test in the run passed.
    #[must_use]
    pub fn tests_passed(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs the test suite with coverage collection enabled.
///
/// Creates `<artifacts>/coverage/<run_id>/` with a `coverage/` report
/// subdirectory, captures stdout/stderr to files, and globs the produced
/// `*.<format>.xml` reports.
///
/// # Errors
///
/// Fails when artifact directories cannot be created, the toolchain
/// cannot be started, or output captures cannot be written.
pub async fn run_coverage(
    ctx: &ServiceContext,
    options: &RunnerOptions,
    cancel: &CancellationToken,
) -> Result<CoverageRun> {
    let run_id = ctx.id_gen.generate_id();
    let timestamp_utc = ctx.clock.now();
    let run_dir = options.artifacts_dir.join("coverage").join(&run_id);
    let coverage_dir = run_dir.join("coverage");
    ctx.fs
        .create_dir_all(&coverage_dir)
        .map_err(|e| DarnerError::output_directory(coverage_dir.display().to_string(), e.to_string()))?;

    let mut args = vec![
        "test".to_string(),
        options.solution_or_project_path.display().to_string(),
        "/p:CollectCoverage=true".to_string(),
        format!("/p:CoverletOutputFormat={}", options.format.as_str()),
        format!(
            "/p:CoverletOutput={}/",
            coverage_dir.display().to_string().replace('\\', "/")
        ),
        "/p:ExcludeByAttribute=\"*.ExcludeFromCodeCoverageAttribute\"".to_string(),
        "--no-build".to_string(),
        "--verbosity".to_string(),
        "normal".to_string(),
    ];
    args.extend(
        options
            .test_project_paths
            .iter()
            .map(|p| p.display().to_string()),
    );

    let mut request = ProcessRequest::new("dotnet", args);
    request.working_dir = Some(
        options
            .solution_or_project_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf),
    );
    if options.deterministic_env {
        request.env.insert("DOTNET_CLI_UI_LANGUAGE".to_string(), "en".to_string());
        request
            .env
            .insert("DOTNET_SKIP_FIRST_TIME_EXPERIENCE".to_string(), "1".to_string());
    }
    request.timeout = options.timeout;
    request.cancel = cancel.clone();

    tracing::debug!(run_id = %run_id, "starting instrumented test run");
    let output = ctx
        .process
        .run(&request)
        .await
        .map_err(|e| DarnerError::toolchain(e.to_string()))?;

    let stdout_path = run_dir.join("stdout.txt");
    let stderr_path = run_dir.join("stderr.txt");
    ctx.fs
        .write(&stdout_path, &output.stdout)
        .map_err(|e| DarnerError::report(format!("cannot capture stdout: {e}")))?;
    ctx.fs
        .write(&stderr_path, &output.stderr)
        .map_err(|e| DarnerError::report(format!("cannot capture stderr: {e}")))?;

    let coverage_xml_paths = ctx
        .fs
        .find_files(&coverage_dir, &format!(".{}.xml", options.format.as_str()))
        .map_err(|e| DarnerError::report(format!("cannot glob coverage reports: {e}")))?;

    Ok(CoverageRun {
        run_id,
        timestamp_utc,
        solution_or_project_path: options.solution_or_project_path.clone(),
        test_project_paths: options.test_project_paths.clone(),
        coverage_xml_paths,
        exit_code: output.exit_code,
        stdout_path,
        stderr_path,
    })
}

//! `darner synth` command.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::cli::SynthArgs;
use crate::context::ServiceContext;
use crate::error::{DarnerError, Result};
use crate::generate::{build_generator, GenerationOptions};
use crate::report::write_run_report;
use crate::synth::controller::SynthesisLoop;
use crate::synth::{SynthesisConfig, ThresholdPolicy};

/// Execute the `synth` command against the real toolchain.
///
/// # Errors
///
/// Returns an error when the solution path is missing, the run aborts
/// (toolchain unavailable, output directory not writable), or the run
/// report cannot be persisted.
pub async fn run(args: SynthArgs) -> Result<()> {
    let source_root = args
        .solution_path
        .parent()
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
    let generation = generation_options(&args);
    let ctx = ServiceContext::live(&source_root, &generation.test_framework, &generation.mocking);
    let mut stdout = io::stdout();
    run_with_context(&ctx, args, &mut stdout).await
}

/// Execute the `synth` command with the given service context.
///
/// # Errors
///
/// Same contract as [`run`].
pub async fn run_with_context<W: Write>(
    ctx: &ServiceContext,
    args: SynthArgs,
    writer: &mut W,
) -> Result<()> {
    if !ctx.fs.exists(&args.solution_path) {
        return Err(DarnerError::solution_not_found(
            args.solution_path.display().to_string(),
        ));
    }

    let generation = generation_options(&args);
    let mut config = SynthesisConfig::new(args.solution_path, args.test_project_paths);
    config.artifacts_dir = args.artifacts_dir;
    config.thresholds = ThresholdPolicy::overall_only(args.coverage_threshold);
    config.iteration_budget = args.iteration_budget;
    config.generate_all = args.generate_all;
    config.source_filter = args.source_filter;
    config.output_folder = args.output_folder;
    config.min_coverage_improvement = args.min_improvement;
    config.determinism_runs = args.determinism_runs;
    config.generation = generation.clone();
    let reports_dir = config.artifacts_dir.join("reports");

    // An unwritable output folder should fail the run up front, not in
    // the middle of an iteration.
    let output_dir = config.output_dir();
    ctx.fs.create_dir_all(&output_dir).map_err(|e| {
        DarnerError::output_directory(output_dir.display().to_string(), e.to_string())
    })?;

    let generator = build_generator(generation, Arc::clone(&ctx.credentials))?;

    let mut synth = SynthesisLoop::new(config, &mut *writer);
    let report = synth.run(ctx, generator.as_ref()).await?;
    drop(synth);

    let path = write_run_report(ctx.fs.as_ref(), &report, &reports_dir)?;
    writeln!(writer, "Report: {}", path.display())?;
    Ok(())
}

fn generation_options(args: &SynthArgs) -> GenerationOptions {
    GenerationOptions {
        provider: args.provider,
        model: args.model.clone(),
        base_url: args.endpoint.clone(),
        ..GenerationOptions::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generate::ProviderKind;
    use crate::testutil::{test_context, MemFs, RecordingEmitter, ScriptedProcess, StubResolver};

    const COVERED: &str = r#"<coverage line-rate="1.0"><packages><package name="Demo"><classes><class name="Demo.Widget" filename="src/Widget.cs"><methods><method name="M0" signature="()"><lines><line number="10" hits="1" branch="False" /></lines></method></methods></class></classes></package></packages></coverage>"#;

    fn args() -> SynthArgs {
        SynthArgs {
            solution_path: PathBuf::from("/work/Demo.sln"),
            test_project_paths: vec![PathBuf::from("/work/Demo.Tests/Demo.Tests.csproj")],
            coverage_threshold: 100.0,
            iteration_budget: 5,
            provider: ProviderKind::Mock,
            generate_all: false,
            source_filter: None,
            output_folder: None,
            min_improvement: None,
            determinism_runs: 0,
            model: None,
            endpoint: None,
            artifacts_dir: PathBuf::from("out"),
        }
    }

    #[tokio::test]
    async fn missing_solution_is_fatal_before_any_work() {
        let process = ScriptedProcess::new();
        let ctx = test_context(
            MemFs::new(),
            process.clone(),
            StubResolver::default(),
            RecordingEmitter::default(),
        );

        let mut output = Vec::new();
        let err = run_with_context(&ctx, args(), &mut output).await.unwrap_err();

        assert!(matches!(err, DarnerError::SolutionNotFound { .. }));
        assert!(process.requests().is_empty());
        assert!(output.is_empty());
    }

    #[tokio::test]
    async fn a_satisfied_threshold_run_writes_the_report() {
        let fs = MemFs::new();
        let process = ScriptedProcess::new();
        fs.insert("/work/Demo.sln", "");
        // Run id is id-1, so the baseline coverage run is id-2.
        fs.insert("out/coverage/id-2/coverage/coverage.cobertura.xml", COVERED);
        let ctx = test_context(
            fs.clone(),
            process.clone(),
            StubResolver::default(),
            RecordingEmitter::default(),
        );

        let mut output = Vec::new();
        run_with_context(&ctx, args(), &mut output).await.unwrap();

        let report = fs.content("out/reports/run-id-1.json").unwrap();
        assert!(report.contains("\"runId\": \"id-1\""));
        assert_eq!(process.requests().len(), 1);
        assert!(fs
            .created_dirs()
            .contains(&PathBuf::from("/work/Demo.Tests/Generated")));

        let text = String::from_utf8(output).unwrap();
        assert!(text.contains("Coverage threshold satisfied."));
        assert!(text.contains("Report: out/reports/run-id-1.json"));
    }
}

//! CLI argument definitions.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::generate::ProviderKind;

/// Top-level CLI parser for `darner`.
#[derive(Debug, Parser)]
#[command(name = "darner", version, about = "Coverage-driven test synthesis for .NET solutions")]
pub struct Cli {
    /// The command to execute.
    #[command(subcommand)]
    pub command: Command,
}

/// Supported top-level subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Measure coverage and synthesize tests for one solution.
    Synth(SynthArgs),
    /// Run the synthesis loop across many projects from a config file.
    Batch(BatchArgs),
    /// Re-render a persisted run report.
    Report(ReportArgs),
}

/// Arguments for `darner synth`.
#[derive(Debug, Args)]
pub struct SynthArgs {
    /// Path to the solution or project file.
    #[arg(long)]
    pub solution_path: PathBuf,

    /// Test project to build and run; repeat for multiple projects.
    #[arg(long = "test-project-path", required = true)]
    pub test_project_paths: Vec<PathBuf>,

    /// Overall coverage percentage that stops the loop.
    #[arg(long, default_value_t = 100.0)]
    pub coverage_threshold: f64,

    /// Maximum number of synthesis iterations.
    #[arg(long, default_value_t = 100)]
    pub iteration_budget: u32,

    /// Generation backend: local-inference, anthropic, openai, http, or mock.
    #[arg(long, default_value = "local-inference")]
    pub provider: ProviderKind,

    /// Target every discoverable method and skip coverage measurement.
    #[arg(long)]
    pub generate_all: bool,

    /// In generate-all mode, only target types whose full name contains
    /// this filter.
    #[arg(long)]
    pub source_filter: Option<String>,

    /// Directory for generated test files; defaults to `Generated` under
    /// the first test project.
    #[arg(long)]
    pub output_folder: Option<PathBuf>,

    /// Reject passing tests that improve coverage by fewer percentage
    /// points than this.
    #[arg(long)]
    pub min_improvement: Option<f64>,

    /// Re-run passing tests this many extra times to catch flakes.
    #[arg(long, default_value_t = 0)]
    pub determinism_runs: u32,

    /// Model name passed to the generation backend.
    #[arg(long)]
    pub model: Option<String>,

    /// Base URL of the generation backend.
    #[arg(long)]
    pub endpoint: Option<String>,

    /// Directory for coverage artifacts and run reports.
    #[arg(long, default_value = "artifacts")]
    pub artifacts_dir: PathBuf,
}

/// Arguments for `darner batch`.
#[derive(Debug, Args)]
pub struct BatchArgs {
    /// Path to the batch config JSON file.
    #[arg(long)]
    pub config: PathBuf,

    /// Generation backend used for every project.
    #[arg(long, default_value = "local-inference")]
    pub provider: ProviderKind,

    /// Model name passed to the generation backend.
    #[arg(long)]
    pub model: Option<String>,

    /// Base URL of the generation backend.
    #[arg(long)]
    pub endpoint: Option<String>,
}

/// Arguments for `darner report`.
#[derive(Debug, Args)]
pub struct ReportArgs {
    /// Run report file, or a directory holding `run-*.json` files.
    #[arg(long)]
    pub run: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::{Cli, Command};
    use crate::generate::ProviderKind;
    use clap::Parser;

    #[test]
    fn parses_synth_with_repeated_test_projects() {
        let cli = Cli::parse_from([
            "darner",
            "synth",
            "--solution-path",
            "App.sln",
            "--test-project-path",
            "A.Tests/A.Tests.csproj",
            "--test-project-path",
            "B.Tests/B.Tests.csproj",
            "--provider",
            "mock",
        ]);
        let Command::Synth(args) = cli.command else {
            panic!("expected synth");
        };
        assert_eq!(args.test_project_paths.len(), 2);
        assert_eq!(args.provider, ProviderKind::Mock);
        assert!((args.coverage_threshold - 100.0).abs() < f64::EPSILON);
        assert_eq!(args.iteration_budget, 100);
        assert!(!args.generate_all);
        assert!(args.min_improvement.is_none());
    }

    #[test]
    fn synth_requires_a_test_project() {
        let result = Cli::try_parse_from(["darner", "synth", "--solution-path", "App.sln"]);
        assert!(result.is_err());
    }

    #[test]
    fn parses_batch_and_report_subcommands() {
        let cli = Cli::parse_from(["darner", "batch", "--config", "projects.json"]);
        assert!(matches!(cli.command, Command::Batch(_)));

        let cli = Cli::parse_from(["darner", "report", "--run", "artifacts/reports"]);
        assert!(matches!(cli.command, Command::Report(_)));
    }

    #[test]
    fn rejects_an_unknown_provider() {
        let result = Cli::try_parse_from([
            "darner",
            "synth",
            "--solution-path",
            "App.sln",
            "--test-project-path",
            "A.Tests/A.Tests.csproj",
            "--provider",
            "palm",
        ]);
        assert!(result.is_err());
    }
}

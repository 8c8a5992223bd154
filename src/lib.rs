//! Core library entry for the `darner` CLI.

pub mod adapters;
pub mod batch;
pub mod cancel;
pub mod cli;
pub mod commands;
pub mod context;
pub mod coverage;
pub mod error;
pub mod generate;
pub mod model;
pub mod ports;
pub mod report;
pub mod synth;

#[cfg(test)]
pub(crate) mod testutil;

use clap::Parser;

/// Run the CLI with the provided arguments.
///
/// # Errors
///
/// Returns an error string when argument parsing fails or command
/// execution fails.
pub async fn run<I, T>(args: I) -> Result<(), String>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    let cli = cli::Cli::try_parse_from(args).map_err(|err| err.to_string())?;
    commands::dispatch(cli.command).await.map_err(|err| err.to_string())
}

#[cfg(test)]
mod tests {
    use super::run;

    #[tokio::test]
    async fn run_errors_on_unknown_subcommand() {
        let result = run(["darner", "unknown"]).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn run_reports_a_missing_run_report() {
        let result = run(["darner", "report", "--run", "nowhere/at/all"]).await;
        let err = result.unwrap_err();
        assert!(err.contains("no run report found"), "{err}");
    }
}

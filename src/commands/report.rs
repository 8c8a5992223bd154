//! `darner report` command.

use std::io::{self, Write};
use std::path::Path;

use crate::context::ServiceContext;
use crate::error::Result;
use crate::report::{read_run_report, render_run_summary};

/// Execute the `report` command.
///
/// # Errors
///
/// Returns an error when no run report can be found at the given path.
pub fn run(run_path: &Path) -> Result<()> {
    let ctx = ServiceContext::live(Path::new("."), "xunit", "Moq");
    let mut stdout = io::stdout();
    run_with_context(&ctx, run_path, &mut stdout)
}

/// Execute the `report` command with the given service context.
///
/// # Errors
///
/// Same contract as [`run`].
pub fn run_with_context<W: Write>(
    ctx: &ServiceContext,
    run_path: &Path,
    writer: &mut W,
) -> Result<()> {
    let report = read_run_report(ctx.fs.as_ref(), run_path)?;
    write!(writer, "{}", render_run_summary(&report))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DarnerError;
    use crate::report::{write_run_report, RunReport, RunSummary};
    use crate::synth::RunState;
    use crate::testutil::{test_context, MemFs, RecordingEmitter, ScriptedProcess, StubResolver};
    use chrono::{TimeZone, Utc};

    fn stored_report() -> RunReport {
        RunReport {
            run_id: "id-9".to_string(),
            solution_path: "/work/Demo.sln".to_string(),
            provider: "mock".to_string(),
            state: RunState::Done,
            started_at_utc: Utc.with_ymd_and_hms(2026, 3, 14, 9, 30, 0).unwrap(),
            finished_at_utc: Utc.with_ymd_and_hms(2026, 3, 14, 9, 31, 0).unwrap(),
            iteration_budget: 5,
            baseline_coverage: None,
            final_coverage: None,
            iterations: Vec::new(),
            summary: RunSummary {
                completed: true,
                ..RunSummary::default()
            },
        }
    }

    #[test]
    fn renders_a_stored_report_found_by_directory() {
        let fs = MemFs::new();
        let ctx = test_context(
            fs.clone(),
            ScriptedProcess::new(),
            StubResolver::default(),
            RecordingEmitter::default(),
        );
        write_run_report(&fs, &stored_report(), Path::new("artifacts/reports")).unwrap();

        let mut output = Vec::new();
        run_with_context(&ctx, Path::new("artifacts/reports"), &mut output).unwrap();

        let text = String::from_utf8(output).unwrap();
        assert!(text.contains("Run id-9 (/work/Demo.sln)"));
        assert!(text.contains("Provider: mock"));
    }

    #[test]
    fn a_missing_report_is_a_report_error() {
        let ctx = test_context(
            MemFs::new(),
            ScriptedProcess::new(),
            StubResolver::default(),
            RecordingEmitter::default(),
        );

        let mut output = Vec::new();
        let err = run_with_context(&ctx, Path::new("nowhere"), &mut output).unwrap_err();
        assert!(matches!(err, DarnerError::Report { .. }));
    }
}

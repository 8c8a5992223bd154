//! Acceptance gate for freshly emitted tests.
//!
//! Re-runs the instrumented suite with the new tests in place and decides
//! whether to keep them. Acceptance requires a passing suite; a minimum
//! coverage improvement and a determinism re-run check are both opt-in.

use crate::cancel::CancellationToken;
use crate::context::ServiceContext;
use crate::coverage::runner::{run_coverage, RunnerOptions};
use crate::coverage::snapshot::CoverageSnapshot;
use crate::error::Result;
use crate::model::VerificationResult;

/// Opt-in tightenings of the acceptance gate.
#[derive(Debug, Clone, Default)]
pub struct GateConfig {
    /// Minimum combined coverage gain (line plus branch percentage
    /// points) a passing batch must deliver to be kept.
    pub min_coverage_improvement: Option<f64>,
    /// Number of extra verification runs whose pass/fail outcome must
    /// match the first. Zero skips the check.
    pub determinism_runs: u32,
}

/// Verdict plus the measurement it was based on.
#[derive(Debug, Clone)]
pub struct GateOutcome {
    /// The acceptance decision and its evidence.
    pub result: VerificationResult,
    /// Coverage measured with the new tests in place.
    pub snapshot: CoverageSnapshot,
}

/// Runs the suite once (plus any determinism re-runs) and decides whether
/// the emitted tests are kept.
///
/// A failing suite is a rejection, not an error.
///
/// # Errors
///
/// Fails only when the toolchain cannot be started or run artifacts
/// cannot be written.
pub async fn verify_tests(
    ctx: &ServiceContext,
    runner_options: &RunnerOptions,
    baseline: &CoverageSnapshot,
    config: &GateConfig,
    cancel: &CancellationToken,
) -> Result<GateOutcome> {
    let run = run_coverage(ctx, runner_options, cancel).await?;
    let tests_passed = run.tests_passed();
    let snapshot = CoverageSnapshot::from_files(&run.coverage_xml_paths, ctx.fs.as_ref());
    let coverage_delta = baseline.delta_to(&snapshot);

    let mut accepted = tests_passed;
    let mut rejection_reason = (!tests_passed).then(|| "Tests failed".to_string());

    if accepted {
        if let Some(minimum) = config.min_coverage_improvement {
            let improvement = coverage_delta.line_delta + coverage_delta.branch_delta;
            if improvement < minimum {
                accepted = false;
                rejection_reason = Some("Coverage improvement below threshold".to_string());
            }
        }
    }

    // Re-run only suites that passed; a failed suite is already rejected
    // and burning more toolchain time on it proves nothing.
    let mut is_deterministic = true;
    if tests_passed && config.determinism_runs > 0 {
        for _ in 0..config.determinism_runs {
            if cancel.is_cancelled() {
                break;
            }
            let rerun = run_coverage(ctx, runner_options, cancel).await?;
            if rerun.tests_passed() != tests_passed {
                is_deterministic = false;
                accepted = false;
                rejection_reason =
                    Some("Tests were not deterministic across verification runs".to_string());
                break;
            }
        }
    }

    tracing::debug!(
        run_id = %run.run_id,
        accepted,
        tests_passed,
        line_delta = coverage_delta.line_delta,
        "verification gate decided"
    );

    Ok(GateOutcome {
        result: VerificationResult {
            accepted,
            coverage_delta,
            tests_passed,
            rejection_reason,
            is_deterministic,
        },
        snapshot,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coverage::CoverageFormat;
    use crate::testutil::{test_context, MemFs, RecordingEmitter, ScriptedProcess, StubResolver};
    use std::path::PathBuf;

    const BASELINE: &str = r#"<coverage line-rate="0.5">
  <packages><package name="Demo"><classes>
    <class name="Demo.Calculator" filename="src/Calculator.cs">
      <methods><method name="Evaluate" signature="()">
        <lines>
          <line number="12" hits="1" branch="False" />
          <line number="13" hits="0" branch="False" />
        </lines>
      </method></methods>
    </class>
  </classes></package></packages>
</coverage>"#;

    const IMPROVED: &str = r#"<coverage line-rate="1.0">
  <packages><package name="Demo"><classes>
    <class name="Demo.Calculator" filename="src/Calculator.cs">
      <methods><method name="Evaluate" signature="()">
        <lines>
          <line number="12" hits="1" branch="False" />
          <line number="13" hits="3" branch="False" />
        </lines>
      </method></methods>
    </class>
  </classes></package></packages>
</coverage>"#;

    fn baseline() -> CoverageSnapshot {
        let mut snapshot = CoverageSnapshot::default();
        snapshot.absorb(BASELINE, CoverageFormat::Cobertura).unwrap();
        snapshot
    }

    fn options() -> RunnerOptions {
        RunnerOptions::new(
            PathBuf::from("/work/Demo.sln"),
            vec![PathBuf::from("/work/Demo.Tests/Demo.Tests.csproj")],
        )
    }

    fn context_with(
        fs: MemFs,
        process: ScriptedProcess,
    ) -> crate::context::ServiceContext {
        test_context(fs, process, StubResolver::default(), RecordingEmitter::default())
    }

    #[tokio::test]
    async fn passing_suite_is_accepted_with_its_delta() {
        let fs = MemFs::new();
        let process = ScriptedProcess::new();
        process.push_exit(0, "all green", "");
        // The verification run is id-1 in a fresh context.
        fs.insert("artifacts/coverage/id-1/coverage/coverage.cobertura.xml", IMPROVED);
        let ctx = context_with(fs, process);

        let outcome = verify_tests(
            &ctx,
            &options(),
            &baseline(),
            &GateConfig::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert!(outcome.result.accepted);
        assert!(outcome.result.tests_passed);
        assert!(outcome.result.is_deterministic);
        assert_eq!(outcome.result.rejection_reason, None);
        assert!((outcome.result.coverage_delta.line_delta - 50.0).abs() < 1e-9);
        assert_eq!(
            outcome.result.coverage_delta.new_probes_hit,
            vec!["src/Calculator.cs:13".to_string()]
        );
        assert!((outcome.snapshot.line_rate() - 100.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn failing_suite_is_rejected() {
        let process = ScriptedProcess::new();
        process.push_exit(1, "2 failed", "");
        let ctx = context_with(MemFs::new(), process);

        let outcome = verify_tests(
            &ctx,
            &options(),
            &baseline(),
            &GateConfig::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert!(!outcome.result.accepted);
        assert!(!outcome.result.tests_passed);
        assert_eq!(outcome.result.rejection_reason.as_deref(), Some("Tests failed"));
        // Skipped check is assumed deterministic, not proven.
        assert!(outcome.result.is_deterministic);
    }

    #[tokio::test]
    async fn improvement_gate_rejects_small_gains_and_passes_large_ones() {
        for (minimum, expect_accepted) in [(60.0, false), (10.0, true)] {
            let fs = MemFs::new();
            let process = ScriptedProcess::new();
            process.push_exit(0, "", "");
            fs.insert("artifacts/coverage/id-1/coverage/coverage.cobertura.xml", IMPROVED);
            let ctx = context_with(fs, process);

            let config = GateConfig {
                min_coverage_improvement: Some(minimum),
                determinism_runs: 0,
            };
            let outcome = verify_tests(
                &ctx,
                &options(),
                &baseline(),
                &config,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

            assert_eq!(outcome.result.accepted, expect_accepted, "minimum {minimum}");
            assert!(outcome.result.tests_passed);
            if expect_accepted {
                assert_eq!(outcome.result.rejection_reason, None);
            } else {
                assert_eq!(
                    outcome.result.rejection_reason.as_deref(),
                    Some("Coverage improvement below threshold")
                );
            }
        }
    }

    #[tokio::test]
    async fn flaky_rerun_rejects_as_nondeterministic() {
        let fs = MemFs::new();
        let process = ScriptedProcess::new();
        process.push_exit(0, "", "");
        process.push_exit(0, "", "");
        process.push_exit(1, "1 failed", "");
        fs.insert("artifacts/coverage/id-1/coverage/coverage.cobertura.xml", IMPROVED);
        let ctx = context_with(fs, process.clone());

        let config = GateConfig {
            min_coverage_improvement: None,
            determinism_runs: 2,
        };
        let outcome = verify_tests(
            &ctx,
            &options(),
            &baseline(),
            &config,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert!(!outcome.result.accepted);
        assert!(!outcome.result.is_deterministic);
        assert_eq!(
            outcome.result.rejection_reason.as_deref(),
            Some("Tests were not deterministic across verification runs")
        );
        assert_eq!(process.requests().len(), 3);
    }

    #[tokio::test]
    async fn stable_reruns_keep_the_acceptance() {
        let fs = MemFs::new();
        let process = ScriptedProcess::new();
        process.push_exit(0, "", "");
        process.push_exit(0, "", "");
        fs.insert("artifacts/coverage/id-1/coverage/coverage.cobertura.xml", IMPROVED);
        let ctx = context_with(fs, process.clone());

        let config = GateConfig {
            min_coverage_improvement: None,
            determinism_runs: 1,
        };
        let outcome = verify_tests(
            &ctx,
            &options(),
            &baseline(),
            &config,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert!(outcome.result.accepted);
        assert!(outcome.result.is_deterministic);
        assert_eq!(process.requests().len(), 2);
    }

    #[tokio::test]
    async fn reruns_are_skipped_for_a_failing_suite() {
        let process = ScriptedProcess::new();
        process.push_exit(1, "", "");
        let ctx = context_with(MemFs::new(), process.clone());

        let config = GateConfig {
            min_coverage_improvement: None,
            determinism_runs: 3,
        };
        let outcome = verify_tests(
            &ctx,
            &options(),
            &baseline(),
            &config,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert!(!outcome.result.accepted);
        assert_eq!(process.requests().len(), 1);
    }
}

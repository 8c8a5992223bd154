//! The coverage-driven synthesis control loop.
//!
//! [`controller`] owns the budgeted iteration state machine that drives one
//! method target at a time through generation, emission, and verification.
//! [`verifier`] is the acceptance gate the controller consults after each
//! emission.

pub mod controller;
pub mod verifier;

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::coverage::CoverageFormat;
use crate::generate::GenerationOptions;
use crate::model::GenerationConstraints;

/// States of the iteration controller.
///
/// `Done` is the normal terminal state (budget exhausted, no targets left,
/// a threshold satisfied, or cancellation). `Failed` marks an unrecoverable
/// setup error such as an unstartable toolchain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    /// Not started yet.
    Idle,
    /// Picking the next target from the work map.
    Selecting,
    /// Enriching the target and calling the generation backend.
    Generating,
    /// Writing proposed tests to disk.
    Emitting,
    /// Re-running the pipeline and gating acceptance.
    Verifying,
    /// Terminal, run finished.
    Done,
    /// Terminal, unrecoverable setup error.
    Failed,
}

/// Priority ordering for target selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SelectionOrder {
    /// Most uncovered branch points first, ties by most uncovered lines.
    #[default]
    BranchesFirst,
    /// Most uncovered lines first, ties by most uncovered branch points.
    LinesFirst,
    /// First target in work-map order.
    MapOrder,
}

/// Early-stop coverage targets, all percentages.
///
/// `stop_on_any` false requires every configured target to be met before
/// the run stops early; true stops on the first met target. With nothing
/// configured the policy never triggers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ThresholdPolicy {
    /// Line coverage target.
    pub line: Option<f64>,
    /// Branch coverage target.
    pub branch: Option<f64>,
    /// Overall target, compared against the mean of line and branch rates.
    pub overall: Option<f64>,
    /// Any-vs-all evaluation of the configured targets.
    pub stop_on_any: bool,
}

impl ThresholdPolicy {
    /// Policy with only the overall target set, as the CLI configures it.
    #[must_use]
    pub fn overall_only(percent: f64) -> Self {
        Self {
            line: None,
            branch: None,
            overall: Some(percent),
            stop_on_any: false,
        }
    }

    /// Evaluates the policy against the current coverage rates.
    #[must_use]
    pub fn met(&self, line_rate: f64, branch_rate: f64) -> bool {
        let overall_rate = (line_rate + branch_rate) / 2.0;
        let checks = [
            (self.line, line_rate),
            (self.branch, branch_rate),
            (self.overall, overall_rate),
        ];

        let mut any_configured = false;
        let mut all_met = true;
        let mut any_met = false;
        for (target, actual) in checks {
            let Some(target) = target else { continue };
            any_configured = true;
            if actual >= target {
                any_met = true;
            } else {
                all_met = false;
            }
        }
        if !any_configured {
            return false;
        }
        if self.stop_on_any {
            any_met
        } else {
            all_met
        }
    }
}

/// Everything one synthesis run needs to know.
#[derive(Debug, Clone)]
pub struct SynthesisConfig {
    /// Solution or project file handed to the toolchain.
    pub solution_path: PathBuf,
    /// Test projects, first one anchors the default output folder.
    pub test_project_paths: Vec<PathBuf>,
    /// Root for per-run artifact directories.
    pub artifacts_dir: PathBuf,
    /// Coverage report format to request and parse.
    pub format: CoverageFormat,
    /// Maximum number of iterations.
    pub iteration_budget: u32,
    /// Early-stop coverage targets.
    pub thresholds: ThresholdPolicy,
    /// Target priority ordering.
    pub selection: SelectionOrder,
    /// Limits handed to the generation backend per request.
    pub constraints: GenerationConstraints,
    /// Backend choice and sampling controls.
    pub generation: GenerationOptions,
    /// Target every discoverable method instead of uncovered ones; skips
    /// coverage measurement and verification.
    pub generate_all: bool,
    /// Type-name filter for generate-all discovery.
    pub source_filter: Option<String>,
    /// Override for the emission directory; default is
    /// `<first test project dir>/Generated`.
    pub output_folder: Option<PathBuf>,
    /// Opt-in minimum coverage improvement in percentage points, summed
    /// over line and branch deltas. `None` accepts on test pass alone.
    pub min_coverage_improvement: Option<f64>,
    /// Extra verification runs that must agree on pass/fail. Zero skips
    /// the check.
    pub determinism_runs: u32,
    /// Wall-clock budget for the whole run.
    pub wall_clock_budget: Option<Duration>,
    /// Timeout applied to each external toolchain invocation.
    pub step_timeout: Option<Duration>,
}

impl SynthesisConfig {
    /// Defaults matching the CLI: budget 100, overall threshold 100%,
    /// branch-first selection, Cobertura reports, verification gated on
    /// test pass alone.
    #[must_use]
    pub fn new(solution_path: PathBuf, test_project_paths: Vec<PathBuf>) -> Self {
        Self {
            solution_path,
            test_project_paths,
            artifacts_dir: PathBuf::from("artifacts"),
            format: CoverageFormat::Cobertura,
            iteration_budget: 100,
            thresholds: ThresholdPolicy::overall_only(100.0),
            selection: SelectionOrder::default(),
            constraints: GenerationConstraints::default(),
            generation: GenerationOptions::default(),
            generate_all: false,
            source_filter: None,
            output_folder: None,
            min_coverage_improvement: None,
            determinism_runs: 0,
            wall_clock_budget: None,
            step_timeout: None,
        }
    }

    /// Resolves the emission directory: the explicit override when given,
    /// else `Generated/` beside the first test project.
    #[must_use]
    pub fn output_dir(&self) -> PathBuf {
        if let Some(folder) = &self.output_folder {
            return folder.clone();
        }
        self.test_project_paths
            .first()
            .and_then(|p| p.parent())
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
            .join("Generated")
    }
}

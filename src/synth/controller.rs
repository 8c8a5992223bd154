//! Budgeted iteration loop that drives test synthesis.
//!
//! One run measures baseline coverage, then repeatedly picks the highest
//! priority under-tested method, asks the generation backend for test
//! proposals, emits them, and consults the verification gate. Each
//! iteration consumes its target whether or not it succeeds, so a run
//! always terminates: on an exhausted budget, an empty work map, a met
//! coverage threshold, an exhausted wall clock, or cancellation.
//!
//! Failures inside an iteration (an unresolvable method, a backend that
//! cannot run, a broken verification run) are narrated and recorded on the
//! iteration, and the loop moves on. Only setup failures such as an
//! unstartable toolchain abort the run.

use std::io::Write;

use crate::cancel::CancellationToken;
use crate::context::ServiceContext;
use crate::coverage::normalize_reports;
use crate::coverage::runner::{run_coverage, RunnerOptions};
use crate::coverage::snapshot::CoverageSnapshot;
use crate::error::{DarnerError, Result};
use crate::generate::TestGenerator;
use crate::model::{MethodTarget, ModuleTarget, UncoveredWorkMap};
use crate::report::{CoverageRates, IterationRecord, RunReport, RunSummary};
use crate::synth::verifier::{verify_tests, GateConfig};
use crate::synth::{RunState, SelectionOrder, SynthesisConfig};

/// The synthesis control loop.
///
/// Narrates progress to the writer as it goes; tests capture the
/// narration in a buffer and the CLI hands in stdout.
pub struct SynthesisLoop<W: Write> {
    config: SynthesisConfig,
    cancel: CancellationToken,
    writer: W,
    state: RunState,
}

impl<W: Write> SynthesisLoop<W> {
    /// Creates a loop for one run.
    pub fn new(config: SynthesisConfig, writer: W) -> Self {
        Self {
            config,
            cancel: CancellationToken::new(),
            writer,
            state: RunState::Idle,
        }
    }

    /// Handle for requesting cancellation from another task or a signal
    /// handler. The loop stops at the next iteration boundary.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Current controller state.
    #[must_use]
    pub fn state(&self) -> RunState {
        self.state
    }

    /// Runs the loop to completion and returns the run report.
    ///
    /// # Errors
    ///
    /// Fails when setup does: the baseline coverage run cannot start, or
    /// in generate-all mode the method discovery fails. Iteration-scoped
    /// failures are recorded on the iteration instead.
    pub async fn run(
        &mut self,
        ctx: &ServiceContext,
        generator: &dyn TestGenerator,
    ) -> Result<RunReport> {
        let outcome = self.drive(ctx, generator).await;
        if outcome.is_err() {
            self.state = RunState::Failed;
        }
        outcome
    }

    async fn drive(
        &mut self,
        ctx: &ServiceContext,
        generator: &dyn TestGenerator,
    ) -> Result<RunReport> {
        let started_at = ctx.clock.now();
        let run_id = ctx.id_gen.generate_id();
        tracing::info!(
            run_id = %run_id,
            provider = %self.config.generation.provider,
            "synthesis run starting"
        );

        writeln!(self.writer, "Solution: {}", self.config.solution_path.display())?;
        let projects = self
            .config
            .test_project_paths
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(", ");
        writeln!(self.writer, "Test Projects: {projects}")?;
        if let Some(overall) = self.config.thresholds.overall {
            writeln!(self.writer, "Coverage Threshold: {overall}%")?;
        }
        if let Some(line) = self.config.thresholds.line {
            writeln!(self.writer, "Line Threshold: {line}%")?;
        }
        if let Some(branch) = self.config.thresholds.branch {
            writeln!(self.writer, "Branch Threshold: {branch}%")?;
        }
        writeln!(self.writer, "Iteration Budget: {}", self.config.iteration_budget)?;
        writeln!(self.writer, "Provider: {}", self.config.generation.provider)?;

        let mut runner_options = RunnerOptions::new(
            self.config.solution_path.clone(),
            self.config.test_project_paths.clone(),
        );
        runner_options.artifacts_dir = self.config.artifacts_dir.clone();
        runner_options.format = self.config.format;
        runner_options.timeout = self.config.step_timeout;

        let (mut map, mut current) = if self.config.generate_all {
            writeln!(self.writer, "Discovering methods to target...")?;
            let methods = ctx
                .source
                .find_all_methods(self.config.source_filter.as_deref())
                .map_err(|e| DarnerError::config(format!("method discovery failed: {e}")))?;
            writeln!(self.writer, "Found {} methods to target", methods.len())?;
            let map = self.map_from_methods(methods, ctx);
            (map, CoverageSnapshot::default())
        } else {
            writeln!(self.writer, "Running initial coverage...")?;
            let baseline = run_coverage(ctx, &runner_options, &self.cancel).await?;
            writeln!(
                self.writer,
                "Initial coverage run completed with exit code: {}",
                baseline.exit_code
            )?;
            let snapshot =
                CoverageSnapshot::from_files(&baseline.coverage_xml_paths, ctx.fs.as_ref());
            let map = normalize_reports(
                &baseline.coverage_xml_paths,
                ctx.clock.now(),
                None,
                ctx.fs.as_ref(),
            );
            writeln!(self.writer, "Found {} uncovered methods", map.total_methods())?;
            (map, snapshot)
        };

        let baseline_coverage = (!self.config.generate_all).then(|| CoverageRates {
            line_rate: current.line_rate(),
            branch_rate: current.branch_rate(),
        });

        let gate = GateConfig {
            min_coverage_improvement: self.config.min_coverage_improvement,
            determinism_runs: self.config.determinism_runs,
        };

        let mut iterations: Vec<IterationRecord> = Vec::new();
        let mut summary = RunSummary::default();
        let mut completed = true;
        let mut iteration: u32 = 0;

        loop {
            if self.cancel.is_cancelled() {
                writeln!(self.writer, "Run cancelled.")?;
                completed = false;
                break;
            }
            if iteration >= self.config.iteration_budget {
                writeln!(self.writer, "Iteration budget exhausted.")?;
                break;
            }
            if let Some(limit) = self.config.wall_clock_budget {
                let elapsed = (ctx.clock.now() - started_at).to_std().unwrap_or_default();
                if elapsed >= limit {
                    writeln!(self.writer, "Wall-clock budget exhausted.")?;
                    break;
                }
            }
            if !self.config.generate_all
                && self.config.thresholds.met(current.line_rate(), current.branch_rate())
            {
                writeln!(self.writer, "Coverage threshold satisfied.")?;
                break;
            }
            self.state = RunState::Selecting;
            let Some(target) = select_target(&map, self.config.selection) else {
                writeln!(self.writer, "No targets remain.")?;
                break;
            };

            iteration += 1;
            writeln!(self.writer, "\nIteration {iteration}...")?;
            writeln!(self.writer, "Targeting method: {}", target.method_display_name)?;

            let mut record = IterationRecord {
                iteration,
                method_id: target.method_id.clone(),
                method_display_name: target.method_display_name.clone(),
                tests_proposed: 0,
                accepted: None,
                rejection_reason: None,
                notes: Vec::new(),
            };

            if let Err(e) = self
                .attempt(ctx, generator, &runner_options, &gate, &target, &mut record, &mut current)
                .await
            {
                writeln!(self.writer, "Error in iteration {iteration}: {e}")?;
                record.notes.push(format!("iteration error: {e}"));
            }

            // The target is consumed either way; retrying a method that
            // just failed would burn the budget without new information.
            map.remove_method(&target.method_id);
            summary.targets_attempted += 1;
            summary.tests_proposed += record.tests_proposed;
            match record.accepted {
                Some(true) => summary.accepted += 1,
                Some(false) => summary.rejected += 1,
                None => {}
            }
            iterations.push(record);
        }

        self.state = RunState::Done;
        summary.iterations_used = iteration;
        summary.completed = completed;
        writeln!(self.writer, "\nOrchestration complete.")?;
        writeln!(
            self.writer,
            "Summary: {} targets attempted, {} tests proposed, {} accepted, {} rejected",
            summary.targets_attempted, summary.tests_proposed, summary.accepted, summary.rejected
        )?;

        let final_coverage = (!self.config.generate_all).then(|| CoverageRates {
            line_rate: current.line_rate(),
            branch_rate: current.branch_rate(),
        });

        Ok(RunReport {
            run_id,
            solution_path: self.config.solution_path.display().to_string(),
            provider: self.config.generation.provider.to_string(),
            state: self.state,
            started_at_utc: started_at,
            finished_at_utc: ctx.clock.now(),
            iteration_budget: self.config.iteration_budget,
            baseline_coverage,
            final_coverage,
            iterations,
            summary,
        })
    }

    /// One iteration's pipeline: enrich, generate, emit, verify.
    ///
    /// Every error out of here is iteration-scoped; the loop narrates it
    /// and moves to the next target.
    #[allow(clippy::too_many_arguments)]
    async fn attempt(
        &mut self,
        ctx: &ServiceContext,
        generator: &dyn TestGenerator,
        runner_options: &RunnerOptions,
        gate: &GateConfig,
        target: &MethodTarget,
        record: &mut IterationRecord,
        current: &mut CoverageSnapshot,
    ) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.state = RunState::Generating;
        let request_id = ctx.id_gen.generate_id();
        let request =
            ctx.source
                .collect_context(target, &request_id, self.config.constraints.clone())?;
        let response = generator.generate(&request).await?;

        for note in &response.notes {
            writeln!(self.writer, "  Note: {note}")?;
            record.notes.push(note.clone());
        }
        writeln!(
            self.writer,
            "  Response contains {} test specifications",
            response.proposed_tests.len()
        )?;
        record.tests_proposed = u32::try_from(response.proposed_tests.len()).unwrap_or(u32::MAX);
        if response.proposed_tests.is_empty() {
            return Ok(());
        }

        self.state = RunState::Emitting;
        let output_dir = self.config.output_dir();
        writeln!(self.writer, "Writing tests to: {}", output_dir.display())?;
        let emitted = ctx.emitter.emit(&response, target, &output_dir)?;
        writeln!(self.writer, "Emitted {} test files", emitted.len())?;

        if self.config.generate_all {
            writeln!(self.writer, "Tests generated (verification skipped in generate-all mode)")?;
            return Ok(());
        }

        self.state = RunState::Verifying;
        let outcome = verify_tests(ctx, runner_options, current, gate, &self.cancel).await?;
        record.accepted = Some(outcome.result.accepted);
        record.rejection_reason = outcome.result.rejection_reason.clone();
        if outcome.result.accepted {
            writeln!(self.writer, "Tests accepted!")?;
            // Accepted tests move the baseline so later deltas and the
            // threshold check see the gain.
            *current = outcome.snapshot;
        } else {
            writeln!(
                self.writer,
                "Tests rejected: {}",
                outcome.result.rejection_reason.as_deref().unwrap_or("unknown")
            )?;
        }
        Ok(())
    }

    fn map_from_methods(
        &self,
        methods: Vec<MethodTarget>,
        ctx: &ServiceContext,
    ) -> UncoveredWorkMap {
        let mut map = UncoveredWorkMap::new(ctx.clock.now());
        if !methods.is_empty() {
            let assembly = self
                .config
                .solution_path
                .file_stem()
                .map_or_else(|| "solution".to_string(), |s| s.to_string_lossy().into_owned());
            map.modules.push(ModuleTarget {
                assembly_name: assembly.clone(),
                assembly_path: assembly,
                methods,
            });
        }
        map
    }
}

/// Picks the next target under the configured ordering.
///
/// Ties keep the earlier method in map order, so repeated runs over the
/// same map walk it in a stable sequence.
fn select_target(map: &UncoveredWorkMap, order: SelectionOrder) -> Option<MethodTarget> {
    if matches!(order, SelectionOrder::MapOrder) {
        return map.methods().next().cloned();
    }
    let mut best: Option<&MethodTarget> = None;
    for method in map.methods() {
        let replace = match best {
            None => true,
            Some(current) => priority(method, order) > priority(current, order),
        };
        if replace {
            best = Some(method);
        }
    }
    best.cloned()
}

fn priority(method: &MethodTarget, order: SelectionOrder) -> (usize, usize) {
    let branches = method.uncovered_branch_points.len();
    let lines = method.uncovered_sequence_points.len();
    match order {
        SelectionOrder::BranchesFirst => (branches, lines),
        SelectionOrder::LinesFirst => (lines, branches),
        SelectionOrder::MapOrder => (0, 0),
    }
}

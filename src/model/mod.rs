//! Canonical data model for coverage-driven test synthesis.
//!
//! These types are the tool-agnostic contract between the coverage
//! normalizer, the iteration controller, the generation backends, and any
//! downstream consumer of persisted reports. Serialized field names are
//! camelCase and stable.

mod hasher;
mod request;
mod response;

pub use hasher::method_id;
pub use request::{
    BranchHint, DependencyPlan, GenerationConstraints, GenerationRequest, HarnessPlan,
};
pub use response::{GenerationResponse, StepKind, TestCaseSpec, TestStep};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stable method identity: lowercase hex SHA-256 over
/// `assembly|type|signature`, computed by [`method_id`].
pub type MethodId = String;

/// Root container of everything left to cover, rebuilt fresh each run.
///
/// Never contains a module with zero methods; removal of the last method
/// in a module drops the module too.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UncoveredWorkMap {
    /// Source revision the reports were produced from, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_commit: Option<String>,
    /// When this map was generated.
    pub generated_at_utc: DateTime<Utc>,
    /// Modules with at least one under-tested method.
    pub modules: Vec<ModuleTarget>,
}

impl UncoveredWorkMap {
    /// Build an empty map stamped with the given generation time.
    #[must_use]
    pub fn new(generated_at_utc: DateTime<Utc>) -> Self {
        Self {
            source_commit: None,
            generated_at_utc,
            modules: Vec::new(),
        }
    }

    /// Total number of method targets across all modules.
    #[must_use]
    pub fn total_methods(&self) -> usize {
        self.modules.iter().map(|m| m.methods.len()).sum()
    }

    /// True when no targets remain.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Iterate over every method target in module order.
    pub fn methods(&self) -> impl Iterator<Item = &MethodTarget> {
        self.modules.iter().flat_map(|m| m.methods.iter())
    }

    /// Remove the first method with the given id, dropping its module if
    /// that leaves the module empty. Returns the removed target.
    pub fn remove_method(&mut self, method_id: &str) -> Option<MethodTarget> {
        for module in &mut self.modules {
            if let Some(pos) = module.methods.iter().position(|m| m.method_id == method_id) {
                let removed = module.methods.remove(pos);
                self.modules.retain(|m| !m.methods.is_empty());
                return Some(removed);
            }
        }
        None
    }
}

/// One compiled unit with under-tested methods.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleTarget {
    /// Assembly or module name.
    pub assembly_name: String,
    /// Path to the compiled unit; equals the name when the report format
    /// carries no separate path.
    pub assembly_path: String,
    /// Methods with at least one uncovered point.
    pub methods: Vec<MethodTarget>,
}

/// One method with at least one uncovered region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodTarget {
    /// Stable content hash, see [`method_id`].
    pub method_id: MethodId,
    /// Fully-qualified name of the containing type.
    pub type_full_name: String,
    /// Name plus signature as reported by the coverage tool.
    pub method_display_name: String,
    /// Source files this method's uncovered points live in.
    pub source_files: Vec<String>,
    /// Line-level uncovered regions.
    pub uncovered_sequence_points: Vec<SequencePoint>,
    /// Branch-level uncovered regions.
    pub uncovered_branch_points: Vec<BranchPoint>,
}

impl MethodTarget {
    /// True when the method carries no uncovered points. Such methods are
    /// dropped by the normalizer and only appear in generate-all mode.
    #[must_use]
    pub fn has_no_points(&self) -> bool {
        self.uncovered_sequence_points.is_empty() && self.uncovered_branch_points.is_empty()
    }

    /// Bare method name from the display name, e.g.
    /// `"Calculator.Evaluate(System.String)"` yields `"Evaluate"`.
    #[must_use]
    pub fn method_short_name(&self) -> &str {
        let no_params = self
            .method_display_name
            .split('(')
            .next()
            .unwrap_or(&self.method_display_name);
        no_params.rsplit('.').next().unwrap_or(no_params)
    }

    /// Last segment of the containing type's full name.
    #[must_use]
    pub fn type_short_name(&self) -> &str {
        self.type_full_name.rsplit('.').next().unwrap_or(&self.type_full_name)
    }
}

/// A line-level uncovered region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SequencePoint {
    /// Source file path.
    pub file: String,
    /// First uncovered line.
    pub start_line: u32,
    /// Last uncovered line.
    pub end_line: u32,
    /// Start column, when the report provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_col: Option<u32>,
    /// End column, when the report provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_col: Option<u32>,
}

/// A branch-level uncovered region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchPoint {
    /// Source file path.
    pub file: String,
    /// Line the branch instruction sits on.
    pub line: u32,
    /// Zero-based position among sibling branch paths at that line.
    pub path_ordinal: u32,
    /// Byte offset of the branch instruction, when reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<u32>,
}

/// Outcome of the verification gate for one emitted batch of tests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationResult {
    /// Whether the emitted tests are kept.
    pub accepted: bool,
    /// Coverage change attributable to the new tests.
    pub coverage_delta: CoverageDelta,
    /// Whether the verification run exited successfully.
    pub tests_passed: bool,
    /// Human-readable reason when `accepted` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
    /// True when determinism was checked and held, or when the check was
    /// skipped (assumed, not proven).
    pub is_deterministic: bool,
}

/// Percentage-point coverage change plus newly-hit probe identifiers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CoverageDelta {
    /// Line coverage change in percentage points.
    pub line_delta: f64,
    /// Branch coverage change in percentage points.
    pub branch_delta: f64,
    /// Probe ids (`file:line`) covered now but not in the baseline.
    pub new_probes_hit: Vec<String>,
}

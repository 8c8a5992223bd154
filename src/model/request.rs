//! Generation request contract.

use serde::{Deserialize, Serialize};

use super::MethodTarget;

/// Everything a generation backend needs to propose tests for one method.
///
/// Field names are the integration contract with backends and downstream
/// consumers; they must not change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    /// Unique id for this request, echoed back in the response.
    pub request_id: String,
    /// The method being targeted.
    pub target_method: MethodTarget,
    /// Full signature text of the target method.
    pub method_signature: String,
    /// Source of the containing type, for construction context.
    pub containing_type_source: String,
    /// Source of the target method body.
    pub method_source: String,
    /// Branch conditions worth exercising.
    pub branch_hints: Vec<BranchHint>,
    /// How to construct the target and its dependencies.
    pub harness_plan: HarnessPlan,
    /// Limits the backend must respect.
    pub constraints: GenerationConstraints,
}

/// One branch condition in the target method.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchHint {
    /// Branch construct kind, e.g. `if`, `switch`, `loop`, `ternary`.
    pub kind: String,
    /// Operand expressions participating in the condition.
    pub operands: Vec<String>,
    /// Input mutations likely to flip the branch.
    pub suggested_mutations: Vec<String>,
}

/// Plan for constructing the target type inside a test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HarnessPlan {
    /// Construction strategy, e.g. `default-ctor`, `factory`,
    /// `mock-dependencies`.
    pub construct_strategy: String,
    /// Signature of the constructor or factory to call, when one is needed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ctor_or_factory_signature: Option<String>,
    /// Per-dependency construction plans.
    #[serde(default)]
    pub dependencies: Vec<DependencyPlan>,
}

impl Default for HarnessPlan {
    fn default() -> Self {
        Self {
            construct_strategy: "default-ctor".to_string(),
            ctor_or_factory_signature: None,
            dependencies: Vec::new(),
        }
    }
}

/// How to satisfy one constructor or method dependency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyPlan {
    /// Parameter name in the constructor or factory.
    pub parameter_name: String,
    /// Dependency type name.
    pub type_name: String,
    /// Strategy for supplying it, e.g. `mock`, `real`, `stub`.
    pub strategy: String,
    /// Free-text guidance for the backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Limits every backend must respect when proposing tests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConstraints {
    /// Upper bound on proposed test cases.
    pub max_test_cases: u32,
    /// Soft time budget for generation, when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_budget_ms: Option<u64>,
    /// Proposed tests must not perform file or network I/O.
    #[serde(rename = "forbidIO")]
    pub forbid_io: bool,
    /// Proposed tests must be deterministic.
    pub deterministic_only: bool,
    /// Test frameworks the emitter can render, e.g. `xunit`.
    pub allowed_frameworks: Vec<String>,
}

impl Default for GenerationConstraints {
    fn default() -> Self {
        Self {
            max_test_cases: 50,
            time_budget_ms: None,
            forbid_io: false,
            deterministic_only: true,
            allowed_frameworks: vec!["xunit".to_string()],
        }
    }
}

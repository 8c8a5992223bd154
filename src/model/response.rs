//! Generation response contract.

use serde::{Deserialize, Serialize};

use crate::model::MethodId;

/// What a generation backend returns for one request.
///
/// An empty `proposed_tests` list is a valid response, not an error; the
/// `notes` carry any diagnostics about why generation came up short.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationResponse {
    /// Echo of the request id this responds to.
    pub request_id: String,
    /// Structured test proposals parsed from the backend's output.
    pub proposed_tests: Vec<TestCaseSpec>,
    /// Free-text diagnostics (parse fallbacks, transport failures).
    #[serde(default)]
    pub notes: Vec<String>,
}

impl GenerationResponse {
    /// A response with no proposals and one explanatory note.
    #[must_use]
    pub fn empty_with_note(request_id: impl Into<String>, note: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            proposed_tests: Vec::new(),
            notes: vec![note.into()],
        }
    }
}

/// One proposed test case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCaseSpec {
    /// Identifier-safe test name.
    pub name: String,
    /// Id of the method this test targets.
    pub target_method_id: MethodId,
    /// Ordered arrange/act/assert steps.
    pub steps: Vec<TestStep>,
}

/// One step of a proposed test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestStep {
    /// Step kind.
    pub kind: StepKind,
    /// Free-text content of the step.
    pub text: String,
}

/// The three phases a test step can belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepKind {
    /// Set up inputs and the object under test.
    Arrange,
    /// Invoke the target method.
    Act,
    /// Check the outcome.
    Assert,
}

impl StepKind {
    /// Label used in prompts and emitted comments.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Arrange => "Arrange",
            Self::Act => "Act",
            Self::Assert => "Assert",
        }
    }
}

//! Offline deterministic backend for tests and dry runs.

use crate::model::{GenerationRequest, GenerationResponse, StepKind, TestCaseSpec, TestStep};

use super::parse::sanitize_test_name;
use super::{GenerateFuture, TestGenerator};

/// Fabricates a small test suite without touching the network: one
/// happy-path test plus one test per branch hint, capped by the
/// request's `max_test_cases`.
///
/// Output depends only on the request, so repeated runs propose the
/// same tests.
#[derive(Debug, Default)]
pub struct MockGenerator;

impl MockGenerator {
    /// Creates the mock backend.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl TestGenerator for MockGenerator {
    fn generate(&self, request: &GenerationRequest) -> GenerateFuture<'_> {
        let response = fabricate(request);
        Box::pin(async move { Ok(response) })
    }
}

fn fabricate(request: &GenerationRequest) -> GenerationResponse {
    let cap = request.constraints.max_test_cases as usize;
    let method = request.target_method.method_short_name().to_string();
    let display = &request.target_method.method_display_name;
    let mut tests = Vec::new();

    if cap > 0 {
        tests.push(TestCaseSpec {
            name: sanitize_test_name(&format!("{method}_HappyPath_Succeeds")),
            target_method_id: request.target_method.method_id.clone(),
            steps: vec![
                step(
                    StepKind::Arrange,
                    format!(
                        "Construct {} via {}",
                        request.target_method.type_full_name,
                        request.harness_plan.construct_strategy
                    ),
                ),
                step(StepKind::Act, format!("Call {display} with representative valid inputs")),
                step(StepKind::Assert, "Completes without throwing".to_string()),
            ],
        });
    }

    for (index, hint) in request.branch_hints.iter().enumerate() {
        if tests.len() >= cap {
            break;
        }
        let arrange = hint
            .suggested_mutations
            .first()
            .cloned()
            .unwrap_or_else(|| format!("Pick inputs that reach the {} branch", hint.kind));
        tests.push(TestCaseSpec {
            name: sanitize_test_name(&format!("{method}_Branch{}_{}", index + 1, hint.kind)),
            target_method_id: request.target_method.method_id.clone(),
            steps: vec![
                step(StepKind::Arrange, arrange),
                step(StepKind::Act, format!("Call {display}")),
                step(StepKind::Assert, format!("Covers the {} branch", hint.kind)),
            ],
        });
    }

    let note = format!("mock backend generated {} test specifications", tests.len());
    GenerationResponse {
        request_id: request.request_id.clone(),
        proposed_tests: tests,
        notes: vec![note],
    }
}

fn step(kind: StepKind, text: String) -> TestStep {
    TestStep { kind, text }
}

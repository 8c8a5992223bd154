//! Prompt construction shared by the networked backends.

use std::fmt::Write as _;

use crate::model::GenerationRequest;

use super::options::GenerationOptions;

/// Renders the natural-language prompt for one generation request.
///
/// Every networked backend sends the same prompt so that swapping
/// backends never changes what is asked for, only who answers. The
/// closing section spells out the exact `TEST:`/`ARRANGE:`/`ACT:`/
/// `ASSERT:` grammar that [`parse`](super::parse) understands.
#[must_use]
pub fn build_prompt(request: &GenerationRequest, options: &GenerationOptions) -> String {
    let mut prompt = String::new();

    prompt.push_str(
        "You are an expert C# test engineer. Generate comprehensive unit tests for the following method.\n\n",
    );

    let _ = writeln!(prompt, "Method Signature:\n{}\n", request.method_signature);

    if !request.containing_type_source.is_empty() {
        let _ = writeln!(prompt, "Containing Type:\n{}\n", request.containing_type_source);
    }

    let _ = writeln!(prompt, "Method Source Code:\n{}\n", request.method_source);

    if !request.branch_hints.is_empty() {
        prompt.push_str("Branch Points to Cover:\n");
        for hint in &request.branch_hints {
            let _ = writeln!(
                prompt,
                "- {} on {}: try {}",
                hint.kind,
                hint.operands.join(", "),
                hint.suggested_mutations.join(", ")
            );
        }
        prompt.push('\n');
    }

    prompt.push_str("Requirements:\n");
    let _ = writeln!(prompt, "- Test Framework: {}", options.test_framework);
    let _ = writeln!(prompt, "- Mocking Framework: {}", options.mocking);
    let _ = writeln!(prompt, "- Propose at most {} tests", request.constraints.max_test_cases);
    if request.constraints.deterministic_only {
        prompt.push_str("- Tests must be deterministic (no randomness, no clocks)\n");
    }
    if request.constraints.forbid_io {
        prompt.push_str("- Tests must not perform file or network I/O\n");
    }
    prompt.push_str("- Generate tests that cover ALL branches\n");
    prompt.push_str("- Include edge cases (null, empty, invalid inputs)\n");
    prompt.push_str("- Include happy path tests\n\n");

    prompt.push_str("Generate test specifications in this format for EACH test:\n");
    prompt.push_str("TEST: [descriptive name]\n");
    prompt.push_str("ARRANGE: [setup code]\n");
    prompt.push_str("ACT: [method call]\n");
    prompt.push_str("ASSERT: [expected behavior]\n");
    prompt.push_str("---\n\n");
    prompt.push_str("Generate the tests now:\n");

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BranchHint, GenerationConstraints, HarnessPlan, MethodTarget};

    fn request_with_hints(hints: Vec<BranchHint>) -> GenerationRequest {
        GenerationRequest {
            request_id: "req-1".to_string(),
            target_method: MethodTarget {
                method_id: "ab".repeat(32),
                type_full_name: "Demo.Calculator".to_string(),
                method_display_name: "Calculator.Evaluate".to_string(),
                source_files: vec!["src/Calculator.cs".to_string()],
                uncovered_sequence_points: Vec::new(),
                uncovered_branch_points: Vec::new(),
            },
            method_signature: "public double Evaluate(string expressionText)".to_string(),
            containing_type_source: "public class Calculator { }".to_string(),
            method_source: "if (expressionText == null) throw new ArgumentException();".to_string(),
            branch_hints: hints,
            harness_plan: HarnessPlan::default(),
            constraints: GenerationConstraints::default(),
        }
    }

    #[test]
    fn prompt_embeds_signature_sources_and_grammar() {
        let prompt = build_prompt(&request_with_hints(Vec::new()), &GenerationOptions::default());

        assert!(prompt.starts_with("You are an expert C# test engineer."));
        assert!(prompt.contains("public double Evaluate(string expressionText)"));
        assert!(prompt.contains("public class Calculator { }"));
        assert!(prompt.contains("throw new ArgumentException();"));
        assert!(prompt.contains("Test Framework: xunit"));
        assert!(prompt.contains("Mocking Framework: Moq"));
        assert!(prompt.contains("TEST: [descriptive name]"));
        assert!(prompt.contains("ASSERT: [expected behavior]"));
        assert!(prompt.contains("---"));
        assert!(!prompt.contains("Branch Points to Cover"));
    }

    #[test]
    fn hints_render_as_bullet_lines() {
        let hints = vec![BranchHint {
            kind: "if".to_string(),
            operands: vec!["expressionText".to_string(), "null".to_string()],
            suggested_mutations: vec![
                "make expressionText == null true".to_string(),
                "make expressionText == null false".to_string(),
            ],
        }];
        let prompt = build_prompt(&request_with_hints(hints), &GenerationOptions::default());

        assert!(prompt.contains(
            "- if on expressionText, null: try make expressionText == null true, make expressionText == null false"
        ));
    }

    #[test]
    fn constraints_shape_the_requirements_section() {
        let mut request = request_with_hints(Vec::new());
        request.constraints.max_test_cases = 7;
        request.constraints.forbid_io = true;
        request.constraints.deterministic_only = false;
        let prompt = build_prompt(&request, &GenerationOptions::default());

        assert!(prompt.contains("- Propose at most 7 tests"));
        assert!(prompt.contains("- Tests must not perform file or network I/O"));
        assert!(!prompt.contains("Tests must be deterministic"));
    }
}

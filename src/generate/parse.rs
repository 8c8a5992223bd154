//! Free-text parsing of backend output into test case specs.
//!
//! Backends answer in a fixed line grammar: `TEST:` opens a block and
//! carries the name, `ARRANGE:`/`ACT:`/`ASSERT:` carry the step text,
//! and a line of dashes separates blocks. Everything else is tolerated
//! and ignored, so chatty models still parse. Zero parseable blocks is
//! a valid zero-test result, never an error.

use crate::model::{StepKind, TestCaseSpec, TestStep};

/// One block being accumulated by the line scanner.
#[derive(Default)]
struct Block {
    raw_name: Option<String>,
    arrange: String,
    act: String,
    assert: String,
    labeled: bool,
}

impl Block {
    fn is_empty(&self) -> bool {
        !self.labeled
    }
}

/// Parses backend free text into at most `max_test_cases` specs.
///
/// Labels are matched case-insensitively at line start; a label's
/// same-line remainder becomes that section's text and a repeated label
/// overwrites. A block containing no labeled line at all yields no test.
#[must_use]
pub fn parse_test_specifications(
    text: &str,
    target_method_id: &str,
    max_test_cases: u32,
) -> Vec<TestCaseSpec> {
    let mut tests = Vec::new();
    let mut block = Block::default();

    for line in text.lines() {
        let trimmed = line.trim();

        if is_separator(trimmed) {
            close_block(&mut tests, std::mem::take(&mut block), target_method_id, max_test_cases);
            continue;
        }
        if let Some(rest) = strip_label(trimmed, "TEST:") {
            close_block(&mut tests, std::mem::take(&mut block), target_method_id, max_test_cases);
            block.raw_name = Some(rest.trim().to_string());
            block.labeled = true;
        } else if let Some(rest) = strip_label(trimmed, "ARRANGE:") {
            block.arrange = rest.trim().to_string();
            block.labeled = true;
        } else if let Some(rest) = strip_label(trimmed, "ACT:") {
            block.act = rest.trim().to_string();
            block.labeled = true;
        } else if let Some(rest) = strip_label(trimmed, "ASSERT:") {
            block.assert = rest.trim().to_string();
            block.labeled = true;
        }
    }
    close_block(&mut tests, block, target_method_id, max_test_cases);

    tests
}

/// Drops every character outside `[A-Za-z0-9_]` and keeps the result a
/// valid identifier.
///
/// An emptied name falls back to `GeneratedTest`; a leading digit gets a
/// `T` prefix.
#[must_use]
pub fn sanitize_test_name(raw: &str) -> String {
    let mut name: String =
        raw.chars().filter(|c| c.is_ascii_alphanumeric() || *c == '_').collect();
    if name.is_empty() {
        return "GeneratedTest".to_string();
    }
    if name.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        name.insert(0, 'T');
    }
    name
}

/// A block separator is a line of three or more dashes.
fn is_separator(trimmed: &str) -> bool {
    trimmed.len() >= 3 && trimmed.chars().all(|c| c == '-')
}

/// Case-insensitive label match at line start, returning the remainder.
fn strip_label<'a>(line: &'a str, label: &str) -> Option<&'a str> {
    let head = line.get(..label.len())?;
    head.eq_ignore_ascii_case(label).then(|| &line[label.len()..])
}

fn close_block(
    tests: &mut Vec<TestCaseSpec>,
    block: Block,
    target_method_id: &str,
    max_test_cases: u32,
) {
    if block.is_empty() || tests.len() >= max_test_cases as usize {
        return;
    }

    let name = match block.raw_name {
        Some(raw) => sanitize_test_name(&raw),
        None => format!("GeneratedTest_{}", tests.len() + 1),
    };

    tests.push(TestCaseSpec {
        name,
        target_method_id: target_method_id.to_string(),
        steps: vec![
            TestStep { kind: StepKind::Arrange, text: block.arrange },
            TestStep { kind: StepKind::Act, text: block.act },
            TestStep { kind: StepKind::Assert, text: block.assert },
        ],
    });
}

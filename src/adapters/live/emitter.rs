//! Live emitter rendering test specs into C# test files.

use std::collections::HashSet;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::model::{GenerationResponse, MethodTarget, TestCaseSpec};
use crate::ports::emitter::TestFileEmitter;

/// Live emitter that writes one test class file per addressed method.
///
/// Bodies are rendered as step comments so the file compiles regardless of
/// what the backend proposed; a human or a later pass fills in the code.
pub struct LiveTestEmitter {
    framework: String,
    mocking: String,
    used_names: Mutex<HashSet<String>>,
}

impl LiveTestEmitter {
    /// Creates an emitter for the given test and mocking frameworks
    /// (`xunit`/`nunit`/`mstest`, `Moq`/`NSubstitute`/`None`).
    #[must_use]
    pub fn new(framework: impl Into<String>, mocking: impl Into<String>) -> Self {
        Self {
            framework: framework.into(),
            mocking: mocking.into(),
            used_names: Mutex::new(HashSet::new()),
        }
    }

    /// Reserves a class name unique for this emitter's lifetime. Overloads
    /// share a short method name, so repeats get a numeric suffix.
    fn claim_class_name(&self, base: &str) -> String {
        if let Ok(mut used) = self.used_names.lock() {
            let mut candidate = base.to_string();
            let mut n = 2;
            while !used.insert(candidate.clone()) {
                candidate = format!("{base}{n}");
                n += 1;
            }
            return candidate;
        }
        base.to_string()
    }

    fn render_class(&self, class_name: &str, tests: &[TestCaseSpec]) -> String {
        let mut out = String::new();
        out.push_str("// AUTO-GENERATED - do not hand-edit\n");
        out.push_str("using System;\n");
        match self.framework.as_str() {
            "nunit" => out.push_str("using NUnit.Framework;\n"),
            "mstest" => out.push_str("using Microsoft.VisualStudio.TestTools.UnitTesting;\n"),
            _ => out.push_str("using Xunit;\n"),
        }
        match self.mocking.as_str() {
            "Moq" => out.push_str("using Moq;\n"),
            "NSubstitute" => out.push_str("using NSubstitute;\n"),
            _ => {}
        }
        out.push('\n');
        out.push_str("namespace Generated.Tests\n{\n");
        let _ = writeln!(out, "    public class {class_name}");
        out.push_str("    {\n");

        let attribute = match self.framework.as_str() {
            "nunit" => "[Test]",
            "mstest" => "[TestMethod]",
            _ => "[Fact]",
        };
        for test in tests {
            let method_name = sanitize_identifier(&test.name, "Test");
            let _ = writeln!(out, "        {attribute}");
            let _ = writeln!(out, "        public void {method_name}()");
            out.push_str("        {\n");
            for step in &test.steps {
                let _ = writeln!(out, "            // {}: {}", step.kind.label(), step.text);
            }
            out.push_str("        }\n\n");
        }

        out.push_str("    }\n}\n");
        out
    }
}

impl TestFileEmitter for LiveTestEmitter {
    fn emit(
        &self,
        response: &GenerationResponse,
        target: &MethodTarget,
        output_dir: &Path,
    ) -> Result<Vec<PathBuf>, Box<dyn std::error::Error + Send + Sync>> {
        if response.proposed_tests.is_empty() {
            return Ok(Vec::new());
        }
        std::fs::create_dir_all(output_dir)?;

        let class_name = self.claim_class_name(&format!("{}Tests", class_basis(target)));
        let path = output_dir.join(format!("{class_name}.cs"));
        std::fs::write(&path, self.render_class(&class_name, &response.proposed_tests))?;
        Ok(vec![path])
    }
}

/// Derives `Type_Method` from the target, identifier-safe. Distinct
/// methods of one type get distinct files so iterations never clobber
/// each other's output.
fn class_basis(target: &MethodTarget) -> String {
    format!(
        "{}_{}",
        sanitize_identifier(target.type_short_name(), "Unknown"),
        sanitize_identifier(target.method_short_name(), "Method")
    )
}

fn sanitize_identifier(name: &str, fallback: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect();
    if cleaned.is_empty() {
        return fallback.to_string();
    }
    cleaned
}

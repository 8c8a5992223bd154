//! Live source resolver: heuristic scanning of C# source trees.
//!
//! Walks `.cs` files under the solution root, locates type and method
//! declarations by line shape, and extracts the context a generation
//! backend needs. Line heuristics, not a real parser; methods the scan
//! misses surface as iteration-scoped resolution errors.

use std::path::{Path, PathBuf};

use crate::model::{
    method_id, BranchHint, DependencyPlan, GenerationConstraints, GenerationRequest, HarnessPlan,
    MethodTarget,
};
use crate::ports::source::SourceResolver;

/// Directories never worth scanning for target methods.
const SKIP_DIRS: [&str; 4] = ["bin", "obj", "Generated", ".git"];

/// Live resolver rooted at the target solution's directory.
pub struct LiveSourceResolver {
    root: PathBuf,
}

impl LiveSourceResolver {
    /// Creates a resolver scanning the tree under `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn source_files(&self) -> Result<Vec<PathBuf>, Box<dyn std::error::Error + Send + Sync>> {
        let mut files = Vec::new();
        if self.root.is_dir() {
            collect_cs_files(&self.root, &mut files)?;
        }
        files.sort();
        Ok(files)
    }

    /// Finds the class scan matching `type_full_name`'s final segment in
    /// the given candidate files, falling back to the whole tree.
    fn find_class(
        &self,
        type_full_name: &str,
        candidates: &[String],
    ) -> Result<(PathBuf, FileScan, usize), Box<dyn std::error::Error + Send + Sync>> {
        let class_name = type_full_name.rsplit('.').next().unwrap_or(type_full_name);

        let mut paths: Vec<PathBuf> = candidates.iter().map(PathBuf::from).collect();
        paths.extend(self.source_files()?);

        for path in paths {
            let Ok(content) = std::fs::read_to_string(&path) else {
                continue;
            };
            let scan = scan_file(&content);
            if let Some(idx) = scan.classes.iter().position(|c| c.name == class_name) {
                return Ok((path, scan, idx));
            }
        }
        Err(format!("type {type_full_name} not found under {}", self.root.display()).into())
    }
}

impl SourceResolver for LiveSourceResolver {
    fn collect_context(
        &self,
        target: &MethodTarget,
        request_id: &str,
        constraints: GenerationConstraints,
    ) -> Result<GenerationRequest, Box<dyn std::error::Error + Send + Sync>> {
        let method_name = target.method_short_name().trim();

        let (_, scan, class_idx) = self.find_class(&target.type_full_name, &target.source_files)?;
        let class = &scan.classes[class_idx];
        let method = class
            .methods
            .iter()
            .find(|m| m.name == method_name)
            .ok_or_else(|| {
                format!(
                    "method {} not found in type {}",
                    target.method_display_name, target.type_full_name
                )
            })?;

        Ok(GenerationRequest {
            request_id: request_id.to_string(),
            target_method: target.clone(),
            method_signature: method.signature.clone(),
            containing_type_source: class.source.clone(),
            method_source: method.source.clone(),
            branch_hints: extract_branch_hints(&method.source),
            harness_plan: build_harness_plan(class),
            constraints,
        })
    }

    fn find_all_methods(
        &self,
        filter: Option<&str>,
    ) -> Result<Vec<MethodTarget>, Box<dyn std::error::Error + Send + Sync>> {
        let needle = filter.map(str::to_lowercase);
        let mut targets = Vec::new();

        for path in self.source_files()? {
            let Ok(content) = std::fs::read_to_string(&path) else {
                continue;
            };
            let scan = scan_file(&content);
            let file = path.to_string_lossy().into_owned();

            for class in &scan.classes {
                let type_full_name = if scan.namespace.is_empty() {
                    class.name.clone()
                } else {
                    format!("{}.{}", scan.namespace, class.name)
                };
                if let Some(needle) = &needle {
                    let matches = type_full_name.to_lowercase().contains(needle)
                        || file.to_lowercase().contains(needle);
                    if !matches {
                        continue;
                    }
                }
                let assembly = type_full_name
                    .split('.')
                    .next()
                    .unwrap_or(&type_full_name)
                    .to_string();

                for method in &class.methods {
                    targets.push(MethodTarget {
                        method_id: method_id(&assembly, &type_full_name, &method.signature),
                        type_full_name: type_full_name.clone(),
                        method_display_name: format!("{}.{}", class.name, method.name),
                        source_files: vec![file.clone()],
                        uncovered_sequence_points: Vec::new(),
                        uncovered_branch_points: Vec::new(),
                    });
                }
            }
        }
        Ok(targets)
    }
}

fn collect_cs_files(
    dir: &Path,
    files: &mut Vec<PathBuf>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if path.is_dir() {
            if !SKIP_DIRS.contains(&name.as_ref()) {
                collect_cs_files(&path, files)?;
            }
        } else if name.ends_with(".cs") {
            files.push(path);
        }
    }
    Ok(())
}

/// One scanned source file.
struct FileScan {
    namespace: String,
    classes: Vec<ClassScan>,
}

/// One scanned class declaration with its body text.
struct ClassScan {
    name: String,
    source: String,
    methods: Vec<MethodScan>,
    ctor_params: Option<String>,
    ctor_signature: Option<String>,
}

/// One scanned method declaration with its body text.
struct MethodScan {
    name: String,
    signature: String,
    source: String,
}

fn scan_file(content: &str) -> FileScan {
    let lines: Vec<&str> = content.lines().collect();
    let mut namespace = String::new();
    let mut classes = Vec::new();

    let mut i = 0;
    while i < lines.len() {
        let trimmed = lines[i].trim();
        if let Some(rest) = trimmed.strip_prefix("namespace ") {
            namespace = rest
                .trim_end_matches(';')
                .trim_end_matches('{')
                .trim()
                .to_string();
        } else if let Some(name) = class_name(trimmed) {
            let end = block_end(&lines, i);
            let body = lines[i..=end.min(lines.len() - 1)].join("\n");
            classes.push(scan_class(name, &lines, i, end, body));
            i = end;
        }
        i += 1;
    }

    FileScan { namespace, classes }
}

fn scan_class(name: String, lines: &[&str], start: usize, end: usize, source: String) -> ClassScan {
    let mut methods = Vec::new();
    let mut ctor_params = None;
    let mut ctor_signature = None;

    let mut i = start + 1;
    while i <= end && i < lines.len() {
        let trimmed = lines[i].trim();
        if let Some((method_name, params)) = method_decl(trimmed) {
            let body_end = block_end(lines, i);
            let source = lines[i..=body_end.min(lines.len() - 1)].join("\n");
            if method_name == name {
                // Constructor; feeds the harness plan, not the target list.
                ctor_params = Some(params.clone());
                ctor_signature = Some(trimmed.to_string());
            } else {
                methods.push(MethodScan {
                    signature: format!("{method_name}({params})"),
                    name: method_name,
                    source,
                });
            }
            i = body_end;
        }
        i += 1;
    }

    ClassScan {
        name,
        source,
        methods,
        ctor_params,
        ctor_signature,
    }
}

/// Extracts the class name from a declaration line, if it is one.
fn class_name(trimmed: &str) -> Option<String> {
    let tokens: Vec<&str> = trimmed.split_whitespace().collect();
    let pos = tokens.iter().position(|t| *t == "class")?;
    // Reject lines where "class" appears inside a comment or string.
    if trimmed.starts_with("//") || pos > 4 {
        return None;
    }
    let raw = tokens.get(pos + 1)?;
    let name: String = raw
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect();
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

/// Splits a method declaration line into name and parameter text.
fn method_decl(trimmed: &str) -> Option<(String, String)> {
    const VISIBILITY: [&str; 4] = ["public ", "private ", "protected ", "internal "];
    if !VISIBILITY.iter().any(|v| trimmed.starts_with(v)) {
        return None;
    }
    if trimmed.contains(" class ") || trimmed.contains("{ get;") || trimmed.contains("get =>") {
        return None;
    }
    let open = trimmed.find('(')?;
    let close = trimmed[open..].find(')')? + open;
    // Field initializers like `public int X = f(1);` are not declarations.
    if trimmed[..open].contains('=') {
        return None;
    }
    // Plain declarations without a body end with `;` (abstract, extern).
    if trimmed.ends_with(';') && !trimmed.contains("=>") {
        return None;
    }
    let name = trimmed[..open].split_whitespace().last()?.to_string();
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return None;
    }
    Some((name, trimmed[open + 1..close].trim().to_string()))
}

/// Finds the line index where the brace block opened at `start` closes.
/// Expression-bodied declarations collapse to their own line.
fn block_end(lines: &[&str], start: usize) -> usize {
    let mut depth = 0_i32;
    let mut seen_open = false;
    for (offset, line) in lines[start..].iter().enumerate() {
        if !seen_open && line.contains("=>") && line.trim_end().ends_with(';') {
            return start + offset;
        }
        for c in line.chars() {
            match c {
                '{' => {
                    depth += 1;
                    seen_open = true;
                }
                '}' => depth -= 1,
                _ => {}
            }
        }
        if seen_open && depth <= 0 {
            return start + offset;
        }
    }
    lines.len().saturating_sub(1)
}

/// Scans a method body for branch constructs worth exercising.
fn extract_branch_hints(method_source: &str) -> Vec<BranchHint> {
    let mut hints = Vec::new();
    for line in method_source.lines() {
        let trimmed = line.trim();
        let trimmed = trimmed.strip_prefix("else ").unwrap_or(trimmed);
        if let Some(cond) = condition_text(trimmed, "if") {
            hints.push(branch_hint("if", &cond));
        } else if trimmed.starts_with("switch") {
            let arms: Vec<String> = method_source
                .lines()
                .filter_map(|l| l.trim().strip_prefix("case "))
                .map(|arm| format!("hit case {}", arm.trim_end_matches(':')))
                .collect();
            hints.push(BranchHint {
                kind: "switch".to_string(),
                operands: condition_text(trimmed, "switch").map(|c| vec![c]).unwrap_or_default(),
                suggested_mutations: arms,
            });
        } else if ["while", "for", "foreach"]
            .iter()
            .any(|kw| condition_text(trimmed, kw).is_some())
        {
            hints.push(BranchHint {
                kind: "loop".to_string(),
                operands: Vec::new(),
                suggested_mutations: vec![
                    "zero iterations".to_string(),
                    "at least one iteration".to_string(),
                ],
            });
        } else if trimmed.contains(" ? ") && trimmed.contains(" : ") {
            let cond = trimmed.split(" ? ").next().unwrap_or("").trim();
            let cond = cond.strip_prefix("return ").unwrap_or(cond);
            hints.push(branch_hint("ternary", cond.trim_end_matches(';')));
        }
    }
    hints
}

fn branch_hint(kind: &str, condition: &str) -> BranchHint {
    let operands: Vec<String> = condition
        .split("&&")
        .flat_map(|part| part.split("||"))
        .map(|op| op.trim().trim_matches(|c| c == '(' || c == ')').to_string())
        .filter(|op| !op.is_empty())
        .collect();
    BranchHint {
        kind: kind.to_string(),
        operands,
        suggested_mutations: vec![
            format!("make `{condition}` true"),
            format!("make `{condition}` false"),
        ],
    }
}

/// Extracts the parenthesized condition following a keyword, if present.
fn condition_text(trimmed: &str, keyword: &str) -> Option<String> {
    let rest = trimmed.strip_prefix(keyword)?.trim_start();
    let inner = rest.strip_prefix('(')?;
    let mut depth = 1_i32;
    let mut out = String::new();
    for c in inner.chars() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(out);
                }
            }
            _ => {}
        }
        out.push(c);
    }
    None
}

fn build_harness_plan(class: &ClassScan) -> HarnessPlan {
    match class.ctor_params.as_deref() {
        None | Some("") => HarnessPlan::default(),
        Some(params) => HarnessPlan {
            construct_strategy: "mock-dependencies".to_string(),
            ctor_or_factory_signature: class.ctor_signature.clone(),
            dependencies: params
                .split(',')
                .filter_map(|param| {
                    let mut parts = param.split_whitespace().rev();
                    let name = parts.next()?;
                    let type_name = parts.next()?;
                    Some(DependencyPlan {
                        parameter_name: name.to_string(),
                        type_name: type_name.to_string(),
                        strategy: "mock".to_string(),
                        notes: None,
                    })
                })
                .collect(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CALCULATOR: &str = r"
namespace Acme.Math
{
    public class Calculator
    {
        private readonly ILogger _logger;

        public Calculator(ILogger logger)
        {
            _logger = logger;
        }

        public int Evaluate(string input)
        {
            if (input == null || input.Length == 0)
            {
                throw new ArgumentException();
            }
            var parts = input.Split(' ');
            foreach (var part in parts)
            {
                _logger.Log(part);
            }
            return parts.Length > 1 ? 1 : 0;
        }

        public string Describe() => $0;
    }
}
";

    fn write_tree() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/Calculator.cs"), CALCULATOR).unwrap();
        // Build output must never be scanned.
        std::fs::create_dir_all(dir.path().join("bin")).unwrap();
        std::fs::write(dir.path().join("bin/Skip.cs"), "public class Skip {}").unwrap();
        dir
    }

    #[test]
    fn scan_finds_class_methods_and_ctor() {
        let scan = scan_file(CALCULATOR);
        assert_eq!(scan.namespace, "Acme.Math");
        assert_eq!(scan.classes.len(), 1);

        let class = &scan.classes[0];
        assert_eq!(class.name, "Calculator");
        let names: Vec<&str> = class.methods.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["Evaluate", "Describe"]);
        assert_eq!(class.ctor_params.as_deref(), Some("ILogger logger"));
    }

    #[test]
    fn find_all_methods_excludes_build_output() {
        let dir = write_tree();
        let resolver = LiveSourceResolver::new(dir.path());

        let methods = resolver.find_all_methods(None).unwrap();
        assert_eq!(methods.len(), 2);
        assert!(methods.iter().all(|m| m.type_full_name == "Acme.Math.Calculator"));
        assert!(methods.iter().all(|m| m.has_no_points()));

        let filtered = resolver.find_all_methods(Some("nomatch")).unwrap();
        assert!(filtered.is_empty());
    }

    #[test]
    fn collect_context_builds_full_request() {
        let dir = write_tree();
        let resolver = LiveSourceResolver::new(dir.path());

        let target = MethodTarget {
            method_id: "abc".to_string(),
            type_full_name: "Acme.Math.Calculator".to_string(),
            method_display_name: "Acme.Math.Calculator.Evaluate".to_string(),
            source_files: Vec::new(),
            uncovered_sequence_points: Vec::new(),
            uncovered_branch_points: Vec::new(),
        };
        let request = resolver
            .collect_context(&target, "req-1", GenerationConstraints::default())
            .unwrap();

        assert_eq!(request.request_id, "req-1");
        assert_eq!(request.method_signature, "Evaluate(string input)");
        assert!(request.method_source.contains("input.Split"));
        assert!(request.containing_type_source.contains("class Calculator"));

        let kinds: Vec<&str> = request.branch_hints.iter().map(|h| h.kind.as_str()).collect();
        assert_eq!(kinds, vec!["if", "loop", "ternary"]);
        assert_eq!(
            request.branch_hints[0].operands,
            vec!["input == null".to_string(), "input.Length == 0".to_string()]
        );

        assert_eq!(request.harness_plan.construct_strategy, "mock-dependencies");
        assert_eq!(request.harness_plan.dependencies.len(), 1);
        assert_eq!(request.harness_plan.dependencies[0].type_name, "ILogger");
    }

    #[test]
    fn missing_method_is_an_error() {
        let dir = write_tree();
        let resolver = LiveSourceResolver::new(dir.path());

        let target = MethodTarget {
            method_id: "abc".to_string(),
            type_full_name: "Acme.Math.Calculator".to_string(),
            method_display_name: "Acme.Math.Calculator.DoesNotExist".to_string(),
            source_files: Vec::new(),
            uncovered_sequence_points: Vec::new(),
            uncovered_branch_points: Vec::new(),
        };
        assert!(resolver
            .collect_context(&target, "req-1", GenerationConstraints::default())
            .is_err());
    }
}

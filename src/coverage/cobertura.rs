//! Cobertura-style report extraction.

use crate::coverage::{attr, children, is_zero_coverage, normalize_path, num_attr};
use crate::model::{method_id, BranchPoint, MethodTarget, ModuleTarget, SequencePoint};

/// Parses one Cobertura document into module targets.
///
/// Packages map to modules (the format carries no assembly path, so the
/// name doubles as the path). A `line` with zero hits yields a sequence
/// point; each zero-coverage `condition` under a branch line yields a
/// branch point ordered by its position among siblings.
///
/// # Errors
///
/// Returns an error when the document is not well-formed XML.
pub fn parse(content: &str) -> Result<Vec<ModuleTarget>, Box<dyn std::error::Error + Send + Sync>> {
    let doc = roxmltree::Document::parse(content)?;
    let root = doc.root_element();
    if !root.has_tag_name("coverage") {
        return Ok(Vec::new());
    }

    let mut modules = Vec::new();
    for package in children(root, "packages").flat_map(|p| children(p, "package")) {
        let assembly_name = attr(package, "name");
        let mut methods = Vec::new();

        for class in children(package, "classes").flat_map(|c| children(c, "class")) {
            let class_name = attr(class, "name");
            let file = normalize_path(&attr(class, "filename"));

            for method in children(class, "methods").flat_map(|m| children(m, "method")) {
                let name = attr(method, "name");
                let signature = attr(method, "signature");

                let mut sequence_points = Vec::new();
                let mut branch_points = Vec::new();

                for line in children(method, "lines").flat_map(|l| children(l, "line")) {
                    let number = num_attr(line, "number");
                    if num_attr(line, "hits") == 0 {
                        sequence_points.push(SequencePoint {
                            file: file.clone(),
                            start_line: number,
                            end_line: number,
                            start_col: None,
                            end_col: None,
                        });
                    }

                    let is_branch = line
                        .attribute("branch")
                        .is_some_and(|v| v.eq_ignore_ascii_case("true"));
                    if !is_branch {
                        continue;
                    }
                    let conditions =
                        children(line, "conditions").flat_map(|c| children(c, "condition"));
                    for (ordinal, condition) in conditions.enumerate() {
                        if is_zero_coverage(condition.attribute("coverage").unwrap_or_default()) {
                            branch_points.push(BranchPoint {
                                file: file.clone(),
                                line: number,
                                path_ordinal: u32::try_from(ordinal).unwrap_or(u32::MAX),
                                offset: None,
                            });
                        }
                    }
                }

                if sequence_points.is_empty() && branch_points.is_empty() {
                    continue;
                }
                methods.push(MethodTarget {
                    method_id: method_id(&assembly_name, &class_name, &format!("{name}{signature}")),
                    type_full_name: class_name.clone(),
                    method_display_name: format!("{class_name}.{name}"),
                    source_files: vec![file.clone()],
                    uncovered_sequence_points: sequence_points,
                    uncovered_branch_points: branch_points,
                });
            }
        }

        if !methods.is_empty() {
            modules.push(ModuleTarget {
                assembly_path: assembly_name.clone(),
                assembly_name,
                methods,
            });
        }
    }
    Ok(modules)
}

//! OpenCover-style report extraction.

use std::collections::HashMap;

use crate::coverage::{attr, child_text, children, normalize_path, num_attr};
use crate::model::{method_id, BranchPoint, MethodTarget, ModuleTarget, SequencePoint};

/// Parses one OpenCover document into module targets.
///
/// Each module carries its own `Files` uid table; points whose `fileid`
/// does not resolve are dropped. Sequence and branch points with a zero
/// visit count (`vc`) are the uncovered regions.
///
/// # Errors
///
/// Returns an error when the document is not well-formed XML.
pub fn parse(content: &str) -> Result<Vec<ModuleTarget>, Box<dyn std::error::Error + Send + Sync>> {
    let doc = roxmltree::Document::parse(content)?;
    let root = doc.root_element();
    if !root.has_tag_name("CoverageSession") {
        return Ok(Vec::new());
    }

    let mut modules = Vec::new();
    for module in children(root, "Modules").flat_map(|m| children(m, "Module")) {
        let assembly_name = child_text(module, "ModuleName");
        let assembly_path = child_text(module, "ModulePath");

        let mut file_map: HashMap<String, String> = HashMap::new();
        for file in children(module, "Files").flat_map(|f| children(f, "File")) {
            let uid = attr(file, "uid");
            let full_path = attr(file, "fullPath");
            if !uid.is_empty() && !full_path.is_empty() {
                file_map.insert(uid, normalize_path(&full_path));
            }
        }

        let mut methods = Vec::new();
        for class in children(module, "Classes").flat_map(|c| children(c, "Class")) {
            let class_name = child_text(class, "FullName");

            for method in children(class, "Methods").flat_map(|m| children(m, "Method")) {
                let name = child_text(method, "Name");
                let signature = child_text(method, "Signature");

                let mut sequence_points = Vec::new();
                let mut branch_points = Vec::new();
                let mut source_files: Vec<String> = Vec::new();

                let seq_elements =
                    children(method, "SequencePoints").flat_map(|s| children(s, "SequencePoint"));
                for point in seq_elements {
                    if num_attr(point, "vc") != 0 {
                        continue;
                    }
                    let Some(file) = file_map.get(&attr(point, "fileid")) else {
                        continue;
                    };
                    let start_col = num_attr(point, "sc");
                    let end_col = num_attr(point, "ec");
                    sequence_points.push(SequencePoint {
                        file: file.clone(),
                        start_line: num_attr(point, "sl"),
                        end_line: num_attr(point, "el"),
                        start_col: (start_col > 0).then_some(start_col),
                        end_col: (end_col > 0).then_some(end_col),
                    });
                    if !source_files.contains(file) {
                        source_files.push(file.clone());
                    }
                }

                let branch_elements =
                    children(method, "BranchPoints").flat_map(|b| children(b, "BranchPoint"));
                for point in branch_elements {
                    if num_attr(point, "vc") != 0 {
                        continue;
                    }
                    let Some(file) = file_map.get(&attr(point, "fileid")) else {
                        continue;
                    };
                    let offset = num_attr(point, "offset");
                    branch_points.push(BranchPoint {
                        file: file.clone(),
                        line: num_attr(point, "sl"),
                        path_ordinal: num_attr(point, "path"),
                        offset: (offset > 0).then_some(offset),
                    });
                    if !source_files.contains(file) {
                        source_files.push(file.clone());
                    }
                }

                if sequence_points.is_empty() && branch_points.is_empty() {
                    continue;
                }
                methods.push(MethodTarget {
                    method_id: method_id(&assembly_name, &class_name, &format!("{name}{signature}")),
                    type_full_name: class_name.clone(),
                    method_display_name: format!("{class_name}.{name}"),
                    source_files,
                    uncovered_sequence_points: sequence_points,
                    uncovered_branch_points: branch_points,
                });
            }
        }

        if !methods.is_empty() {
            modules.push(ModuleTarget {
                assembly_name,
                assembly_path,
                methods,
            });
        }
    }
    Ok(modules)
}

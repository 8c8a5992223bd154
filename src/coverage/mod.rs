//! Coverage report normalization into the uncovered-work model.
//!
//! Two XML report formats are understood: Cobertura-style
//! (`line-rate`/`branch-rate` attributes, nested `packages/package`)
//! and OpenCover-style (`CoverageSession` root with a `Files` table and
//! per-point visit counts). Both normalize into the same
//! [`UncoveredWorkMap`], so everything downstream is format-agnostic.

pub mod cobertura;
pub mod opencover;
pub mod runner;
pub mod snapshot;

use std::path::Path;

use chrono::{DateTime, Utc};

use crate::model::{ModuleTarget, UncoveredWorkMap};
use crate::ports::filesystem::FileSystem;

/// Report format of one coverage XML file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoverageFormat {
    /// Cobertura-style XML.
    Cobertura,
    /// OpenCover-style XML.
    OpenCover,
}

impl CoverageFormat {
    /// Name used in coverlet output options and report file names.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cobertura => "cobertura",
            Self::OpenCover => "opencover",
        }
    }
}

/// Detects the format of a report file.
///
/// Filename hints win (`cobertura`/`opencover` substrings); otherwise the
/// first root-looking element is sniffed. Unreadable or unrecognizable
/// files default to Cobertura; detection never fails.
pub fn detect_format(path: &Path, fs: &dyn FileSystem) -> CoverageFormat {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    if name.contains("cobertura") {
        return CoverageFormat::Cobertura;
    }
    if name.contains("opencover") {
        return CoverageFormat::OpenCover;
    }

    let Ok(content) = fs.read_to_string(path) else {
        return CoverageFormat::Cobertura;
    };
    for line in content.lines().take(20) {
        let trimmed = line.trim_start();
        if !trimmed.starts_with('<') || trimmed.starts_with("<?") || trimmed.starts_with("<!") {
            continue;
        }
        if trimmed.contains("CoverageSession") {
            return CoverageFormat::OpenCover;
        }
        // First element decides; anything else falls through to the default.
        break;
    }
    CoverageFormat::Cobertura
}

/// Normalizes a set of report files into one uncovered-work map.
///
/// Each file is detected and parsed independently; unreadable or malformed
/// files are skipped with a warning rather than aborting the run. Modules
/// are merged across files by assembly name.
pub fn normalize_reports(
    paths: &[std::path::PathBuf],
    now: DateTime<Utc>,
    source_commit: Option<String>,
    fs: &dyn FileSystem,
) -> UncoveredWorkMap {
    let mut modules: Vec<ModuleTarget> = Vec::new();

    for path in paths {
        let format = detect_format(path, fs);
        let content = match fs.read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "skipping unreadable report");
                continue;
            }
        };
        let parsed = match format {
            CoverageFormat::Cobertura => cobertura::parse(&content),
            CoverageFormat::OpenCover => opencover::parse(&content),
        };
        match parsed {
            Ok(new_modules) => merge_modules(&mut modules, new_modules),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "skipping malformed report");
            }
        }
    }

    let mut map = UncoveredWorkMap::new(now);
    map.source_commit = source_commit;
    map.modules = modules;
    map
}

/// Merges parsed modules into the accumulator, grouping by assembly name.
///
/// Method lists concatenate in encounter order with no de-duplication;
/// the first encountered module's path wins.
fn merge_modules(into: &mut Vec<ModuleTarget>, new_modules: Vec<ModuleTarget>) {
    for module in new_modules {
        match into.iter_mut().find(|m| m.assembly_name == module.assembly_name) {
            Some(existing) => existing.methods.extend(module.methods),
            None => into.push(module),
        }
    }
}

/// Normalizes a report path: forward slashes, no trailing separator.
pub(crate) fn normalize_path(path: &str) -> String {
    path.trim().replace('\\', "/").trim_end_matches('/').to_string()
}

// XML helpers shared by both report parsers.

pub(crate) fn children<'a>(
    node: roxmltree::Node<'a, 'a>,
    name: &'a str,
) -> impl Iterator<Item = roxmltree::Node<'a, 'a>> {
    node.children().filter(move |n| n.has_tag_name(name))
}

pub(crate) fn attr(node: roxmltree::Node<'_, '_>, name: &str) -> String {
    node.attribute(name).unwrap_or_default().to_string()
}

pub(crate) fn num_attr(node: roxmltree::Node<'_, '_>, name: &str) -> u32 {
    node.attribute(name).and_then(|v| v.parse().ok()).unwrap_or(0)
}

pub(crate) fn child_text(node: roxmltree::Node<'_, '_>, name: &str) -> String {
    children(node, name)
        .next()
        .and_then(|n| n.text())
        .unwrap_or_default()
        .trim()
        .to_string()
}

/// Recognizes a zero-coverage condition value.
///
/// The attribute is written like `"0%"` or `"0% (0/2)"`; the percent sign
/// and any `(hit/total)` suffix are stripped before comparing.
pub(crate) fn is_zero_coverage(raw: &str) -> bool {
    let head = raw.split('(').next().unwrap_or(raw).trim();
    let head = head.trim_end_matches('%').trim();
    head.parse::<f64>().map(|v| v.abs() < f64::EPSILON).unwrap_or(false)
}

//! Coverage snapshots and delta computation for the verification gate.

use std::collections::BTreeSet;
use std::path::PathBuf;

use crate::coverage::{
    attr, children, detect_format, is_zero_coverage, normalize_path, num_attr, CoverageFormat,
};
use crate::model::CoverageDelta;
use crate::ports::filesystem::FileSystem;

/// Probe-level view of one coverage measurement.
///
/// Probes are `file:line` for lines and `file:line:path` for branch
/// paths; sets deduplicate the per-class and per-method copies Cobertura
/// writes of the same line. Rates derive from the sets, so snapshots from
/// different report files merge by union.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoverageSnapshot {
    line_probes: BTreeSet<String>,
    hit_line_probes: BTreeSet<String>,
    branch_probes: BTreeSet<String>,
    hit_branch_probes: BTreeSet<String>,
}

impl CoverageSnapshot {
    /// Builds a snapshot from a set of report files, skipping unreadable
    /// or malformed ones with a warning.
    pub fn from_files(paths: &[PathBuf], fs: &dyn FileSystem) -> Self {
        let mut snapshot = Self::default();
        for path in paths {
            let format = detect_format(path, fs);
            let content = match fs.read_to_string(path) {
                Ok(content) => content,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping unreadable report");
                    continue;
                }
            };
            if let Err(e) = snapshot.absorb(&content, format) {
                tracing::warn!(path = %path.display(), error = %e, "skipping malformed report");
            }
        }
        snapshot
    }

    /// Folds one report document into the snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error when the document is not well-formed XML.
    pub fn absorb(
        &mut self,
        content: &str,
        format: CoverageFormat,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        match format {
            CoverageFormat::Cobertura => self.absorb_cobertura(content),
            CoverageFormat::OpenCover => self.absorb_opencover(content),
        }
    }

    /// Line coverage as a percentage. A snapshot with no known lines
    /// counts as fully covered.
    #[must_use]
    pub fn line_rate(&self) -> f64 {
        rate(self.hit_line_probes.len(), self.line_probes.len())
    }

    /// Branch coverage as a percentage. No known branches counts as
    /// fully covered.
    #[must_use]
    pub fn branch_rate(&self) -> f64 {
        rate(self.hit_branch_probes.len(), self.branch_probes.len())
    }

    /// Computes the change from this baseline to a newer measurement.
    #[must_use]
    pub fn delta_to(&self, newer: &Self) -> CoverageDelta {
        CoverageDelta {
            line_delta: newer.line_rate() - self.line_rate(),
            branch_delta: newer.branch_rate() - self.branch_rate(),
            new_probes_hit: newer
                .hit_line_probes
                .difference(&self.hit_line_probes)
                .cloned()
                .collect(),
        }
    }

    fn absorb_cobertura(
        &mut self,
        content: &str,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let doc = roxmltree::Document::parse(content)?;
        let root = doc.root_element();
        if !root.has_tag_name("coverage") {
            return Ok(());
        }
        for class in root.descendants().filter(|n| n.has_tag_name("class")) {
            let file = normalize_path(&attr(class, "filename"));
            for line in class.descendants().filter(|n| n.has_tag_name("line")) {
                let number = num_attr(line, "number");
                let probe = format!("{file}:{number}");
                if num_attr(line, "hits") > 0 {
                    self.hit_line_probes.insert(probe.clone());
                }
                self.line_probes.insert(probe);

                let conditions =
                    children(line, "conditions").flat_map(|c| children(c, "condition"));
                for (ordinal, condition) in conditions.enumerate() {
                    let probe = format!("{file}:{number}:{ordinal}");
                    let coverage = condition.attribute("coverage").unwrap_or_default();
                    if !is_zero_coverage(coverage) && !coverage.is_empty() {
                        self.hit_branch_probes.insert(probe.clone());
                    }
                    self.branch_probes.insert(probe);
                }
            }
        }
        Ok(())
    }

    fn absorb_opencover(
        &mut self,
        content: &str,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let doc = roxmltree::Document::parse(content)?;
        let root = doc.root_element();
        if !root.has_tag_name("CoverageSession") {
            return Ok(());
        }
        for module in children(root, "Modules").flat_map(|m| children(m, "Module")) {
            let mut file_map = std::collections::HashMap::new();
            for file in children(module, "Files").flat_map(|f| children(f, "File")) {
                file_map.insert(attr(file, "uid"), normalize_path(&attr(file, "fullPath")));
            }

            for point in module.descendants().filter(|n| n.has_tag_name("SequencePoint")) {
                let Some(file) = file_map.get(&attr(point, "fileid")) else {
                    continue;
                };
                let probe = format!("{file}:{}", num_attr(point, "sl"));
                if num_attr(point, "vc") > 0 {
                    self.hit_line_probes.insert(probe.clone());
                }
                self.line_probes.insert(probe);
            }
            for point in module.descendants().filter(|n| n.has_tag_name("BranchPoint")) {
                let Some(file) = file_map.get(&attr(point, "fileid")) else {
                    continue;
                };
                let probe =
                    format!("{file}:{}:{}", num_attr(point, "sl"), num_attr(point, "path"));
                if num_attr(point, "vc") > 0 {
                    self.hit_branch_probes.insert(probe.clone());
                }
                self.branch_probes.insert(probe);
            }
        }
        Ok(())
    }
}

#[allow(clippy::cast_precision_loss)]
fn rate(hit: usize, total: usize) -> f64 {
    if total == 0 {
        return 100.0;
    }
    hit as f64 / total as f64 * 100.0
}

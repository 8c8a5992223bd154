//! Emitter port for rendering accepted test specs into source files.

use std::path::{Path, PathBuf};

use crate::model::{GenerationResponse, MethodTarget};

/// Renders proposed test specs into compilable test source files.
///
/// Rendering details (framework attributes, class layout, file naming)
/// belong to the adapter; the core hands over the specs, the method they
/// target, and an output directory.
pub trait TestFileEmitter: Send + Sync {
    /// Writes the response's tests under `output_dir` and returns the
    /// paths written. One synthesis iteration addresses one method, so a
    /// call normally produces one file.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or a file cannot be created.
    fn emit(
        &self,
        response: &GenerationResponse,
        target: &MethodTarget,
        output_dir: &Path,
    ) -> Result<Vec<PathBuf>, Box<dyn std::error::Error + Send + Sync>>;
}

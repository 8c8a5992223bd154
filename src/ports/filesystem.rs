//! Filesystem port for file I/O operations.

use std::path::{Path, PathBuf};

/// Provides filesystem access for reading and writing files.
///
/// Abstracting the filesystem lets the coverage runner, the emitter, and
/// the report writer run against an in-memory tree during tests.
pub trait FileSystem: Send + Sync {
    /// Reads the entire contents of a file as a UTF-8 string.
    ///
    /// # Errors
    ///
    /// Returns an error if the file does not exist or is not valid UTF-8.
    fn read_to_string(
        &self,
        path: &Path,
    ) -> Result<String, Box<dyn std::error::Error + Send + Sync>>;

    /// Writes the given contents to a file, creating parent directories
    /// and overwriting any existing file.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails (permissions, disk full, etc.).
    fn write(
        &self,
        path: &Path,
        contents: &str,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    /// Returns `true` if the path exists on the filesystem.
    fn exists(&self, path: &Path) -> bool;

    /// Creates a directory and all missing parents.
    ///
    /// # Errors
    ///
    /// Returns an error if creation fails.
    fn create_dir_all(&self, path: &Path) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    /// Recursively finds files under `dir` whose names end with `suffix`,
    /// sorted by path. A missing directory yields an empty list.
    ///
    /// # Errors
    ///
    /// Returns an error if a directory that exists cannot be read.
    fn find_files(
        &self,
        dir: &Path,
        suffix: &str,
    ) -> Result<Vec<PathBuf>, Box<dyn std::error::Error + Send + Sync>>;
}

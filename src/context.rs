//! Service context bundling all port trait objects.

use std::path::Path;
use std::sync::Arc;

use crate::ports::clock::Clock;
use crate::ports::credentials::CredentialProvider;
use crate::ports::emitter::TestFileEmitter;
use crate::ports::filesystem::FileSystem;
use crate::ports::id_gen::IdGenerator;
use crate::ports::process::ProcessRunner;
use crate::ports::source::SourceResolver;

/// Bundles all port trait objects into a single context.
///
/// Each field provides access to one external boundary. The synthesis
/// loop and its collaborators only ever see these traits, so tests swap
/// in fakes without touching the orchestration code.
pub struct ServiceContext {
    /// Clock for obtaining the current time.
    pub clock: Box<dyn Clock>,
    /// Filesystem for file I/O.
    pub fs: Box<dyn FileSystem>,
    /// Process runner for external toolchain invocations.
    pub process: Box<dyn ProcessRunner>,
    /// ID generator for run and request identifiers.
    pub id_gen: Box<dyn IdGenerator>,
    /// Source resolver for target method context.
    pub source: Box<dyn SourceResolver>,
    /// Emitter that writes proposed tests as compilable files.
    pub emitter: Box<dyn TestFileEmitter>,
    /// Credential provider for authenticated HTTP backends. Shared with
    /// the generation backend factory, hence the `Arc`.
    pub credentials: Arc<dyn CredentialProvider>,
}

impl ServiceContext {
    /// Creates a live context with real adapters.
    ///
    /// `source_root` anchors source scanning, usually the directory
    /// containing the target solution file. `framework` and `mocking`
    /// shape the emitted test files.
    #[must_use]
    pub fn live(source_root: &Path, framework: &str, mocking: &str) -> Self {
        use crate::adapters::live::clock::LiveClock;
        use crate::adapters::live::credentials::EnvCredentialProvider;
        use crate::adapters::live::emitter::LiveTestEmitter;
        use crate::adapters::live::filesystem::LiveFileSystem;
        use crate::adapters::live::id_gen::LiveIdGenerator;
        use crate::adapters::live::process::LiveProcessRunner;
        use crate::adapters::live::source::LiveSourceResolver;

        Self {
            clock: Box::new(LiveClock),
            fs: Box::new(LiveFileSystem),
            process: Box::new(LiveProcessRunner),
            id_gen: Box::new(LiveIdGenerator),
            source: Box::new(LiveSourceResolver::new(source_root)),
            emitter: Box::new(LiveTestEmitter::new(framework, mocking)),
            credentials: Arc::new(EnvCredentialProvider::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn live_context_wires_working_adapters() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ServiceContext::live(dir.path(), "xunit", "Moq");

        assert_eq!(ctx.id_gen.generate_id().len(), 32);

        let path = dir.path().join("probe.txt");
        ctx.fs.write(&path, "hello").unwrap();
        assert_eq!(ctx.fs.read_to_string(&path).unwrap(), "hello");
        assert!(ctx.fs.exists(&path));
    }
}

//! Source resolver port, the boundary to the target project's code.

use crate::model::{GenerationConstraints, GenerationRequest, MethodTarget};

/// Resolves method targets against the target project's source tree.
///
/// This is the context-provider boundary: given a method picked from the
/// work map, it locates the method in source and packages everything a
/// generation backend needs. A method that cannot be found is an error
/// scoped to that one request; the controller catches it and moves on.
pub trait SourceResolver: Send + Sync {
    /// Enriches one method target into a full generation request.
    ///
    /// # Errors
    ///
    /// Returns an error if the method cannot be located in the source tree
    /// or its file cannot be read.
    fn collect_context(
        &self,
        target: &MethodTarget,
        request_id: &str,
        constraints: GenerationConstraints,
    ) -> Result<GenerationRequest, Box<dyn std::error::Error + Send + Sync>>;

    /// Enumerates every discoverable method in the source tree, optionally
    /// filtered to types or files whose name contains `filter`
    /// (case-insensitive). Used by generate-all mode, where coverage is
    /// ignored; the returned targets carry empty point collections.
    ///
    /// # Errors
    ///
    /// Returns an error if the source tree cannot be walked.
    fn find_all_methods(
        &self,
        filter: Option<&str>,
    ) -> Result<Vec<MethodTarget>, Box<dyn std::error::Error + Send + Sync>>;
}

//! ID generator port for producing unique identifiers.

/// Generates unique identifiers for runs and generation requests.
///
/// Abstracting ID generation keeps artifact paths and request ids
/// predictable under test.
pub trait IdGenerator: Send + Sync {
    /// Generates a new unique identifier string.
    fn generate_id(&self) -> String;
}

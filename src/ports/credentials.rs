//! Credential provider port for backends that need a bearer token.

/// Supplies authentication tokens to networked generation backends.
///
/// The control loop never performs interactive I/O; any login flow lives
/// behind this boundary. `refresh` exists for the single re-authentication
/// a backend is allowed after an authorization failure.
pub trait CredentialProvider: Send + Sync {
    /// Returns a token for the next request, reusing a cached one when
    /// possible.
    ///
    /// # Errors
    ///
    /// Returns an error if no token can be produced.
    fn acquire(&self) -> Result<String, Box<dyn std::error::Error + Send + Sync>>;

    /// Discards any cached token and obtains a fresh one.
    ///
    /// # Errors
    ///
    /// Returns an error if re-authentication fails.
    fn refresh(&self) -> Result<String, Box<dyn std::error::Error + Send + Sync>>;
}

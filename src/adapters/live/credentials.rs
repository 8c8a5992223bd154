//! Live credential provider backed by environment variables.

use std::env;
use std::sync::Mutex;

use crate::ports::CredentialProvider;

/// Default environment variable holding the raw-HTTP backend token.
pub const DEFAULT_TOKEN_VAR: &str = "DARNER_HTTP_TOKEN";

/// Credential provider that reads a bearer token from the environment.
///
/// `acquire` caches the first successful read for the life of the run;
/// `refresh` re-reads the variable, picking up a token rotated by an
/// external agent while the run was in flight.
pub struct EnvCredentialProvider {
    var_name: String,
    cached: Mutex<Option<String>>,
}

impl EnvCredentialProvider {
    /// Creates a provider reading the given environment variable.
    #[must_use]
    pub fn new(var_name: impl Into<String>) -> Self {
        Self {
            var_name: var_name.into(),
            cached: Mutex::new(None),
        }
    }
}

impl Default for EnvCredentialProvider {
    fn default() -> Self {
        Self::new(DEFAULT_TOKEN_VAR)
    }
}

impl CredentialProvider for EnvCredentialProvider {
    fn acquire(&self) -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
        if let Ok(guard) = self.cached.lock() {
            if let Some(token) = guard.as_ref() {
                return Ok(token.clone());
            }
        }
        self.refresh()
    }

    fn refresh(&self) -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
        let token = env::var(&self.var_name)
            .map_err(|_| format!("{} environment variable not set", self.var_name))?;
        if let Ok(mut guard) = self.cached.lock() {
            *guard = Some(token.clone());
        }
        Ok(token)
    }
}

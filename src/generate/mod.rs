//! Pluggable test generation backends.
//!
//! One trait, one operation: [`TestGenerator::generate`]. A
//! [`ProviderKind`] picks the backend once at startup via
//! [`build_generator`]; after that the control loop never branches on
//! backend identity. Networked backends share the prompt grammar in
//! [`prompt`] and the free-text parser in [`parse`], and degrade
//! transport or parse failures to an empty response with a diagnostic
//! note instead of erroring.

pub mod anthropic;
pub mod http;
pub mod local;
pub mod mock;
pub mod openai;
pub mod options;
pub mod parse;
pub mod prompt;

use std::error::Error;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use crate::error::DarnerError;
use crate::model::{GenerationRequest, GenerationResponse};
use crate::ports::credentials::CredentialProvider;

pub use options::{GenerationOptions, ProviderKind};

/// Boxed future type alias used by [`TestGenerator`] to keep the trait
/// dyn-compatible.
pub type GenerateFuture<'a> = Pin<
    Box<dyn Future<Output = Result<GenerationResponse, Box<dyn Error + Send + Sync>>> + Send + 'a>,
>;

/// Proposes test cases for one target method.
pub trait TestGenerator: Send + Sync {
    /// Generates test proposals for the given request.
    ///
    /// Backends report their own transport and parse failures as an
    /// empty response with notes; an `Err` means the backend could not
    /// run at all.
    fn generate(&self, request: &GenerationRequest) -> GenerateFuture<'_>;
}

/// Builds the configured backend once at startup.
///
/// `credentials` is only consulted by the `http` backend; the others
/// carry their own authentication scheme.
///
/// # Errors
///
/// Returns [`DarnerError::Config`] if the backend's HTTP client cannot
/// be constructed.
pub fn build_generator(
    options: GenerationOptions,
    credentials: Arc<dyn CredentialProvider>,
) -> crate::error::Result<Box<dyn TestGenerator>> {
    Ok(match options.provider {
        ProviderKind::LocalInference => Box::new(local::LocalInferenceGenerator::new(options)?),
        ProviderKind::Anthropic => Box::new(anthropic::AnthropicGenerator::new(options)?),
        ProviderKind::Openai => Box::new(openai::OpenAiGenerator::new(options)?),
        ProviderKind::Http => Box::new(http::HttpGenerator::new(options, credentials)?),
        ProviderKind::Mock => Box::new(mock::MockGenerator::new()),
    })
}

/// Builds a reqwest client with the configured per-request timeout.
pub(crate) fn http_client(timeout: Duration) -> crate::error::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| DarnerError::config(format!("failed to build HTTP client: {e}")))
}

/// Sends a request, retrying transport failures with linear backoff.
///
/// HTTP error statuses are not retried here; backends turn those into
/// diagnostic notes. Only failures to complete the exchange at all
/// (connect, timeout) are worth another attempt.
pub(crate) async fn send_with_retries(
    build: impl Fn() -> reqwest::RequestBuilder,
    max_retries: u32,
    backoff_ms: u64,
) -> Result<reqwest::Response, reqwest::Error> {
    let attempts = max_retries.max(1);
    let mut attempt = 1;
    loop {
        match build().send().await {
            Ok(response) => return Ok(response),
            Err(error) => {
                if attempt >= attempts {
                    return Err(error);
                }
                tracing::warn!(attempt, error = %error, "generation request failed, retrying");
                let delay = backoff_ms.saturating_mul(u64::from(attempt));
                tokio::time::sleep(Duration::from_millis(delay)).await;
                attempt += 1;
            }
        }
    }
}

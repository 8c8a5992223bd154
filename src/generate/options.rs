//! Backend selection and generation tuning knobs.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Which generation backend handles requests for this run.
///
/// Selected once at startup; the control loop only ever sees the
/// [`TestGenerator`](super::TestGenerator) trait.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderKind {
    /// Ollama-style local inference server (`POST /api/generate`).
    #[default]
    LocalInference,
    /// Anthropic messages API.
    Anthropic,
    /// OpenAI chat completions API.
    Openai,
    /// OpenAI-compatible JSON endpoint authenticated through the
    /// credential provider port.
    Http,
    /// Offline deterministic backend for tests and dry runs.
    Mock,
}

impl ProviderKind {
    /// Name used on the CLI and in notes.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LocalInference => "local-inference",
            Self::Anthropic => "anthropic",
            Self::Openai => "openai",
            Self::Http => "http",
            Self::Mock => "mock",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local-inference" => Ok(Self::LocalInference),
            "anthropic" => Ok(Self::Anthropic),
            "openai" => Ok(Self::Openai),
            "http" => Ok(Self::Http),
            "mock" => Ok(Self::Mock),
            other => Err(format!(
                "unknown provider '{other}' (expected local-inference, anthropic, openai, http, or mock)"
            )),
        }
    }
}

/// Tuning knobs shared by every generation backend.
#[derive(Debug, Clone)]
pub struct GenerationOptions {
    /// Selected backend.
    pub provider: ProviderKind,
    /// Sampling temperature; zero keeps generation deterministic.
    pub temperature: f64,
    /// Nucleus sampling parameter.
    pub top_p: f64,
    /// Random seed, sent when the backend supports one.
    pub seed: Option<u64>,
    /// Upper bound on tokens the backend may generate.
    pub max_output_tokens: u32,
    /// Bound on each HTTP request.
    pub request_timeout: Duration,
    /// Transport-level send attempts before giving up on a request.
    pub max_retries: u32,
    /// Base delay between retry attempts, scaled linearly per attempt.
    pub backoff_ms: u64,
    /// Test framework named in prompts, e.g. `xunit`.
    pub test_framework: String,
    /// Mocking library named in prompts, e.g. `Moq`.
    pub mocking: String,
    /// Endpoint override; each backend has its own default.
    pub base_url: Option<String>,
    /// Model override; each backend has its own default.
    pub model: Option<String>,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            provider: ProviderKind::default(),
            temperature: 0.0,
            top_p: 1.0,
            seed: None,
            max_output_tokens: 2000,
            request_timeout: Duration::from_secs(300),
            max_retries: 3,
            backoff_ms: 1000,
            test_framework: "xunit".to_string(),
            mocking: "Moq".to_string(),
            base_url: None,
            model: None,
        }
    }
}

//! Local inference backend speaking the Ollama generate API.

use serde::{Deserialize, Serialize};

use crate::model::{GenerationRequest, GenerationResponse};

use super::options::GenerationOptions;
use super::{parse, prompt, GenerateFuture, TestGenerator};

const DEFAULT_BASE_URL: &str = "http://localhost:11434";
const DEFAULT_MODEL: &str = "gpt-oss:20b";

/// Backend for a locally hosted inference server.
///
/// Talks to `POST {base_url}/api/generate` with non-streaming sampling
/// options. The default endpoint and model match a stock Ollama
/// install; both can be overridden.
pub struct LocalInferenceGenerator {
    client: reqwest::Client,
    options: GenerationOptions,
    base_url: String,
    model: String,
}

impl LocalInferenceGenerator {
    /// Creates the backend from the run's generation options.
    ///
    /// # Errors
    ///
    /// Returns [`DarnerError::Config`](crate::error::DarnerError::Config)
    /// when the HTTP client cannot be built.
    pub fn new(options: GenerationOptions) -> crate::error::Result<Self> {
        let client = super::http_client(options.request_timeout)?;
        let base_url =
            options.base_url.clone().unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let model = options.model.clone().unwrap_or_else(|| DEFAULT_MODEL.to_string());
        Ok(Self { client, options, base_url, model })
    }
}

/// Request body for the generate endpoint.
#[derive(Serialize)]
struct GenerateBody<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: SamplingOptions,
}

/// Deterministic sampling controls.
#[derive(Serialize)]
struct SamplingOptions {
    temperature: f64,
    top_p: f64,
    num_predict: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<u64>,
}

/// Response body of the generate endpoint.
#[derive(Deserialize)]
struct GenerateReply {
    response: Option<String>,
    thinking: Option<String>,
}

impl GenerateReply {
    /// Some models put their prose in `thinking` and leave `response`
    /// empty; prefer whichever is non-empty, thinking first.
    fn text(self) -> Option<String> {
        match self.thinking {
            Some(t) if !t.is_empty() => Some(t),
            _ => self.response.filter(|r| !r.is_empty()),
        }
    }
}

impl TestGenerator for LocalInferenceGenerator {
    fn generate(&self, request: &GenerationRequest) -> GenerateFuture<'_> {
        let request = request.clone();
        Box::pin(async move {
            let prompt_text = prompt::build_prompt(&request, &self.options);
            let url = format!("{}/api/generate", self.base_url);
            let body = GenerateBody {
                model: &self.model,
                prompt: &prompt_text,
                stream: false,
                options: SamplingOptions {
                    temperature: self.options.temperature,
                    top_p: self.options.top_p,
                    num_predict: self.options.max_output_tokens,
                    seed: self.options.seed,
                },
            };

            let sent = super::send_with_retries(
                || self.client.post(&url).json(&body),
                self.options.max_retries,
                self.options.backoff_ms,
            )
            .await;
            let response = match sent {
                Ok(response) => response,
                Err(e) => {
                    return Ok(GenerationResponse::empty_with_note(
                        request.request_id,
                        format!(
                            "local inference connection error: {e}. Is the server running at {}?",
                            self.base_url
                        ),
                    ))
                }
            };

            let status = response.status();
            let text = match response.text().await {
                Ok(text) => text,
                Err(e) => {
                    return Ok(GenerationResponse::empty_with_note(
                        request.request_id,
                        format!("local inference read error: {e}"),
                    ))
                }
            };
            if !status.is_success() {
                return Ok(GenerationResponse {
                    request_id: request.request_id,
                    proposed_tests: Vec::new(),
                    notes: vec![format!("local inference API error: {status}"), text],
                });
            }

            let reply: GenerateReply = match serde_json::from_str(&text) {
                Ok(reply) => reply,
                Err(e) => {
                    return Ok(GenerationResponse::empty_with_note(
                        request.request_id,
                        format!("local inference returned unparseable JSON: {e}"),
                    ))
                }
            };
            let Some(generated) = reply.text() else {
                return Ok(GenerationResponse::empty_with_note(
                    request.request_id,
                    "local inference returned an empty response",
                ));
            };

            let tests = parse::parse_test_specifications(
                &generated,
                &request.target_method.method_id,
                request.constraints.max_test_cases,
            );
            let note = format!(
                "local inference ({}) generated {} test specifications",
                self.model,
                tests.len()
            );
            Ok(GenerationResponse {
                request_id: request.request_id,
                proposed_tests: tests,
                notes: vec![note],
            })
        })
    }
}

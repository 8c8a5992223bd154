//! Hosted Anthropic messages API backend.

use serde::{Deserialize, Serialize};

use crate::model::{GenerationRequest, GenerationResponse};

use super::options::GenerationOptions;
use super::{parse, prompt, GenerateFuture, TestGenerator};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const DEFAULT_MODEL: &str = "claude-3-5-sonnet-20241022";
const API_KEY_VAR: &str = "ANTHROPIC_API_KEY";
const API_VERSION: &str = "2023-06-01";

/// Backend for the hosted Anthropic messages API.
///
/// The API key is read from `ANTHROPIC_API_KEY` at request time, so a key
/// exported after startup still works. A missing key degrades to an empty
/// response rather than failing the run.
pub struct AnthropicGenerator {
    client: reqwest::Client,
    options: GenerationOptions,
    base_url: String,
    model: String,
}

impl AnthropicGenerator {
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

/// Request body for the messages endpoint.
#[derive(Serialize)]
struct MessagesBody<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f64,
    messages: [Message<'a>; 1],
}

/// One chat turn.
#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

/// Response body of the messages endpoint.
#[derive(Deserialize)]
struct MessagesReply {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

/// One block of reply content; non-text blocks deserialize with no text.
#[derive(Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: Option<String>,
}

impl MessagesReply {
    fn text(self) -> String {
        self.content.into_iter().filter_map(|block| block.text).collect()
    }
}

impl TestGenerator for AnthropicGenerator {
    fn generate(&self, request: &GenerationRequest) -> GenerateFuture<'_> {
        let request = request.clone();
        Box::pin(async move {
            let api_key = std::env::var(API_KEY_VAR).ok().filter(|key| !key.is_empty());
            let Some(api_key) = api_key else {
                return Ok(GenerationResponse::empty_with_note(
                    request.request_id,
                    format!("{API_KEY_VAR} is not set; skipping Anthropic generation"),
                ));
            };

            let prompt_text = prompt::build_prompt(&request, &self.options);
            let url = format!("{}/messages", self.base_url);
            let body = MessagesBody {
                model: &self.model,
                max_tokens: self.options.max_output_tokens,
                temperature: self.options.temperature,
                messages: [Message { role: "user", content: &prompt_text }],
            };

            let sent = super::send_with_retries(
                || {
                    self.client
                        .post(&url)
                        .header("x-api-key", &api_key)
                        .header("anthropic-version", API_VERSION)
                        .json(&body)
                },
                self.options.max_retries,
                self.options.backoff_ms,
            )
            .await;
            let response = match sent {
                Ok(response) => response,
                Err(e) => {
                    return Ok(GenerationResponse::empty_with_note(
                        request.request_id,
                        format!("Anthropic connection error: {e}"),
                    ))
                }
            };

            let status = response.status();
            let text = match response.text().await {
                Ok(text) => text,
                Err(e) => {
                    return Ok(GenerationResponse::empty_with_note(
                        request.request_id,
                        format!("Anthropic read error: {e}"),
                    ))
                }
            };
            if !status.is_success() {
                return Ok(GenerationResponse {
                    request_id: request.request_id,
                    proposed_tests: Vec::new(),
                    notes: vec![format!("Anthropic API error: {status}"), text],
                });
            }

            let reply: MessagesReply = match serde_json::from_str(&text) {
                Ok(reply) => reply,
                Err(e) => {
                    return Ok(GenerationResponse::empty_with_note(
                        request.request_id,
                        format!("Anthropic returned unparseable JSON: {e}"),
                    ))
                }
            };
            let generated = reply.text();
            if generated.is_empty() {
                return Ok(GenerationResponse::empty_with_note(
                    request.request_id,
                    "Anthropic returned an empty response",
                ));
            }

            let tests = parse::parse_test_specifications(
                &generated,
                &request.target_method.method_id,
                request.constraints.max_test_cases,
            );
            let note = format!(
                "Anthropic ({}) generated {} test specifications",
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

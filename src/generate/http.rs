//! Self-hosted OpenAI-compatible endpoint backend.
//!
//! Speaks `POST {endpoint}/v1/chat/completions` with a bearer token from
//! the [`CredentialProvider`] port. On a 401 the backend re-authenticates
//! exactly once and retries the request; a second rejection degrades to
//! notes like every other failure.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::model::{GenerationRequest, GenerationResponse};
use crate::ports::credentials::CredentialProvider;

use super::options::GenerationOptions;
use super::{parse, prompt, GenerateFuture, TestGenerator};

const DEFAULT_MODEL: &str = "default";

/// Backend for an OpenAI-compatible endpoint behind organization auth.
pub struct HttpGenerator {
    client: reqwest::Client,
    options: GenerationOptions,
    credentials: Arc<dyn CredentialProvider>,
    base_url: Option<String>,
    model: String,
}

impl HttpGenerator {
    /// Creates the backend from the run's generation options and the
    /// credential port.
    ///
    /// # Errors
    ///
    /// Returns [`DarnerError::Config`](crate::error::DarnerError::Config)
    /// when the HTTP client cannot be built.
    pub fn new(
        options: GenerationOptions,
        credentials: Arc<dyn CredentialProvider>,
    ) -> crate::error::Result<Self> {
        let client = super::http_client(options.request_timeout)?;
        let base_url = options
            .base_url
            .clone()
            .map(|url| url.trim_end_matches('/').to_string());
        let model = options.model.clone().unwrap_or_else(|| DEFAULT_MODEL.to_string());
        Ok(Self { client, options, credentials, base_url, model })
    }
}

/// Request body for the chat completions endpoint.
#[derive(Serialize)]
struct ChatBody<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    temperature: f64,
    max_tokens: u32,
    stream: bool,
}

/// One chat turn.
#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

/// Response body of the chat completions endpoint.
#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReplyMessage,
}

#[derive(Deserialize)]
struct ChatReplyMessage {
    #[serde(default)]
    content: Option<String>,
}

impl ChatReply {
    fn text(self) -> Option<String> {
        self.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|text| !text.is_empty())
    }
}

impl TestGenerator for HttpGenerator {
    fn generate(&self, request: &GenerationRequest) -> GenerateFuture<'_> {
        let request = request.clone();
        Box::pin(async move {
            let Some(base_url) = self.base_url.as_deref() else {
                return Ok(GenerationResponse::empty_with_note(
                    request.request_id,
                    "no base URL configured for the http provider; pass --endpoint",
                ));
            };
            let token = match self.credentials.acquire() {
                Ok(token) => token,
                Err(e) => {
                    return Ok(GenerationResponse::empty_with_note(
                        request.request_id,
                        format!("credential acquisition failed: {e}"),
                    ))
                }
            };

            let prompt_text = prompt::build_prompt(&request, &self.options);
            let url = format!("{base_url}/v1/chat/completions");
            let body = ChatBody {
                model: &self.model,
                messages: [ChatMessage { role: "user", content: &prompt_text }],
                temperature: self.options.temperature,
                max_tokens: self.options.max_output_tokens,
                stream: false,
            };

            let sent = super::send_with_retries(
                || self.client.post(&url).bearer_auth(&token).json(&body),
                self.options.max_retries,
                self.options.backoff_ms,
            )
            .await;
            let mut response = match sent {
                Ok(response) => response,
                Err(e) => {
                    return Ok(GenerationResponse::empty_with_note(
                        request.request_id,
                        format!("http endpoint connection error: {e}"),
                    ))
                }
            };

            if response.status() == reqwest::StatusCode::UNAUTHORIZED {
                tracing::warn!("http endpoint returned 401, re-authenticating once");
                let token = match self.credentials.refresh() {
                    Ok(token) => token,
                    Err(e) => {
                        return Ok(GenerationResponse {
                            request_id: request.request_id,
                            proposed_tests: Vec::new(),
                            notes: vec![
                                "http endpoint returned 401 Unauthorized".to_string(),
                                format!("re-authentication failed: {e}"),
                            ],
                        })
                    }
                };
                let retried = self
                    .client
                    .post(&url)
                    .bearer_auth(&token)
                    .json(&body)
                    .send()
                    .await;
                response = match retried {
                    Ok(response) => response,
                    Err(e) => {
                        return Ok(GenerationResponse::empty_with_note(
                            request.request_id,
                            format!("http endpoint connection error after re-authentication: {e}"),
                        ))
                    }
                };
            }

            let status = response.status();
            let text = match response.text().await {
                Ok(text) => text,
                Err(e) => {
                    return Ok(GenerationResponse::empty_with_note(
                        request.request_id,
                        format!("http endpoint read error: {e}"),
                    ))
                }
            };
            if !status.is_success() {
                return Ok(GenerationResponse {
                    request_id: request.request_id,
                    proposed_tests: Vec::new(),
                    notes: vec![format!("http endpoint API error: {status}"), text],
                });
            }

            let reply: ChatReply = match serde_json::from_str(&text) {
                Ok(reply) => reply,
                Err(e) => {
                    return Ok(GenerationResponse::empty_with_note(
                        request.request_id,
                        format!("http endpoint returned unparseable JSON: {e}"),
                    ))
                }
            };
            let Some(generated) = reply.text() else {
                return Ok(GenerationResponse::empty_with_note(
                    request.request_id,
                    "http endpoint returned an empty response",
                ));
            };

            let tests = parse::parse_test_specifications(
                &generated,
                &request.target_method.method_id,
                request.constraints.max_test_cases,
            );
            let note = format!(
                "http endpoint ({}) generated {} test specifications",
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{GenerationConstraints, HarnessPlan, MethodTarget};
    use crate::testutil::{serve_http, StaticCreds};

    fn request() -> GenerationRequest {
        GenerationRequest {
            request_id: "req-http".to_string(),
            target_method: MethodTarget {
                method_id: "dead".repeat(16),
                type_full_name: "Demo.Ledger".to_string(),
                method_display_name: "Ledger.Post(System.Decimal)".to_string(),
                source_files: Vec::new(),
                uncovered_sequence_points: Vec::new(),
                uncovered_branch_points: Vec::new(),
            },
            method_signature: "public void Post(decimal amount)".to_string(),
            containing_type_source: String::new(),
            method_source: "throw new NotImplementedException();".to_string(),
            branch_hints: Vec::new(),
            harness_plan: HarnessPlan::default(),
            constraints: GenerationConstraints::default(),
        }
    }

    fn options_for(base_url: Option<&str>) -> GenerationOptions {
        GenerationOptions {
            base_url: base_url.map(ToString::to_string),
            max_retries: 1,
            backoff_ms: 1,
            ..GenerationOptions::default()
        }
    }

    fn chat_reply() -> String {
        serde_json::json!({
            "choices": [
                { "message": { "content": "TEST: Post_Works\nACT: l.Post(1m)\nASSERT: no throw" } }
            ]
        })
        .to_string()
    }

    /// Credentials that hand out a token but cannot re-authenticate.
    struct NoRefresh;

    impl CredentialProvider for NoRefresh {
        fn acquire(&self) -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
            Ok("stale".to_string())
        }

        fn refresh(&self) -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
            Err("sso session expired".into())
        }
    }

    #[tokio::test]
    async fn authorized_request_succeeds_on_the_first_try() {
        let stub = serve_http(vec![(200, chat_reply())]).await;
        let generator = HttpGenerator::new(
            options_for(Some(&stub.base_url)),
            Arc::new(StaticCreds::new(&["tok-1"])),
        )
        .unwrap();

        let response = generator.generate(&request()).await.unwrap();

        assert_eq!(response.proposed_tests.len(), 1);
        assert_eq!(response.proposed_tests[0].name, "Post_Works");
        assert_eq!(
            response.notes,
            vec!["http endpoint (default) generated 1 test specifications"]
        );
        assert_eq!(stub.request_count(), 1);
        let raw = stub.request(0);
        assert!(raw.starts_with("POST /v1/chat/completions HTTP/1.1"));
        assert!(raw.contains("authorization: Bearer tok-1"));
        let body: serde_json::Value =
            serde_json::from_str(raw.split("\r\n\r\n").nth(1).unwrap()).unwrap();
        assert_eq!(body["stream"], false);
        assert_eq!(body["model"], "default");
    }

    #[tokio::test]
    async fn unauthorized_then_refreshed_token_retries_exactly_once() {
        let stub = serve_http(vec![(401, "{}".to_string()), (200, chat_reply())]).await;
        let generator = HttpGenerator::new(
            options_for(Some(&stub.base_url)),
            Arc::new(StaticCreds::new(&["tok-1", "tok-2"])),
        )
        .unwrap();

        let response = generator.generate(&request()).await.unwrap();

        assert_eq!(response.proposed_tests.len(), 1);
        assert_eq!(stub.request_count(), 2);
        assert!(stub.request(0).contains("authorization: Bearer tok-1"));
        assert!(stub.request(1).contains("authorization: Bearer tok-2"));
    }

    #[tokio::test]
    async fn second_rejection_degrades_without_another_refresh() {
        let stub =
            serve_http(vec![(401, "{}".to_string()), (401, "denied".to_string())]).await;
        let generator = HttpGenerator::new(
            options_for(Some(&stub.base_url)),
            Arc::new(StaticCreds::new(&["tok-1", "tok-2"])),
        )
        .unwrap();

        let response = generator.generate(&request()).await.unwrap();

        assert!(response.proposed_tests.is_empty());
        assert!(response.notes[0].contains("http endpoint API error: 401"));
        assert_eq!(response.notes[1], "denied");
        assert_eq!(stub.request_count(), 2);
    }

    #[tokio::test]
    async fn refresh_failure_reports_both_problems() {
        let stub = serve_http(vec![(401, "{}".to_string())]).await;
        let generator =
            HttpGenerator::new(options_for(Some(&stub.base_url)), Arc::new(NoRefresh)).unwrap();

        let response = generator.generate(&request()).await.unwrap();

        assert!(response.proposed_tests.is_empty());
        assert_eq!(response.notes[0], "http endpoint returned 401 Unauthorized");
        assert!(response.notes[1].contains("sso session expired"));
        assert_eq!(stub.request_count(), 1);
    }

    #[tokio::test]
    async fn missing_endpoint_degrades_before_any_io() {
        let generator =
            HttpGenerator::new(options_for(None), Arc::new(StaticCreds::new(&["tok-1"])))
                .unwrap();

        let response = generator.generate(&request()).await.unwrap();
        assert!(response.proposed_tests.is_empty());
        assert!(response.notes[0].contains("no base URL configured"));
    }

    #[tokio::test]
    async fn credential_failure_degrades_before_any_io() {
        // Nothing listens on port 1; acquire fails before a connection.
        let generator = HttpGenerator::new(
            options_for(Some("http://127.0.0.1:1")),
            Arc::new(StaticCreds::new(&[])),
        )
        .unwrap();

        let response = generator.generate(&request()).await.unwrap();
        assert!(response.proposed_tests.is_empty());
        assert!(response.notes[0].contains("credential acquisition failed"));
    }
}

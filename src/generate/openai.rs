//! Hosted OpenAI chat completions backend.

use serde::{Deserialize, Serialize};

use crate::model::{GenerationRequest, GenerationResponse};

use super::options::GenerationOptions;
use super::{parse, prompt, GenerateFuture, TestGenerator};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o-mini";
const API_KEY_VAR: &str = "OPENAI_API_KEY";

/// Backend for the hosted OpenAI chat completions API.
///
/// The API key is read from `OPENAI_API_KEY` at request time. A missing
/// key degrades to an empty response rather than failing the run.
pub struct OpenAiGenerator {
    client: reqwest::Client,
    options: GenerationOptions,
    base_url: String,
    model: String,
}

impl OpenAiGenerator {
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

/// Request body for the chat completions endpoint.
#[derive(Serialize)]
struct ChatBody<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    temperature: f64,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<u64>,
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

impl TestGenerator for OpenAiGenerator {
    fn generate(&self, request: &GenerationRequest) -> GenerateFuture<'_> {
        let request = request.clone();
        Box::pin(async move {
            let api_key = std::env::var(API_KEY_VAR).ok().filter(|key| !key.is_empty());
            let Some(api_key) = api_key else {
                return Ok(GenerationResponse::empty_with_note(
                    request.request_id,
                    format!("{API_KEY_VAR} is not set; skipping OpenAI generation"),
                ));
            };

            let prompt_text = prompt::build_prompt(&request, &self.options);
            let url = format!("{}/chat/completions", self.base_url);
            let body = ChatBody {
                model: &self.model,
                messages: [ChatMessage { role: "user", content: &prompt_text }],
                temperature: self.options.temperature,
                max_tokens: self.options.max_output_tokens,
                seed: self.options.seed,
            };

            let sent = super::send_with_retries(
                || self.client.post(&url).bearer_auth(&api_key).json(&body),
                self.options.max_retries,
                self.options.backoff_ms,
            )
            .await;
            let response = match sent {
                Ok(response) => response,
                Err(e) => {
                    return Ok(GenerationResponse::empty_with_note(
                        request.request_id,
                        format!("OpenAI connection error: {e}"),
                    ))
                }
            };

            let status = response.status();
            let text = match response.text().await {
                Ok(text) => text,
                Err(e) => {
                    return Ok(GenerationResponse::empty_with_note(
                        request.request_id,
                        format!("OpenAI read error: {e}"),
                    ))
                }
            };
            if !status.is_success() {
                return Ok(GenerationResponse {
                    request_id: request.request_id,
                    proposed_tests: Vec::new(),
                    notes: vec![format!("OpenAI API error: {status}"), text],
                });
            }

            let reply: ChatReply = match serde_json::from_str(&text) {
                Ok(reply) => reply,
                Err(e) => {
                    return Ok(GenerationResponse::empty_with_note(
                        request.request_id,
                        format!("OpenAI returned unparseable JSON: {e}"),
                    ))
                }
            };
            let Some(generated) = reply.text() else {
                return Ok(GenerationResponse::empty_with_note(
                    request.request_id,
                    "OpenAI returned an empty response",
                ));
            };

            let tests = parse::parse_test_specifications(
                &generated,
                &request.target_method.method_id,
                request.constraints.max_test_cases,
            );
            let note = format!(
                "OpenAI ({}) generated {} test specifications",
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
    use crate::testutil::serve_http;

    fn request() -> GenerationRequest {
        GenerationRequest {
            request_id: "req-openai".to_string(),
            target_method: MethodTarget {
                method_id: "feed".repeat(16),
                type_full_name: "Demo.Router".to_string(),
                method_display_name: "Router.Route(System.String)".to_string(),
                source_files: Vec::new(),
                uncovered_sequence_points: Vec::new(),
                uncovered_branch_points: Vec::new(),
            },
            method_signature: "public string Route(string path)".to_string(),
            containing_type_source: String::new(),
            method_source: "return path;".to_string(),
            branch_hints: Vec::new(),
            harness_plan: HarnessPlan::default(),
            constraints: GenerationConstraints::default(),
        }
    }

    // The one test that touches OPENAI_API_KEY; keeping it alone avoids
    // races with parallel tests reading the same process environment.
    #[tokio::test]
    async fn sends_bearer_request_and_reads_the_first_choice() {
        let reply = serde_json::json!({
            "choices": [
                { "message": { "role": "assistant",
                               "content": "TEST: Route_Works\nACT: r.Route(\"/\")\nASSERT: returns \"/\"" } }
            ]
        });
        let stub = serve_http(vec![(200, reply.to_string())]).await;
        std::env::set_var("OPENAI_API_KEY", "sk-oai-test");

        let options = GenerationOptions {
            base_url: Some(stub.base_url.clone()),
            seed: Some(7),
            max_retries: 1,
            backoff_ms: 1,
            ..GenerationOptions::default()
        };
        let generator = OpenAiGenerator::new(options).unwrap();
        let response = generator.generate(&request()).await.unwrap();

        assert_eq!(response.proposed_tests.len(), 1);
        assert_eq!(response.proposed_tests[0].name, "Route_Works");

        let raw = stub.request(0);
        assert!(raw.starts_with("POST /chat/completions HTTP/1.1"));
        assert!(raw.contains("authorization: Bearer sk-oai-test"));
        let body: serde_json::Value =
            serde_json::from_str(raw.split("\r\n\r\n").nth(1).unwrap()).unwrap();
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["max_tokens"], 2000);
        assert_eq!(body["seed"], 7);
        assert_eq!(body["messages"][0]["role"], "user");
    }

    #[test]
    fn missing_choices_read_as_empty() {
        let reply: ChatReply = serde_json::from_str("{}").unwrap();
        assert!(reply.text().is_none());

        let reply: ChatReply =
            serde_json::from_str(r#"{"choices":[{"message":{"content":""}}]}"#).unwrap();
        assert!(reply.text().is_none());
    }
}

//! Perplexity Sonar reasoning backend
//!
//! Implements [`ReasoningBackend`] over the Sonar chat-completions API,
//! handling request conversion, SSE stream parsing, and typed error mapping.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{CareError, Result};

use super::{
    parse_backend_error, ChatTurn, Completion, CompletionRequest, ReasoningBackend, StreamEvent,
    Usage,
};

/// Path appended to the configured API base.
const COMPLETIONS_PATH: &str = "/chat/completions";

/// Perplexity Sonar backend.
///
/// Speaks the OpenAI-compatible chat-completions dialect, including SSE
/// streaming. The base URL, API key, and default model come from
/// configuration.
pub struct SonarBackend {
    /// API key for bearer authentication
    api_key: String,
    /// API base URL without trailing slash
    api_base: String,
    /// Model used when a request names none
    default_model: String,
    /// HTTP client for making requests
    client: Client,
}

impl SonarBackend {
    /// Create a new Sonar backend.
    ///
    /// # Arguments
    /// * `api_key` - Perplexity API key
    /// * `api_base` - API base URL, e.g. `https://api.perplexity.ai`
    /// * `default_model` - model used when a request names none
    pub fn new(api_key: &str, api_base: &str, default_model: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            api_base: api_base.trim_end_matches('/').to_string(),
            default_model: default_model.to_string(),
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(120))
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }

    /// Create a backend with a custom HTTP client, useful for tests.
    pub fn with_client(api_key: &str, api_base: &str, default_model: &str, client: Client) -> Self {
        Self {
            api_key: api_key.to_string(),
            api_base: api_base.trim_end_matches('/').to_string(),
            default_model: default_model.to_string(),
            client,
        }
    }

    fn completions_url(&self) -> String {
        format!("{}{}", self.api_base, COMPLETIONS_PATH)
    }

    fn build_request(&self, request: &CompletionRequest, stream: bool) -> SonarRequest {
        SonarRequest {
            model: request
                .model
                .clone()
                .unwrap_or_else(|| self.default_model.clone()),
            messages: request.messages.clone(),
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            stream: if stream { Some(true) } else { None },
        }
    }
}

#[async_trait]
impl ReasoningBackend for SonarBackend {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion> {
        let body = self.build_request(&request, false);

        let response = self
            .client
            .post(self.completions_url())
            .bearer_auth(&self.api_key)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let error_text = response.text().await.unwrap_or_default();
            let body = describe_error_body(&error_text);
            return Err(CareError::from(parse_backend_error(status, &body)));
        }

        let sonar_response: SonarResponse = response.json().await?;
        Ok(convert_response(sonar_response))
    }

    async fn stream(
        &self,
        request: CompletionRequest,
    ) -> Result<tokio::sync::mpsc::Receiver<StreamEvent>> {
        use futures::StreamExt;

        let body = self.build_request(&request, true);

        let response = self
            .client
            .post(self.completions_url())
            .bearer_auth(&self.api_key)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let error_text = response.text().await.unwrap_or_default();
            let body = describe_error_body(&error_text);
            return Err(CareError::from(parse_backend_error(status, &body)));
        }

        let (tx, rx) = tokio::sync::mpsc::channel::<StreamEvent>(32);
        let byte_stream = response.bytes_stream();

        tokio::spawn(async move {
            let mut assembled_content = String::new();
            let mut usage: Option<Usage> = None;
            let mut line_buffer = String::new();

            tokio::pin!(byte_stream);

            while let Some(chunk_result) = byte_stream.next().await {
                let chunk = match chunk_result {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        let _ = tx
                            .send(StreamEvent::Error(CareError::Backend(
                                crate::error::BackendError::Unknown(format!(
                                    "stream read error: {}",
                                    e
                                )),
                            )))
                            .await;
                        return;
                    }
                };

                let chunk_str = String::from_utf8_lossy(&chunk);
                line_buffer.push_str(&chunk_str);

                // SSE frames are newline-delimited; a network chunk can end
                // mid-line, so only complete lines leave the buffer.
                while let Some(newline_pos) = line_buffer.find('\n') {
                    let line = line_buffer[..newline_pos].trim().to_string();
                    line_buffer = line_buffer[newline_pos + 1..].to_string();

                    if line.is_empty() || line.starts_with("event:") {
                        continue;
                    }

                    let data = if let Some(stripped) = line.strip_prefix("data: ") {
                        stripped
                    } else if let Some(stripped) = line.strip_prefix("data:") {
                        stripped
                    } else {
                        continue;
                    };

                    if data == "[DONE]" {
                        let _ = tx
                            .send(StreamEvent::Done {
                                content: assembled_content,
                                usage,
                            })
                            .await;
                        return;
                    }

                    let sse: SseChunk = match serde_json::from_str(data) {
                        Ok(v) => v,
                        Err(_) => continue,
                    };

                    if let Some(u) = sse.usage {
                        usage = Some(Usage::new(u.prompt_tokens, u.completion_tokens));
                    }

                    for choice in &sse.choices {
                        if let Some(text) = &choice.delta.content {
                            if !text.is_empty() {
                                assembled_content.push_str(text);
                                if tx.send(StreamEvent::Delta(text.clone())).await.is_err() {
                                    return;
                                }
                            }
                        }
                    }
                }
            }

            // Stream ended without a [DONE] marker; finish with what arrived.
            let _ = tx
                .send(StreamEvent::Done {
                    content: assembled_content,
                    usage,
                })
                .await;
        });

        Ok(rx)
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    fn name(&self) -> &str {
        "sonar"
    }
}

/// Render a structured API error body when possible, raw text otherwise.
fn describe_error_body(error_text: &str) -> String {
    if let Ok(error_response) = serde_json::from_str::<SonarErrorResponse>(error_text) {
        format!(
            "Sonar API error: {} - {}",
            error_response.error.error_type, error_response.error.message
        )
    } else {
        format!("Sonar API error: {}", error_text)
    }
}

fn convert_response(response: SonarResponse) -> Completion {
    let content = response
        .choices
        .into_iter()
        .next()
        .map(|c| c.message.content)
        .unwrap_or_default();
    let usage = response
        .usage
        .map(|u| Usage::new(u.prompt_tokens, u.completion_tokens));
    Completion { content, usage }
}

// ============================================================================
// Sonar API Request Types
// ============================================================================

/// Chat-completions request body.
#[derive(Debug, Serialize)]
struct SonarRequest {
    model: String,
    messages: Vec<ChatTurn>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

// ============================================================================
// Sonar API Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct SonarResponse {
    choices: Vec<SonarChoice>,
    usage: Option<SonarUsage>,
}

#[derive(Debug, Deserialize)]
struct SonarChoice {
    message: SonarMessage,
}

#[derive(Debug, Deserialize)]
struct SonarMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct SonarUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

/// One parsed SSE data frame of a streaming response.
#[derive(Debug, Deserialize)]
struct SseChunk {
    #[serde(default)]
    choices: Vec<SseChoice>,
    usage: Option<SonarUsage>,
}

#[derive(Debug, Deserialize)]
struct SseChoice {
    #[serde(default)]
    delta: SseDelta,
}

#[derive(Debug, Default, Deserialize)]
struct SseDelta {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SonarErrorResponse {
    error: SonarErrorDetail,
}

#[derive(Debug, Deserialize)]
struct SonarErrorDetail {
    #[serde(rename = "type", default)]
    error_type: String,
    #[serde(default)]
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completions_url_strips_trailing_slash() {
        let backend = SonarBackend::new("key", "https://api.perplexity.ai/", "sonar-medium-online");
        assert_eq!(
            backend.completions_url(),
            "https://api.perplexity.ai/chat/completions"
        );
    }

    #[test]
    fn test_build_request_uses_default_model() {
        let backend = SonarBackend::new("key", "https://api.perplexity.ai", "sonar-medium-online");
        let request = CompletionRequest::new(vec![ChatTurn::user("hi")]);
        let body = backend.build_request(&request, false);
        assert_eq!(body.model, "sonar-medium-online");
        assert!(body.stream.is_none());
    }

    #[test]
    fn test_build_request_honors_override_and_stream() {
        let backend = SonarBackend::new("key", "https://api.perplexity.ai", "sonar-medium-online");
        let request =
            CompletionRequest::new(vec![ChatTurn::user("hi")]).with_model("sonar-large-online");
        let body = backend.build_request(&request, true);
        assert_eq!(body.model, "sonar-large-online");
        assert_eq!(body.stream, Some(true));
    }

    #[test]
    fn test_request_serialization_skips_absent_fields() {
        let backend = SonarBackend::new("key", "https://api.perplexity.ai", "sonar-medium-online");
        let request = CompletionRequest::new(vec![ChatTurn::user("hi")]);
        let body = backend.build_request(&request, false);
        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("max_tokens").is_none());
        assert!(json.get("temperature").is_none());
        assert!(json.get("stream").is_none());
    }

    #[test]
    fn test_convert_response() {
        let response: SonarResponse = serde_json::from_str(
            r#"{
                "choices": [{"message": {"role": "assistant", "content": "hello"}}],
                "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
            }"#,
        )
        .unwrap();
        let completion = convert_response(response);
        assert_eq!(completion.content, "hello");
        assert_eq!(completion.usage.unwrap().total_tokens, 15);
    }

    #[test]
    fn test_sse_chunk_parse() {
        let chunk: SseChunk = serde_json::from_str(
            r#"{"choices": [{"delta": {"content": "par"}, "finish_reason": null}]}"#,
        )
        .unwrap();
        assert_eq!(chunk.choices[0].delta.content.as_deref(), Some("par"));
    }

    #[test]
    fn test_sse_chunk_parse_empty_delta() {
        let chunk: SseChunk =
            serde_json::from_str(r#"{"choices": [{"delta": {}, "finish_reason": "stop"}]}"#)
                .unwrap();
        assert!(chunk.choices[0].delta.content.is_none());
    }

    #[test]
    fn test_describe_error_body_structured() {
        let body = describe_error_body(
            r#"{"error": {"type": "invalid_model", "message": "no such model"}}"#,
        );
        assert!(body.contains("invalid_model"));
        assert!(body.contains("no such model"));
    }

    #[test]
    fn test_describe_error_body_raw() {
        let body = describe_error_body("service unavailable");
        assert!(body.contains("service unavailable"));
    }
}

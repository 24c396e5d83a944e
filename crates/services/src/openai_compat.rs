//! OpenAI-compatible backend implementation.
//!
//! Works with: OpenAI, OpenRouter, Ollama, vLLM, and any endpoint exposing an
//! OpenAI-compatible `/v1/chat/completions` route.
//!
//! Supports:
//! - Chat completions (non-streaming and streaming SSE)
//! - Tool selection / function calling
//! - JSON response format
//! - A fixed-duration deadline raced against every request
//!
//! Every failure — HTTP status, network, timeout, malformed body — is
//! converted to an error-typed `Thought` here and never thrown to the agent
//! layer.

use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use sidekick_config::BackendConfig;
use sidekick_core::error::ServiceError;
use sidekick_core::message::{ChatMessage, MessageContent};
use sidekick_core::service::{CompletionRequest, ModelService, ResponseFormat, ToolsCallRequest};
use sidekick_core::thought::{Action, StreamChunk, Thought, ThoughtStream};
use std::time::Duration;
use tracing::{debug, trace, warn};

/// An OpenAI-compatible chat-completion backend.
pub struct OpenAiCompatService {
    name: String,
    base_url: String,
    api_key: String,
    model: String,
    tools_model: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl OpenAiCompatService {
    /// Create a new backend service.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .build()
            .expect("Failed to create HTTP client");

        let model = model.into();
        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            tools_model: model.clone(),
            model,
            timeout: Duration::from_secs(120),
            client,
        }
    }

    /// Build a backend from configuration.
    pub fn from_config(config: &BackendConfig) -> Self {
        let mut service = Self::new(
            "openai_compat",
            config.base_url.clone(),
            config.api_key.clone().unwrap_or_default(),
            config.model.clone(),
        );
        service.tools_model = config.tools_model().to_string();
        service.timeout = Duration::from_secs(config.timeout_secs);
        service
    }

    /// Override the request deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Override the tool-selection model.
    pub fn with_tools_model(mut self, model: impl Into<String>) -> Self {
        self.tools_model = model.into();
        self
    }

    /// Render messages for the wire, degrading multimodal parts to their
    /// first text part when multimodal is off.
    fn wire_messages(messages: &[ChatMessage], multimodal: bool) -> Vec<ChatMessage> {
        messages
            .iter()
            .map(|m| {
                if multimodal {
                    m.clone()
                } else {
                    match &m.content {
                        MessageContent::Parts(_) => {
                            let mut flat = m.clone();
                            flat.content = MessageContent::Text(m.content_text().to_string());
                            flat
                        }
                        MessageContent::Text(_) => m.clone(),
                    }
                }
            })
            .collect()
    }

    fn request_body(
        &self,
        model: &str,
        messages: &[ChatMessage],
        multimodal: bool,
        stream: bool,
        format: ResponseFormat,
        tools: Option<&ToolsCallRequest>,
    ) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": model,
            "messages": Self::wire_messages(messages, multimodal),
            "stream": stream,
        });

        if format == ResponseFormat::Json {
            body["response_format"] = serde_json::json!({ "type": "json_object" });
        }

        if let Some(req) = tools
            && !req.tools.is_empty()
        {
            body["tools"] = serde_json::json!(req.tools);
        }

        body
    }

    async fn post(
        &self,
        body: &serde_json::Value,
        sse: bool,
    ) -> Result<reqwest::Response, ServiceError> {
        let url = format!("{}/chat/completions", self.base_url);

        let mut request = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json");
        if sse {
            request = request.header("Accept", "text/event-stream");
        }

        // Race the request against the fixed deadline
        let response = tokio::time::timeout(self.timeout, request.json(body).send())
            .await
            .map_err(|_| ServiceError::Timeout(self.timeout.as_secs()))?
            .map_err(|e| ServiceError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        if status == 429 {
            return Err(ServiceError::RateLimited {
                retry_after_secs: 5,
            });
        }
        if status == 401 || status == 403 {
            return Err(ServiceError::AuthenticationFailed(
                "Invalid API key or insufficient permissions".into(),
            ));
        }
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Backend returned error");
            return Err(ServiceError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        Ok(response)
    }

    async fn complete_text(
        &self,
        body: serde_json::Value,
    ) -> Result<ApiResponse, ServiceError> {
        let response = self.post(&body, false).await?;
        let deadline = self.timeout;
        tokio::time::timeout(deadline, response.json::<ApiResponse>())
            .await
            .map_err(|_| ServiceError::Timeout(deadline.as_secs()))?
            .map_err(|e| ServiceError::ApiError {
                status_code: 200,
                message: format!("Failed to parse response: {e}"),
            })
    }

    /// Spawn a task forwarding parsed SSE chunks into a `ThoughtStream`.
    fn spawn_sse_reader(response: reqwest::Response) -> ThoughtStream {
        let (tx, rx) = tokio::sync::mpsc::channel::<StreamChunk>(64);

        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut buffer = String::new();

            while let Some(chunk_result) = byte_stream.next().await {
                let bytes = match chunk_result {
                    Ok(b) => b,
                    Err(e) => {
                        warn!(error = %e, "SSE byte stream interrupted");
                        return;
                    }
                };

                buffer.push_str(&String::from_utf8_lossy(&bytes));

                // Process complete lines
                while let Some(line_end) = buffer.find('\n') {
                    let line = buffer[..line_end].trim_end_matches('\r').to_string();
                    buffer = buffer[line_end + 1..].to_string();

                    // Skip empty lines and SSE comments
                    if line.is_empty() || line.starts_with(':') {
                        continue;
                    }

                    if let Some(data) = line.strip_prefix("data: ") {
                        let data = data.trim();
                        if data == "[DONE]" {
                            return;
                        }

                        // Malformed chunks are tolerated as empty deltas
                        let chunk = serde_json::from_str::<StreamChunk>(data).unwrap_or_else(|e| {
                            trace!(data = %data, error = %e, "Unparseable SSE chunk");
                            StreamChunk::empty()
                        });

                        if tx.send(chunk).await.is_err() {
                            return; // receiver dropped
                        }
                    }
                }
            }
        });

        ThoughtStream::new(rx)
    }

    fn error_thought(&self, err: ServiceError) -> Thought {
        warn!(service = %self.name, error = %err, "Backend call failed");
        Thought::Error(err.to_string())
    }
}

#[async_trait]
impl ModelService for OpenAiCompatService {
    fn name(&self) -> &str {
        &self.name
    }

    async fn chat_completion(&self, request: CompletionRequest) -> Thought {
        let body = self.request_body(
            &self.model,
            &request.messages,
            request.multimodal,
            request.stream,
            request.format,
            None,
        );

        debug!(service = %self.name, model = %self.model, stream = request.stream, "Completion request");

        if request.stream {
            match self.post(&body, true).await {
                Ok(response) => Thought::Stream(Self::spawn_sse_reader(response)),
                Err(e) => self.error_thought(e),
            }
        } else {
            match self.complete_text(body).await {
                Ok(api) => match api.choices.into_iter().next() {
                    Some(choice) => Thought::Message(choice.message.content.unwrap_or_default()),
                    None => self.error_thought(ServiceError::ApiError {
                        status_code: 200,
                        message: "No choices in response".into(),
                    }),
                },
                Err(e) => self.error_thought(e),
            }
        }
    }

    async fn tools_call(&self, request: ToolsCallRequest) -> Thought {
        // Tool selection is always buffered: actions cannot be dispatched
        // partially, so the wire request is non-streaming even when the
        // caller asked for a streamed answer.
        let body = self.request_body(
            &self.tools_model,
            &request.messages,
            false,
            false,
            request.format,
            Some(&request),
        );

        debug!(
            service = %self.name,
            model = %self.tools_model,
            tools = request.tools.len(),
            "Tool selection request"
        );

        match self.complete_text(body).await {
            Ok(api) => {
                let Some(choice) = api.choices.into_iter().next() else {
                    return self.error_thought(ServiceError::ApiError {
                        status_code: 200,
                        message: "No choices in response".into(),
                    });
                };

                let tool_calls = choice.message.tool_calls.unwrap_or_default();
                if tool_calls.is_empty() {
                    // The model answered directly instead of selecting a tool
                    return Thought::Message(choice.message.content.unwrap_or_default());
                }

                let actions = tool_calls
                    .into_iter()
                    .map(|tc| {
                        let arguments = serde_json::from_str(&tc.function.arguments)
                            .unwrap_or_else(|e| {
                                warn!(
                                    tool = %tc.function.name,
                                    error = %e,
                                    "Tool call arguments were not valid JSON"
                                );
                                serde_json::json!({})
                            });
                        Action::new(tc.function.name, arguments)
                    })
                    .collect();

                Thought::Actions(actions)
            }
            Err(e) => self.error_thought(e),
        }
    }
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    content: Option<String>,

    #[serde(default)]
    tool_calls: Option<Vec<ApiToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ApiToolCall {
    function: ApiFunction,
}

#[derive(Debug, Deserialize)]
struct ApiFunction {
    name: String,
    arguments: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use sidekick_core::message::ContentPart;
    use sidekick_core::tool::Tool;

    fn service() -> OpenAiCompatService {
        OpenAiCompatService::new("test", "http://localhost:9/v1", "sk-test", "test-model")
    }

    #[test]
    fn base_url_trailing_slash_trimmed() {
        let svc = OpenAiCompatService::new("t", "http://host/v1/", "k", "m");
        assert_eq!(svc.base_url, "http://host/v1");
    }

    #[test]
    fn from_config_carries_models_and_timeout() {
        let config = BackendConfig {
            base_url: "http://host/v1".into(),
            api_key: Some("k".into()),
            model: "answer-model".into(),
            tools_model: Some("select-model".into()),
            timeout_secs: 7,
        };
        let svc = OpenAiCompatService::from_config(&config);
        assert_eq!(svc.model, "answer-model");
        assert_eq!(svc.tools_model, "select-model");
        assert_eq!(svc.timeout, Duration::from_secs(7));
    }

    #[test]
    fn request_body_includes_tools_when_present() {
        let svc = service();
        let tools_req = ToolsCallRequest::new(
            vec![ChatMessage::user("hi")],
            vec![Tool::new("search", "Search the web", &["query"]).function()],
        );
        let body = svc.request_body(
            "m",
            &tools_req.messages,
            false,
            false,
            ResponseFormat::Text,
            Some(&tools_req),
        );
        assert_eq!(body["tools"][0]["type"], "function");
        assert_eq!(body["tools"][0]["function"]["name"], "search");
    }

    #[test]
    fn request_body_json_format() {
        let svc = service();
        let body = svc.request_body(
            "m",
            &[ChatMessage::user("hi")],
            false,
            false,
            ResponseFormat::Json,
            None,
        );
        assert_eq!(body["response_format"]["type"], "json_object");
    }

    #[test]
    fn multimodal_off_degrades_parts_to_text() {
        let messages = vec![ChatMessage::user_parts(vec![
            ContentPart::Image {
                url: "data:image/png;base64,AAAA".into(),
            },
            ContentPart::Text {
                text: "what is shown?".into(),
            },
        ])];
        let wire = OpenAiCompatService::wire_messages(&messages, false);
        assert_eq!(
            wire[0].content,
            MessageContent::Text("what is shown?".into())
        );

        let wire = OpenAiCompatService::wire_messages(&messages, true);
        assert!(matches!(wire[0].content, MessageContent::Parts(_)));
    }

    #[test]
    fn api_response_with_tool_calls_parses() {
        let raw = r#"{
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {"name": "search", "arguments": "{\"query\": \"cats\"}"}
                    }]
                }
            }]
        }"#;
        let parsed: ApiResponse = serde_json::from_str(raw).unwrap();
        let tc = &parsed.choices[0].message.tool_calls.as_ref().unwrap()[0];
        assert_eq!(tc.function.name, "search");
    }

    #[tokio::test]
    async fn unreachable_backend_yields_error_thought() {
        // Port 9 (discard) — connection refused, surfaced as an error thought
        let svc = service().with_timeout(Duration::from_secs(2));
        let thought = svc
            .chat_completion(CompletionRequest::new(vec![ChatMessage::user("hi")]))
            .await;
        match thought {
            Thought::Error(message) => assert!(!message.is_empty()),
            other => panic!("Expected error thought, got {}", other.kind()),
        }
    }

    #[tokio::test]
    async fn unreachable_backend_tools_call_yields_error_thought() {
        let svc = service().with_timeout(Duration::from_secs(2));
        let thought = svc
            .tools_call(ToolsCallRequest::new(vec![ChatMessage::user("hi")], vec![]))
            .await;
        assert!(matches!(thought, Thought::Error(_)));
    }
}

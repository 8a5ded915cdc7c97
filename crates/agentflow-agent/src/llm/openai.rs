//! OpenAI-compatible chat model.
//!
//! Talks to the **Chat Completions API** (and compatible endpoints such as
//! Ollama, vLLM, or Together) in both non-streaming and SSE streaming modes.
//! Supports schema-constrained JSON (`response_format`), tools, and
//! `tool_choice`.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde_json::{Value, json};

use crate::config::LlmConfig;
use crate::error::{AgentError, Result};
use crate::llm::model::{LlmModel, TextStream};
use crate::llm::streaming_openai::{LineBuffer, OpenAiStreamAccumulator};
use crate::llm::types::{
    LlmInput, LlmOutput, Message, ResponseFormat, Role, ToolCall, ToolChoice, ToolDefinition,
};

/// Timeout for a whole model call, streaming included.
const MODEL_TIMEOUT_SECS: u64 = 120;

// ---------------------------------------------------------------------------
// Model
// ---------------------------------------------------------------------------

/// A [`LlmModel`] backed by an OpenAI-compatible HTTP endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiModel {
    config: LlmConfig,
    http: reqwest::Client,
}

impl OpenAiModel {
    /// Create a model client from configuration.
    pub fn new(config: LlmConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(MODEL_TIMEOUT_SECS))
            .build()
            .map_err(|e| AgentError::LlmRequestFailed {
                reason: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self { config, http })
    }

    /// The configuration this client was built with.
    pub fn config(&self) -> &LlmConfig {
        &self.config
    }

    /// Build the JSON request body.
    pub fn build_request_body(&self, input: &LlmInput, stream: bool) -> Value {
        let settings = input.model_settings.clone().unwrap_or_default();

        let mut body = json!({
            "model": settings.model.as_deref().unwrap_or(&self.config.model),
            "messages": messages_to_openai(&input.messages),
        });

        if let Some(max_tokens) = settings.max_tokens.or(self.config.max_tokens) {
            body["max_tokens"] = json!(max_tokens);
        }
        if let Some(temperature) = settings.temperature.or(self.config.temperature) {
            body["temperature"] = json!(temperature);
        }
        if let Some(top_p) = settings.top_p {
            body["top_p"] = json!(top_p);
        }
        if !input.tools.is_empty() {
            body["tools"] = tools_to_openai(&input.tools);
        }
        if let Some(choice) = &input.tool_choice {
            body["tool_choice"] = tool_choice_to_openai(choice);
        }
        if let Some(format) = &input.response_format {
            body["response_format"] = response_format_to_openai(format);
        }
        if stream {
            body["stream"] = json!(true);
        }

        body
    }

    async fn send(&self, body: &Value) -> Result<reqwest::Response> {
        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(key) = self.config.api_key.as_deref() {
            let value = HeaderValue::from_str(&format!("Bearer {key}")).map_err(|e| {
                AgentError::LlmRequestFailed {
                    reason: format!("invalid authorization header: {e}"),
                }
            })?;
            headers.insert(AUTHORIZATION, value);
        }

        tracing::debug!(url = %url, model = %body["model"], "sending LLM request");

        let resp = self
            .http
            .post(&url)
            .headers(headers)
            .json(body)
            .send()
            .await
            .map_err(|e| AgentError::LlmRequestFailed {
                reason: e.to_string(),
            })?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            let reason = serde_json::from_str::<Value>(&text)
                .ok()
                .and_then(|v| v["error"]["message"].as_str().map(str::to_owned))
                .unwrap_or(text);
            return Err(AgentError::LlmRequestFailed {
                reason: format!("API returned {status}: {reason}"),
            });
        }

        Ok(resp)
    }
}

#[async_trait]
impl LlmModel for OpenAiModel {
    async fn chat(&self, input: &LlmInput) -> Result<LlmOutput> {
        let body = self.build_request_body(input, false);
        let resp = self.send(&body).await?;
        let v: Value = resp.json().await.map_err(|e| AgentError::ModelResponse {
            reason: format!("invalid JSON response: {e}"),
        })?;
        parse_openai_response(&v)
    }

    async fn stream_chat(&self, input: &LlmInput) -> Result<TextStream> {
        let body = self.build_request_body(input, true);
        let resp = self.send(&body).await?;

        let stream = async_stream::try_stream! {
            let mut accumulator = OpenAiStreamAccumulator::new();
            let mut lines = LineBuffer::new();
            let mut bytes = resp.bytes_stream();

            'read: while let Some(chunk) = bytes.next().await {
                let chunk = chunk.map_err(|e| AgentError::LlmRequestFailed {
                    reason: format!("stream read error: {e}"),
                })?;
                for line in lines.push(&chunk)? {
                    if let Some(text) = accumulator.feed_line(&line)? {
                        yield text;
                    }
                    if accumulator.is_done() {
                        break 'read;
                    }
                }
            }

            if !accumulator.is_done() {
                if let Some(rest) = lines.finish()? {
                    if let Some(text) = accumulator.feed_line(&rest)? {
                        yield text;
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }
}

// ---------------------------------------------------------------------------
// Wire format conversion
// ---------------------------------------------------------------------------

/// Convert messages into the Chat Completions wire format.
pub fn messages_to_openai(messages: &[Message]) -> Vec<Value> {
    messages
        .iter()
        .map(|msg| match msg.role {
            Role::System => json!({ "role": "system", "content": msg.content }),
            Role::User => json!({ "role": "user", "content": msg.content }),
            Role::Assistant if msg.tool_calls.is_empty() => {
                json!({ "role": "assistant", "content": msg.content })
            }
            Role::Assistant => {
                let tool_calls: Vec<Value> = msg
                    .tool_calls
                    .iter()
                    .map(|tc| {
                        json!({
                            "id": tc.id,
                            "type": "function",
                            "function": {
                                "name": tc.name,
                                "arguments": tc.arguments.to_string(),
                            }
                        })
                    })
                    .collect();
                let mut m = json!({ "role": "assistant", "tool_calls": tool_calls });
                if !msg.content.is_empty() {
                    m["content"] = json!(msg.content);
                }
                m
            }
            Role::Tool => json!({
                "role": "tool",
                "tool_call_id": msg.tool_call_id,
                "content": msg.content,
            }),
        })
        .collect()
}

/// Convert tool definitions into the Chat Completions format.
pub fn tools_to_openai(tools: &[ToolDefinition]) -> Value {
    let tools: Vec<Value> = tools
        .iter()
        .map(|t| {
            let mut function = json!({ "name": t.name, "parameters": t.parameters });
            if let Some(description) = &t.description {
                function["description"] = json!(description);
            }
            json!({ "type": "function", "function": function })
        })
        .collect();
    json!(tools)
}

fn tool_choice_to_openai(choice: &ToolChoice) -> Value {
    match choice {
        ToolChoice::Auto => json!("auto"),
        ToolChoice::None => json!("none"),
        ToolChoice::Required => json!("required"),
        ToolChoice::Function(name) => json!({ "type": "function", "function": { "name": name } }),
    }
}

fn response_format_to_openai(format: &ResponseFormat) -> Value {
    match format {
        ResponseFormat::Text => json!({ "type": "text" }),
        ResponseFormat::JsonSchema {
            name,
            schema,
            strict,
        } => json!({
            "type": "json_schema",
            "json_schema": { "name": name, "schema": schema, "strict": strict },
        }),
    }
}

/// Parse a non-streaming Chat Completions response.
pub fn parse_openai_response(v: &Value) -> Result<LlmOutput> {
    let message = &v["choices"][0]["message"];
    if message.is_null() {
        return Err(AgentError::ModelResponse {
            reason: "missing `choices[0].message` in response".into(),
        });
    }

    let tool_calls = message["tool_calls"]
        .as_array()
        .map(Vec::as_slice)
        .unwrap_or_default()
        .iter()
        .map(|tc| {
            let func = &tc["function"];
            let name = func["name"].as_str().unwrap_or_default().to_owned();
            let args = func["arguments"].as_str().unwrap_or("{}");
            let arguments: Value =
                serde_json::from_str(args).map_err(|e| AgentError::ModelResponse {
                    reason: format!("invalid JSON in tool call `{name}` arguments: {e}"),
                })?;
            Ok(ToolCall {
                id: tc["id"].as_str().unwrap_or_default().to_owned(),
                name,
                arguments,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(LlmOutput {
        text: message["content"]
            .as_str()
            .filter(|s| !s.is_empty())
            .map(str::to_owned),
        tool_calls,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

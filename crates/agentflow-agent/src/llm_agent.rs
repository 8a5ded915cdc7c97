//! LLM-backed agent.
//!
//! An [`LlmAgent`] renders its message templates against the input (and
//! any loaded memories), then issues up to two independent model calls:
//!
//! - a schema-constrained JSON call when structured outputs are declared,
//! - a streaming text call when the `$text` output is declared.
//!
//! In streaming mode every text fragment is forwarded as it arrives, and
//! once both calls have completed exactly one terminal chunk carrying the
//! parsed JSON is emitted.

use agentflow_core::{OrderedRecord, RunChunk, outputs_to_json_schema, render};
use futures::{FutureExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::context::Context;
use crate::error::{AgentError, Result};
use crate::llm::{LlmInput, LlmOutput, Message, MessageTemplate, ModelSettings, ResponseFormat};
use crate::memory::Memories;
use crate::runnable::{Agent, ChunkStream, RunInput, RunnableDefinition, RunnableInfo};

/// Name given to the response schema sent with JSON calls.
const RESPONSE_SCHEMA_NAME: &str = "output";

/// Definition of an [`LlmAgent`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmAgentDefinition {
    #[serde(flatten)]
    pub base: RunnableDefinition,
    /// Message templates, rendered in order.
    #[serde(default)]
    pub messages: OrderedRecord<MessageTemplate>,
    /// Sampling settings for every call this agent makes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_settings: Option<ModelSettings>,
}

/// An agent that answers with one or two model calls.
#[derive(Debug)]
pub struct LlmAgent {
    info: RunnableInfo,
    messages: OrderedRecord<MessageTemplate>,
    model_settings: Option<ModelSettings>,
}

impl LlmAgent {
    pub fn new(definition: LlmAgentDefinition) -> Self {
        Self {
            info: RunnableInfo::new(definition.base),
            messages: definition.messages,
            model_settings: definition.model_settings,
        }
    }

    /// Render every message template.
    ///
    /// Memories are addressable by binding id and name; input values win on
    /// a key collision.
    pub fn render_messages(&self, input: &RunInput, memories: &Memories) -> Result<Vec<Message>> {
        render_messages(&self.messages, input, memories)
    }

    /// Whether a free-text call is wanted.  An agent with no declared
    /// outputs answers in text.
    fn wants_text(&self) -> bool {
        self.info.text_output().is_some() || self.info.outputs().is_empty()
    }

    fn json_request(&self, messages: Vec<Message>) -> Option<LlmInput> {
        let mut structured = self.info.structured_outputs().peekable();
        structured.peek()?;
        Some(LlmInput {
            messages,
            response_format: Some(ResponseFormat::JsonSchema {
                name: RESPONSE_SCHEMA_NAME.into(),
                schema: outputs_to_json_schema(structured),
                strict: true,
            }),
            model_settings: self.model_settings.clone(),
            ..LlmInput::default()
        })
    }
}

/// Render message templates against memories overlaid with input.
pub fn render_messages(
    templates: &OrderedRecord<MessageTemplate>,
    input: &RunInput,
    memories: &Memories,
) -> Result<Vec<Message>> {
    if templates.is_empty() {
        return Err(AgentError::MissingMessages);
    }

    let mut variables = memories.clone();
    variables.extend(input.iter().map(|(k, v)| (k.clone(), v.clone())));

    Ok(templates
        .iter()
        .map(|template| Message::new(template.role, render(&template.content, &variables)))
        .collect())
}

/// Parse the JSON object a schema-constrained call returned.
pub fn parse_json_output(output: LlmOutput) -> Result<Map<String, Value>> {
    let text = output.text.ok_or_else(|| AgentError::ModelResponse {
        reason: "JSON content is missing from the model response".into(),
    })?;
    match serde_json::from_str(&text)? {
        Value::Object(map) => Ok(map),
        other => Err(AgentError::ModelResponse {
            reason: format!("expected a JSON object, got {other}"),
        }),
    }
}

impl Agent for LlmAgent {
    fn agent_info(&self) -> &RunnableInfo {
        &self.info
    }

    fn process<'a>(
        &'a self,
        input: RunInput,
        context: &'a Context,
        memories: Memories,
    ) -> ChunkStream<'a> {
        Box::pin(async_stream::try_stream! {
            let model = context.services().model()?;
            let messages = self.render_messages(&input, &memories)?;

            // The JSON call runs concurrently with the text stream.  Dropping
            // the handle cancels it.
            let json_call = match self.json_request(messages.clone()) {
                Some(request) => {
                    let model = model.clone();
                    let (task, handle) = async move {
                        let output = model.chat(&request).await?;
                        parse_json_output(output)
                    }
                    .remote_handle();
                    tokio::spawn(task);
                    Some(handle)
                }
                None => None,
            };

            let mut reply = String::new();
            if self.wants_text() {
                let request = LlmInput {
                    messages: messages.clone(),
                    model_settings: self.model_settings.clone(),
                    ..LlmInput::default()
                };
                let mut text = model.stream_chat(&request).await?;
                while let Some(fragment) = text.next().await {
                    let fragment = fragment?;
                    reply.push_str(&fragment);
                    yield RunChunk::text(fragment);
                }
            }

            let json = match json_call {
                Some(handle) => handle.await?,
                None => Map::new(),
            };

            if !reply.is_empty() {
                let mut conversation = messages;
                conversation.push(Message::assistant(reply));
                self.update_memories(&conversation, context).await?;
            }

            tracing::debug!(agent_id = %self.info.id(), fields = json.len(), "llm agent completed");
            yield RunChunk::delta(json);
        })
    }
}

//! LLM-routed single-branch dispatch.
//!
//! An [`LlmDecisionAgent`] offers every case to the model as a tool and
//! forces a tool call.  The first call picks the case; its sub-runnable then
//! runs with the decision agent's own input, untouched.

use agentflow_core::{Identified, OrderedRecord, outputs_to_json_schema};
use futures::StreamExt;
use serde::{Deserialize, Serialize};

use crate::context::Context;
use crate::definition::RunnableRef;
use crate::error::{AgentError, Result};
use crate::llm::{LlmInput, MessageTemplate, ModelSettings, ToolChoice, ToolDefinition};
use crate::llm_agent::render_messages;
use crate::memory::Memories;
use crate::registry::Registry;
use crate::runnable::{Agent, ChunkStream, RunInput, RunnableDefinition, RunnableInfo};

/// One branch a decision can take.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionCase {
    pub id: String,
    /// Tool name offered to the model; defaults to the runnable's name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub runnable: RunnableRef,
}

impl Identified for DecisionCase {
    fn id(&self) -> &str {
        &self.id
    }
}

/// Definition of an [`LlmDecisionAgent`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionAgentDefinition {
    #[serde(flatten)]
    pub base: RunnableDefinition,
    #[serde(default)]
    pub messages: OrderedRecord<MessageTemplate>,
    #[serde(default)]
    pub cases: OrderedRecord<DecisionCase>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_settings: Option<ModelSettings>,
}

/// A case with its tool precomputed.
#[derive(Debug)]
struct Route {
    tool: ToolDefinition,
    runnable: RunnableRef,
}

/// Lets the model choose which case handles the input.
#[derive(Debug)]
pub struct LlmDecisionAgent {
    info: RunnableInfo,
    messages: OrderedRecord<MessageTemplate>,
    model_settings: Option<ModelSettings>,
    routes: Vec<Route>,
}

impl LlmDecisionAgent {
    /// Validate `definition` against `registry` and build the agent.
    pub fn new(definition: DecisionAgentDefinition, registry: &Registry) -> Result<Self> {
        let id = definition.base.id.clone();
        if definition.cases.is_empty() {
            return Err(AgentError::InvalidDefinition {
                id,
                reason: "at least one case is required".into(),
            });
        }

        let mut routes: Vec<Route> = Vec::with_capacity(definition.cases.len());
        for case in &definition.cases {
            let sub = case.runnable.validate(registry)?;
            let name = case.name.clone().unwrap_or_else(|| sub.name().to_owned());
            if routes.iter().any(|r| r.tool.name == name) {
                return Err(AgentError::InvalidDefinition {
                    id,
                    reason: format!("duplicate case name `{name}`"),
                });
            }
            routes.push(Route {
                tool: ToolDefinition {
                    name,
                    description: case
                        .description
                        .clone()
                        .or_else(|| sub.description().map(str::to_owned)),
                    parameters: outputs_to_json_schema(sub.definition().inputs.iter()),
                },
                runnable: case.runnable.clone(),
            });
        }

        Ok(Self {
            info: RunnableInfo::new(definition.base),
            messages: definition.messages,
            model_settings: definition.model_settings,
            routes,
        })
    }

    /// Tool names offered to the model, in case order.
    pub fn tool_names(&self) -> impl Iterator<Item = &str> {
        self.routes.iter().map(|r| r.tool.name.as_str())
    }
}

impl Agent for LlmDecisionAgent {
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
            let request = LlmInput {
                messages: render_messages(&self.messages, &input, &memories)?,
                tools: self.routes.iter().map(|r| r.tool.clone()).collect(),
                tool_choice: Some(ToolChoice::Required),
                model_settings: self.model_settings.clone(),
                ..LlmInput::default()
            };

            let output = model.chat(&request).await?;
            // Only the first call is honored.
            let call = output.tool_calls.into_iter().next().ok_or(AgentError::NoToolCall)?;
            let route = self
                .routes
                .iter()
                .find(|r| r.tool.name == call.name)
                .ok_or_else(|| AgentError::UnknownCase { name: call.name.clone() })?;
            tracing::debug!(agent_id = %self.info.id(), case = %call.name, "case selected");

            let runnable = context.resolve(&route.runnable)?;
            let mut chunks = runnable.stream(input, context);
            while let Some(chunk) = chunks.next().await {
                yield chunk?;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn registry() -> Registry {
        let registry = Registry::new();
        for (id, name) in [("a", "Summarize"), ("b", "Translate")] {
            registry.register_definition(
                serde_json::from_value(json!({
                    "type": "function",
                    "id": id,
                    "name": name,
                    "description": format!("{name} the text"),
                    "inputs": [{ "id": "t", "name": "text", "type": "string", "required": true }],
                    "code": "return {}"
                }))
                .unwrap(),
            );
        }
        registry
    }

    fn definition(cases: Value) -> DecisionAgentDefinition {
        serde_json::from_value(json!({
            "id": "router",
            "messages": [{ "id": "m", "role": "user", "content": "{{text}}" }],
            "cases": cases
        }))
        .unwrap()
    }

    #[test]
    fn tool_names_default_to_runnable_names() {
        let agent = LlmDecisionAgent::new(
            definition(json!([
                { "id": "case1", "runnable": "a" },
                { "id": "case2", "name": "translate_it", "runnable": "b" }
            ])),
            &registry(),
        )
        .unwrap();
        let names: Vec<_> = agent.tool_names().collect();
        assert_eq!(names, vec!["Summarize", "translate_it"]);
        assert_eq!(agent.routes[0].tool.description.as_deref(), Some("Summarize the text"));
        assert_eq!(agent.routes[0].tool.parameters["required"], json!(["text"]));
    }

    #[test]
    fn rejects_unknown_runnable_and_empty_cases() {
        let err = LlmDecisionAgent::new(
            definition(json!([{ "id": "case1", "runnable": "zzz" }])),
            &registry(),
        )
        .unwrap_err();
        assert!(matches!(err, AgentError::UnresolvedRunnable { .. }));

        let err = LlmDecisionAgent::new(definition(json!([])), &registry()).unwrap_err();
        assert!(matches!(err, AgentError::InvalidDefinition { .. }));
    }

    #[test]
    fn rejects_inline_decision_with_unknown_runnable() {
        let err = LlmDecisionAgent::new(
            definition(json!([
                { "id": "case1", "runnable": "a" },
                {
                    "id": "case2",
                    "runnable": {
                        "type": "decision",
                        "id": "inner",
                        "messages": [{ "id": "m", "role": "user", "content": "x" }],
                        "cases": [{ "id": "c", "runnable": "zzz" }]
                    }
                }
            ])),
            &registry(),
        )
        .unwrap_err();
        assert!(matches!(err, AgentError::UnresolvedRunnable { ref id } if id == "zzz"));
    }

    #[test]
    fn rejects_duplicate_tool_names() {
        let err = LlmDecisionAgent::new(
            definition(json!([
                { "id": "case1", "runnable": "a" },
                { "id": "case2", "name": "Summarize", "runnable": "b" }
            ])),
            &registry(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("duplicate case name"));
    }
}

//! Sequential multi-step composition.
//!
//! A [`PipelineAgent`] runs its processes strictly one after another.  Each
//! process reads its inputs from a variable graph seeded with the pipeline
//! input (keyed by input id) and grown with every process's reconstructed
//! output (keyed by process id).
//!
//! Streaming behavior:
//!
//! - text from the process that feeds the pipeline's `$text` output is
//!   forwarded as it arrives;
//! - every JSON delta from any process triggers a full recomputation of the
//!   pipeline's structured outputs, emitted as a new delta.

use std::collections::HashMap;

use agentflow_core::{Identified, OrderedRecord, OutputCollector, RunChunk, TEXT_KEY};
use futures::StreamExt;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::context::Context;
use crate::definition::RunnableRef;
use crate::error::{AgentError, Result};
use crate::memory::Memories;
use crate::registry::Registry;
use crate::runnable::{Agent, ChunkStream, RunInput, RunOutput, RunnableDefinition, RunnableInfo};

// ---------------------------------------------------------------------------
// Definition
// ---------------------------------------------------------------------------

/// A pointer into the variable graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableRef {
    /// A pipeline input id or an earlier process id.
    pub from_variable_id: String,
    /// Keys (or array indexes) to drill into, in order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub from_variable_property_path: Vec<String>,
}

impl VariableRef {
    pub fn new(from_variable_id: impl Into<String>) -> Self {
        Self {
            from_variable_id: from_variable_id.into(),
            from_variable_property_path: Vec::new(),
        }
    }

    /// Builder: append one path segment.
    #[must_use]
    pub fn at(mut self, segment: impl Into<String>) -> Self {
        self.from_variable_property_path.push(segment.into());
        self
    }

    /// Whether this points at a process's free text.
    fn is_text_of(&self, process_id: &str) -> bool {
        self.from_variable_id == process_id
            && matches!(self.from_variable_property_path.as_slice(), [key] if key == TEXT_KEY)
    }

    /// Read the referenced value, if present.
    fn resolve<'v>(&self, variables: &'v HashMap<String, Value>) -> Option<&'v Value> {
        let mut value = variables.get(&self.from_variable_id)?;
        for segment in &self.from_variable_property_path {
            value = match value {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        (!value.is_null()).then_some(value)
    }
}

/// One step of a pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineProcess {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// The sub-runnable, by id or inline.
    pub runnable: RunnableRef,
    /// Sub-runnable input id (or name) to the variable that feeds it.
    #[serde(default)]
    pub input: IndexMap<String, VariableRef>,
}

impl Identified for PipelineProcess {
    fn id(&self) -> &str {
        &self.id
    }
}

/// Definition of a [`PipelineAgent`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineAgentDefinition {
    #[serde(flatten)]
    pub base: RunnableDefinition,
    #[serde(default)]
    pub processes: OrderedRecord<PipelineProcess>,
    /// Pipeline output id to the variable that feeds it.
    #[serde(default)]
    pub output_variables: IndexMap<String, VariableRef>,
}

// ---------------------------------------------------------------------------
// Agent
// ---------------------------------------------------------------------------

/// A validated process: input bindings keyed by the sub-runnable's input
/// names.
#[derive(Debug)]
struct Step {
    process: PipelineProcess,
    bindings: Vec<(String, VariableRef)>,
}

/// Runs processes in order over a shared variable graph.
#[derive(Debug)]
pub struct PipelineAgent {
    info: RunnableInfo,
    steps: Vec<Step>,
    /// Output name to binding, excluding a live-forwarded `$text`.
    outputs: Vec<(String, VariableRef)>,
    /// The process whose text is forwarded live.
    text_source: Option<String>,
}

impl PipelineAgent {
    /// Validate `definition` against `registry` and build the agent.
    pub fn new(definition: PipelineAgentDefinition, registry: &Registry) -> Result<Self> {
        let id = definition.base.id.clone();
        let invalid = |reason: String| AgentError::InvalidDefinition { id: id.clone(), reason };

        // Variables visible to the next process.
        let mut known: Vec<&str> = definition.base.inputs.ids().collect();

        let mut steps = Vec::with_capacity(definition.processes.len());
        for process in &definition.processes {
            let sub = process.runnable.validate(registry)?;

            let mut bindings = Vec::with_capacity(process.input.len());
            for (key, variable) in &process.input {
                let Some(target) = sub.definition().inputs.get(key).or_else(|| sub.input(key)) else {
                    tracing::warn!(
                        agent_id = %id,
                        process_id = %process.id,
                        input = %key,
                        "binding for unknown input ignored"
                    );
                    continue;
                };
                if !known.contains(&variable.from_variable_id.as_str()) {
                    return Err(invalid(format!(
                        "process `{}` reads unknown variable `{}`",
                        process.id, variable.from_variable_id
                    )));
                }
                bindings.push((target.key().to_owned(), variable.clone()));
            }

            for required in sub.definition().inputs.iter().filter(|dt| dt.required) {
                if !bindings.iter().any(|(name, _)| name == required.key()) {
                    return Err(invalid(format!(
                        "process `{}` does not bind required input `{}`",
                        process.id,
                        required.key()
                    )));
                }
            }

            known.push(&process.id);
            steps.push(Step {
                process: process.clone(),
                bindings,
            });
        }

        let mut outputs = Vec::new();
        let mut text_source = None;
        for (output_id, variable) in &definition.output_variables {
            let Some(output) = definition.base.outputs.get(output_id) else {
                return Err(invalid(format!("binding for undeclared output `{output_id}`")));
            };
            if !known.contains(&variable.from_variable_id.as_str()) {
                return Err(invalid(format!(
                    "output `{}` reads unknown variable `{}`",
                    output.key(),
                    variable.from_variable_id
                )));
            }
            let forwarded = output.key() == TEXT_KEY
                && definition
                    .processes
                    .iter()
                    .any(|p| variable.is_text_of(&p.id));
            if forwarded {
                text_source = Some(variable.from_variable_id.clone());
            } else {
                outputs.push((output.key().to_owned(), variable.clone()));
            }
        }

        Ok(Self {
            info: RunnableInfo::new(definition.base),
            steps,
            outputs,
            text_source,
        })
    }

    /// Seed the variable graph from the name-keyed pipeline input.
    fn seed_variables(&self, input: &RunInput) -> HashMap<String, Value> {
        self.info
            .definition()
            .inputs
            .iter()
            .filter_map(|dt| Some((dt.id.clone(), input.get(dt.key())?.clone())))
            .collect()
    }

    /// The structured outputs for the current variable values.
    fn compute_outputs(&self, variables: &HashMap<String, Value>) -> RunOutput {
        self.outputs
            .iter()
            .filter_map(|(name, variable)| Some((name.clone(), variable.resolve(variables)?.clone())))
            .collect()
    }
}

impl Agent for PipelineAgent {
    fn agent_info(&self) -> &RunnableInfo {
        &self.info
    }

    fn process<'a>(
        &'a self,
        input: RunInput,
        context: &'a Context,
        _memories: Memories,
    ) -> ChunkStream<'a> {
        Box::pin(async_stream::try_stream! {
            let mut variables = self.seed_variables(&input);

            for step in &self.steps {
                let process_id = step.process.id.as_str();
                let runnable = context.resolve(&step.process.runnable)?;

                let step_input: Map<String, Value> = step
                    .bindings
                    .iter()
                    .filter_map(|(name, variable)| {
                        Some((name.clone(), variable.resolve(&variables)?.clone()))
                    })
                    .collect();
                tracing::debug!(
                    agent_id = %self.info.id(),
                    process_id,
                    runnable_id = %runnable.info().id(),
                    "process started"
                );

                let forwards_text = self.text_source.as_deref() == Some(process_id);
                let mut collector = OutputCollector::new();
                let mut saw_delta = false;

                let mut chunks = runnable.stream(step_input, context);
                while let Some(chunk) = chunks.next().await {
                    let chunk = chunk?;
                    collector.push(&chunk);
                    variables.insert(process_id.to_owned(), Value::Object(collector.snapshot()));

                    if forwards_text {
                        if let Some(text) = chunk.text.filter(|t| !t.is_empty()) {
                            yield RunChunk::text(text);
                        }
                    }
                    if chunk.delta.is_some() {
                        saw_delta = true;
                        yield RunChunk::delta(self.compute_outputs(&variables));
                    }
                }
                drop(chunks);

                // Outputs bound to a process's text only become visible once
                // that text is complete.
                if !saw_delta && !collector.text().is_empty() {
                    let outputs = self.compute_outputs(&variables);
                    if !outputs.is_empty() {
                        yield RunChunk::delta(outputs);
                    }
                }
                tracing::debug!(agent_id = %self.info.id(), process_id, "process finished");
            }
        })
    }
}

//! The uniform execution contract.
//!
//! Every executable unit implements [`Runnable`]: it exposes its typed
//! definition through [`RunnableInfo`] and produces a lazily evaluated
//! [`ChunkStream`].  Non-streaming results are always derived from the
//! stream with the [`OutputCollector`] reconstruction rule, so the two
//! modes cannot disagree.
//!
//! [`Agent`] adds memory around the contract: the blanket implementation
//! loads memories, then delegates to [`Agent::process`].

use std::pin::Pin;

use agentflow_core::{DataType, OrderedRecord, OutputCollector, RunChunk, TEXT_KEY};
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::context::Context;
use crate::error::Result;
use crate::memory::{self, MemoryBinding, Memories};

/// Name-keyed runtime input of a runnable.
pub type RunInput = Map<String, Value>;

/// Name-keyed final result of a runnable.
pub type RunOutput = Map<String, Value>;

/// An ordered, finite, non-restartable stream of result chunks.
///
/// Errors travel as stream items; a consumer stops at the first one.
pub type ChunkStream<'a> = Pin<Box<dyn Stream<Item = Result<RunChunk>> + Send + 'a>>;

// ---------------------------------------------------------------------------
// Definition
// ---------------------------------------------------------------------------

/// The part every runnable definition shares.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunnableDefinition {
    /// Unique id used for registration and references.
    pub id: String,
    /// Display name; also the default tool name when used as a case.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Declared inputs, keyed by id.
    #[serde(default)]
    pub inputs: OrderedRecord<DataType>,
    /// Declared outputs, keyed by id.  An output named `$text` is the
    /// free-text output.
    #[serde(default)]
    pub outputs: OrderedRecord<DataType>,
    /// Memory stores consulted before the runnable processes its input.
    #[serde(default, skip_serializing_if = "OrderedRecord::is_empty")]
    pub memories: OrderedRecord<MemoryBinding>,
}

impl RunnableDefinition {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Builder: set the display name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Builder: set the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Builder: declare an input.
    pub fn with_input(mut self, input: DataType) -> Result<Self> {
        self.inputs.push(input)?;
        Ok(self)
    }

    /// Builder: declare an output.
    pub fn with_output(mut self, output: DataType) -> Result<Self> {
        self.outputs.push(output)?;
        Ok(self)
    }

    /// Builder: attach a memory binding.
    pub fn with_memory(mut self, binding: MemoryBinding) -> Result<Self> {
        self.memories.push(binding)?;
        Ok(self)
    }
}

/// A definition plus name-keyed views of its inputs and outputs.
///
/// The views are computed once at construction.
#[derive(Debug, Clone)]
pub struct RunnableInfo {
    definition: RunnableDefinition,
    inputs_by_name: IndexMap<String, DataType>,
    outputs_by_name: IndexMap<String, DataType>,
}

impl RunnableInfo {
    pub fn new(definition: RunnableDefinition) -> Self {
        let by_name = |record: &OrderedRecord<DataType>| {
            record
                .iter()
                .map(|dt| (dt.key().to_owned(), dt.clone()))
                .collect::<IndexMap<_, _>>()
        };
        Self {
            inputs_by_name: by_name(&definition.inputs),
            outputs_by_name: by_name(&definition.outputs),
            definition,
        }
    }

    pub fn definition(&self) -> &RunnableDefinition {
        &self.definition
    }

    pub fn id(&self) -> &str {
        &self.definition.id
    }

    /// The display name, falling back to the id.
    pub fn name(&self) -> &str {
        self.definition.name.as_deref().unwrap_or(&self.definition.id)
    }

    pub fn description(&self) -> Option<&str> {
        self.definition.description.as_deref()
    }

    /// Declared inputs keyed by name.
    pub fn inputs(&self) -> &IndexMap<String, DataType> {
        &self.inputs_by_name
    }

    /// Declared outputs keyed by name.
    pub fn outputs(&self) -> &IndexMap<String, DataType> {
        &self.outputs_by_name
    }

    pub fn input(&self, name: &str) -> Option<&DataType> {
        self.inputs_by_name.get(name)
    }

    pub fn output(&self, name: &str) -> Option<&DataType> {
        self.outputs_by_name.get(name)
    }

    /// The free-text output, if declared.
    pub fn text_output(&self) -> Option<&DataType> {
        self.output(TEXT_KEY)
    }

    /// Every output except the free-text one.
    pub fn structured_outputs(&self) -> impl Iterator<Item = &DataType> {
        self.outputs_by_name
            .iter()
            .filter(|(name, _)| name.as_str() != TEXT_KEY)
            .map(|(_, dt)| dt)
    }

    pub fn memories(&self) -> &OrderedRecord<MemoryBinding> {
        &self.definition.memories
    }
}

// ---------------------------------------------------------------------------
// Run options
// ---------------------------------------------------------------------------

/// Options for [`Runnable::invoke`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Return the chunk stream instead of the final object.
    pub stream: bool,
}

impl RunOptions {
    pub fn streaming() -> Self {
        Self { stream: true }
    }
}

/// What [`Runnable::invoke`] returns, depending on [`RunOptions::stream`].
pub enum RunResponse<'a> {
    Stream(ChunkStream<'a>),
    Output(RunOutput),
}

impl RunResponse<'_> {
    /// Reduce either shape to the final object.
    pub async fn into_output(self) -> Result<RunOutput> {
        match self {
            Self::Output(output) => Ok(output),
            Self::Stream(stream) => collect_output(stream).await,
        }
    }
}

impl std::fmt::Debug for RunResponse<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stream(_) => f.write_str("RunResponse::Stream(..)"),
            Self::Output(output) => f.debug_tuple("RunResponse::Output").field(output).finish(),
        }
    }
}

/// Drain a chunk stream and reconstruct the non-streaming result.
pub async fn collect_output(mut stream: ChunkStream<'_>) -> Result<RunOutput> {
    let mut collector = OutputCollector::new();
    while let Some(chunk) = stream.next().await {
        collector.push(&chunk?);
    }
    Ok(collector.into_output())
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// The base executable unit.
#[async_trait]
pub trait Runnable: Send + Sync {
    /// Definition and name-keyed input/output views.
    fn info(&self) -> &RunnableInfo;

    /// Run in streaming mode.
    ///
    /// The returned stream does no work until it is polled.
    fn stream<'a>(&'a self, input: RunInput, context: &'a Context) -> ChunkStream<'a>;

    /// Run to completion and return the reconstructed result.
    async fn run(&self, input: RunInput, context: &Context) -> Result<RunOutput> {
        collect_output(self.stream(input, context)).await
    }

    /// Run in either mode.
    async fn invoke<'a>(
        &'a self,
        input: RunInput,
        context: &'a Context,
        options: RunOptions,
    ) -> Result<RunResponse<'a>> {
        if options.stream {
            Ok(RunResponse::Stream(self.stream(input, context)))
        } else {
            Ok(RunResponse::Output(self.run(input, context).await?))
        }
    }
}

/// A runnable that consults memory before it processes input.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Definition and name-keyed input/output views.
    fn agent_info(&self) -> &RunnableInfo;

    /// Produce the result stream once memories are loaded.
    fn process<'a>(
        &'a self,
        input: RunInput,
        context: &'a Context,
        memories: Memories,
    ) -> ChunkStream<'a>;

    /// Query every configured memory binding for this input.
    async fn load_memories(&self, input: &RunInput, context: &Context) -> Result<Memories> {
        memory::load_memories(self.agent_info(), input, context).await
    }

    /// Record messages in every configured memory binding.
    async fn update_memories(
        &self,
        messages: &[crate::llm::Message],
        context: &Context,
    ) -> Result<()> {
        memory::update_memories(self.agent_info(), messages, context).await
    }
}

impl<A: Agent> Runnable for A {
    fn info(&self) -> &RunnableInfo {
        self.agent_info()
    }

    fn stream<'a>(&'a self, input: RunInput, context: &'a Context) -> ChunkStream<'a> {
        Box::pin(async_stream::try_stream! {
            tracing::debug!(agent_id = %self.agent_info().id(), "agent started");
            let memories = self.load_memories(&input, context).await?;
            let mut inner = self.process(input, context, memories);
            while let Some(chunk) = inner.next().await {
                yield chunk?;
            }
            tracing::debug!(agent_id = %self.agent_info().id(), "agent finished");
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use agentflow_core::DataKind;
    use serde_json::json;

    #[test]
    fn info_projects_by_name() {
        let definition = RunnableDefinition::new("agent")
            .with_input(DataType::new("question", DataKind::String).with_id("in1"))
            .unwrap()
            .with_output(DataType::new(TEXT_KEY, DataKind::String).with_id("out1"))
            .unwrap()
            .with_output(DataType::new("score", DataKind::Number).with_id("out2"))
            .unwrap();
        let info = RunnableInfo::new(definition);

        assert_eq!(info.name(), "agent");
        assert_eq!(info.input("question").unwrap().id, "in1");
        assert_eq!(info.text_output().unwrap().id, "out1");
        let structured: Vec<_> = info.structured_outputs().map(|o| o.id.as_str()).collect();
        assert_eq!(structured, vec!["out2"]);
    }

    #[test]
    fn definition_serde_defaults() {
        let definition: RunnableDefinition =
            serde_json::from_value(json!({ "id": "x", "name": "X" })).unwrap();
        assert!(definition.inputs.is_empty());
        assert!(definition.memories.is_empty());
    }

    #[tokio::test]
    async fn collect_output_applies_merge_rule() {
        let chunks = vec![
            Ok(RunChunk::text("a")),
            Ok(RunChunk::delta(json!({ "k": 1 }).as_object().cloned().unwrap())),
            Ok(RunChunk::text("b")),
        ];
        let output = collect_output(Box::pin(futures::stream::iter(chunks))).await.unwrap();
        assert_eq!(Value::Object(output), json!({ "$text": "ab", "k": 1 }));
    }

    #[tokio::test]
    async fn collect_output_stops_at_error() {
        let chunks = vec![
            Ok(RunChunk::text("a")),
            Err(crate::error::AgentError::MissingModel),
            Ok(RunChunk::text("never")),
        ];
        let err = collect_output(Box::pin(futures::stream::iter(chunks))).await.unwrap_err();
        assert_eq!(err.to_string(), "LLM model is required");
    }
}

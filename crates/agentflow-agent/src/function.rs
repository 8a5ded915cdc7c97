//! Function-backed agents.
//!
//! [`FunctionAgent`] hands its code to an injected [`FunctionRunner`] (the
//! sandbox boundary).  [`LocalFunctionAgent`] calls an in-process closure.
//! Both accept either a plain object or a chunk stream from the callee and
//! normalize it to the common streaming contract.

use std::future::Future;
use std::sync::Arc;

use agentflow_core::RunChunk;
use async_trait::async_trait;
use futures::StreamExt;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::context::Context;
use crate::error::Result;
use crate::memory::Memories;
use crate::runnable::{Agent, ChunkStream, RunInput, RunOutput, RunnableDefinition, RunnableInfo};

/// Language assumed when a definition does not name one.
pub const DEFAULT_LANGUAGE: &str = "javascript";

fn default_language() -> String {
    DEFAULT_LANGUAGE.to_owned()
}

// ---------------------------------------------------------------------------
// Runner contract
// ---------------------------------------------------------------------------

/// What a [`FunctionRunner`] is asked to execute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionRequest {
    pub name: String,
    pub language: String,
    pub code: String,
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

/// A callee result: one object, or a stream of chunks.
pub enum FunctionOutput {
    Object(RunOutput),
    Stream(ChunkStream<'static>),
}

impl FunctionOutput {
    /// Normalize to a chunk stream.
    pub fn into_stream(self) -> ChunkStream<'static> {
        match self {
            Self::Object(output) => {
                Box::pin(futures::stream::once(async move { Ok(RunChunk::from_output(output)) }))
            }
            Self::Stream(stream) => stream,
        }
    }
}

impl From<RunOutput> for FunctionOutput {
    fn from(output: RunOutput) -> Self {
        Self::Object(output)
    }
}

impl std::fmt::Debug for FunctionOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Object(output) => f.debug_tuple("Object").field(output).finish(),
            Self::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// Executes code on behalf of a [`FunctionAgent`].
#[async_trait]
pub trait FunctionRunner: Send + Sync {
    async fn run(&self, request: FunctionRequest) -> Result<FunctionOutput>;
}

// ---------------------------------------------------------------------------
// FunctionAgent
// ---------------------------------------------------------------------------

/// Definition of a [`FunctionAgent`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionAgentDefinition {
    #[serde(flatten)]
    pub base: RunnableDefinition,
    #[serde(default = "default_language")]
    pub language: String,
    pub code: String,
}

/// Runs code through the injected [`FunctionRunner`].
#[derive(Debug)]
pub struct FunctionAgent {
    info: RunnableInfo,
    language: String,
    code: String,
}

impl FunctionAgent {
    pub fn new(definition: FunctionAgentDefinition) -> Self {
        Self {
            info: RunnableInfo::new(definition.base),
            language: definition.language,
            code: definition.code,
        }
    }
}

impl Agent for FunctionAgent {
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
            let runner = context.services().function_runner()?;
            let request = FunctionRequest {
                name: self.info.name().to_owned(),
                language: self.language.clone(),
                code: self.code.clone(),
                arguments: input,
            };
            tracing::debug!(agent_id = %self.info.id(), language = %request.language, "running function");

            let mut output = runner.run(request).await?.into_stream();
            while let Some(chunk) = output.next().await {
                yield chunk?;
            }
        })
    }
}

// ---------------------------------------------------------------------------
// LocalFunctionAgent
// ---------------------------------------------------------------------------

/// What a local callback receives besides its input.
#[derive(Debug, Clone)]
pub struct LocalFunctionContext {
    pub context: Context,
    pub memories: Memories,
}

type LocalFn =
    dyn Fn(RunInput, LocalFunctionContext) -> BoxFuture<'static, Result<FunctionOutput>> + Send + Sync;

/// Runs an in-process async closure.
///
/// Local agents cannot be serialized; register them with
/// [`crate::Registry::register_instance`].
pub struct LocalFunctionAgent {
    info: RunnableInfo,
    function: Arc<LocalFn>,
}

impl LocalFunctionAgent {
    pub fn new<F, Fut>(definition: RunnableDefinition, function: F) -> Self
    where
        F: Fn(RunInput, LocalFunctionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<FunctionOutput>> + Send + 'static,
    {
        let function: Arc<LocalFn> = Arc::new(
            move |input: RunInput, ctx: LocalFunctionContext| -> BoxFuture<'static, Result<FunctionOutput>> {
                Box::pin(function(input, ctx))
            },
        );
        Self {
            info: RunnableInfo::new(definition),
            function,
        }
    }
}

impl std::fmt::Debug for LocalFunctionAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalFunctionAgent")
            .field("id", &self.info.id())
            .finish_non_exhaustive()
    }
}

impl Agent for LocalFunctionAgent {
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
            let ctx = LocalFunctionContext {
                context: context.clone(),
                memories,
            };
            let mut output = (self.function)(input, ctx).await?.into_stream();
            while let Some(chunk) = output.next().await {
                yield chunk?;
            }
        })
    }
}

//! Execution engine for agentflow.
//!
//! Heterogeneous agents (LLM calls, functions, HTTP endpoints) are defined
//! once, typed uniformly, and composed into pipelines or LLM-routed
//! decisions.  Every one of them exposes the same streaming and
//! non-streaming execution contract.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐  resolve  ┌──────────┐
//! │  Registry  │<──────────│ Context  │──> Services (model, runner, http,
//! └─────┬──────┘           └────┬─────┘    config, memories, catalog)
//!       │ definitions           │
//!       v                       v
//! ┌───────────────┐   ┌─────────────────────────────────┐
//! │ Pipeline /    │──>│ LLM / Function / OpenAPI /       │
//! │ Decision      │   │ Blocklet agents                 │
//! └───────────────┘   └─────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`runnable`] -- The `Runnable`/`Agent` contract and chunk streams.
//! - [`context`] -- Per-request context and injected services.
//! - [`registry`] -- Id to instance/definition resolution.
//! - [`definition`] -- Serializable agent definitions.
//! - [`llm`] -- Model contract, wire types, OpenAI-compatible model.
//! - [`llm_agent`], [`function`], [`openapi`] -- Leaf agents.
//! - [`pipeline`], [`decision`] -- Composite agents.
//! - [`memory`] -- The `Memorable` contract and memory loading.
//! - [`config`] -- Engine configuration.
//! - [`error`] -- Agent error types.

pub mod config;
pub mod context;
pub mod decision;
pub mod definition;
pub mod error;
pub mod function;
pub mod llm;
pub mod llm_agent;
pub mod memory;
pub mod openapi;
pub mod pipeline;
pub mod registry;
pub mod runnable;

// Re-export the most commonly used types at the crate root.
pub use config::EngineConfig;
pub use context::{Context, ContextState, Services};
pub use decision::{DecisionAgentDefinition, DecisionCase, LlmDecisionAgent};
pub use definition::{AgentDefinition, RunnableRef};
pub use error::{AgentError, Result};
pub use function::{
    FunctionAgent, FunctionAgentDefinition, FunctionOutput, FunctionRequest, FunctionRunner,
    LocalFunctionAgent, LocalFunctionContext,
};
pub use llm::{LlmInput, LlmModel, LlmOutput, Message, OpenAiModel, Role};
pub use llm_agent::{LlmAgent, LlmAgentDefinition};
pub use memory::{InMemoryStore, Memorable, Memories, MemoryBinding};
pub use openapi::{
    AuthConfig, BlockletAgent, BlockletAgentDefinition, HttpClient, HttpRequest, OpenApiAgent,
    OpenApiAgentDefinition, ReqwestHttpClient,
};
pub use pipeline::{PipelineAgent, PipelineAgentDefinition, PipelineProcess, VariableRef};
pub use registry::Registry;
pub use runnable::{
    Agent, ChunkStream, RunInput, RunOptions, RunOutput, RunResponse, Runnable,
    RunnableDefinition, RunnableInfo, collect_output,
};

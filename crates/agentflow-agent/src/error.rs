//! Agent error types.
//!
//! All execution subsystems surface errors through [`AgentError`].  Errors
//! fall into two phases: definition errors raised while an agent is being
//! constructed, and run-time errors raised while it executes.  Neither kind
//! is retried inside the engine.

/// Unified error type for the execution engine.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    // -- Definition errors ---------------------------------------------------
    /// A composite definition is structurally invalid.
    #[error("invalid definition `{id}`: {reason}")]
    InvalidDefinition { id: String, reason: String },

    /// `Context::resolve` was asked for an id nobody registered.
    #[error("runnable not found: {id}")]
    UnresolvedRunnable { id: String },

    // -- Missing collaborators -----------------------------------------------
    /// An LLM-backed agent ran without a model injected.
    #[error("LLM model is required")]
    MissingModel,

    /// An HTTP agent has no url to call.
    #[error("API url is required")]
    MissingUrl,

    /// An LLM agent has no configured messages.
    #[error("Messages are required")]
    MissingMessages,

    /// A function agent ran without a function runner injected.
    #[error("function runner is required")]
    MissingRunner,

    // -- LLM errors ----------------------------------------------------------
    /// An HTTP request to the model provider failed.
    #[error("llm request failed: {reason}")]
    LlmRequestFailed { reason: String },

    /// The model returned something the engine could not interpret.
    #[error("llm response error: {reason}")]
    ModelResponse { reason: String },

    /// A decision agent's model call named no function.
    #[error("no tool call returned by the model")]
    NoToolCall,

    /// A decision agent's model call named a function no case provides.
    #[error("no case matches function `{name}`")]
    UnknownCase { name: String },

    // -- HTTP errors ---------------------------------------------------------
    /// A leaf HTTP call returned a non-2xx status.
    #[error("{message}")]
    Http { status: u16, message: String },

    /// The HTTP call could not be sent or its body could not be read.
    #[error("request failed: {reason}")]
    Request { reason: String },

    /// The HTTP response body was valid JSON but not an object.
    #[error("response from {url} is not a JSON object")]
    InvalidResponse { url: String },

    /// A blocklet operation id is missing from the discovered catalog.
    #[error("unknown operation: {id}")]
    UnknownOperation { id: String },

    // -- Function errors -----------------------------------------------------
    /// A function runner or local callback failed.
    #[error("function `{name}` failed: {reason}")]
    FunctionFailed { name: String, reason: String },

    // -- Memory errors -------------------------------------------------------
    /// A memory store operation failed.
    #[error("memory error: {reason}")]
    Memory { reason: String },

    // -- Configuration errors ------------------------------------------------
    /// Configuration validation or loading failed.
    #[error("config error: {reason}")]
    Config { reason: String },

    // -- Serialization -------------------------------------------------------
    /// JSON serialization or deserialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    // -- Upstream crate errors -----------------------------------------------
    /// An error propagated from the data model crate.
    #[error(transparent)]
    Core(#[from] agentflow_core::CoreError),
}

/// Convenience alias used throughout the agent crate.
pub type Result<T> = std::result::Result<T, AgentError>;

impl From<reqwest::Error> for AgentError {
    fn from(err: reqwest::Error) -> Self {
        Self::Request {
            reason: err.to_string(),
        }
    }
}

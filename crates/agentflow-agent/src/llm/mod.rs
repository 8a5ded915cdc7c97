//! Model integration layer.
//!
//! - [`types`] -- provider-agnostic messages, tools, and call input/output.
//! - [`model`] -- the [`LlmModel`] contract agents consume.
//! - [`openai`] -- an OpenAI-compatible implementation.
//! - [`streaming_openai`] -- SSE parsing for streamed completions.

pub mod model;
pub mod openai;
pub mod streaming_openai;
pub mod types;

pub use model::{LlmModel, TextStream};
pub use openai::OpenAiModel;
pub use types::{
    LlmInput, LlmOutput, Message, MessageTemplate, ModelSettings, ResponseFormat, Role, ToolCall,
    ToolChoice, ToolDefinition,
};

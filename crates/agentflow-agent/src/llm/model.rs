//! The model contract consumed by LLM-backed agents.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::error::Result;
use crate::llm::types::{LlmInput, LlmOutput};

/// A stream of raw text fragments from a streaming model call.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// A chat model.
///
/// Implementations are shared across requests behind an `Arc`, so they must
/// not keep per-call state.
#[async_trait]
pub trait LlmModel: Send + Sync {
    /// Issue a single non-streaming call.
    async fn chat(&self, input: &LlmInput) -> Result<LlmOutput>;

    /// Issue a streaming call for free text.
    ///
    /// Each item is one text fragment in emission order.
    async fn stream_chat(&self, input: &LlmInput) -> Result<TextStream>;
}

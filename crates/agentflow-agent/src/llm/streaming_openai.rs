//! SSE stream parser for the Chat Completions API.
//!
//! The streaming format sends `data:` lines with JSON payloads containing
//! `choices[].delta` objects and terminates with a `data: [DONE]` sentinel.
//! [`LineBuffer`] reassembles lines from arbitrary byte chunks and
//! [`OpenAiStreamAccumulator`] turns those lines into text deltas for live
//! forwarding.

use serde_json::Value;

use crate::error::{AgentError, Result};

// ---------------------------------------------------------------------------
// Line buffer
// ---------------------------------------------------------------------------

/// Splits an arbitrary byte-chunked body into complete lines.
///
/// Bytes are buffered until a newline arrives, so a multi-byte character
/// split across two network chunks is decoded only once it is whole.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every line it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<String>> {
        self.pending.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            lines.push(decode_line(&line)?);
        }
        Ok(lines)
    }

    /// Whatever is left after the body ended without a trailing newline.
    pub fn finish(self) -> Result<Option<String>> {
        let rest = decode_line(&self.pending)?;
        Ok((!rest.trim().is_empty()).then_some(rest))
    }
}

fn decode_line(bytes: &[u8]) -> Result<String> {
    let text = std::str::from_utf8(bytes).map_err(|e| AgentError::ModelResponse {
        reason: format!("invalid UTF-8 in stream: {e}"),
    })?;
    Ok(text.trim_end_matches(['\r', '\n']).to_owned())
}

// ---------------------------------------------------------------------------
// Stream accumulator
// ---------------------------------------------------------------------------

/// Extracts text deltas from SSE lines and tracks the `[DONE]` sentinel.
#[derive(Debug, Default)]
pub struct OpenAiStreamAccumulator {
    /// Whether the `[DONE]` sentinel has been received.
    done: bool,
}

impl OpenAiStreamAccumulator {
    /// Create a new empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the `[DONE]` sentinel has been received.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Feed a single SSE line from the stream.
    ///
    /// Returns `Ok(Some(text_delta))` when a non-empty text delta is present,
    /// `Ok(None)` for every other line.
    pub fn feed_line(&mut self, line: &str) -> Result<Option<String>> {
        let line = line.trim_end();

        if line.is_empty() || line.starts_with(':') {
            return Ok(None);
        }

        let Some(data) = line.strip_prefix("data:") else {
            return Ok(None);
        };
        let data = data.trim();

        if data == "[DONE]" {
            self.done = true;
            return Ok(None);
        }

        let v: Value = serde_json::from_str(data).map_err(|e| AgentError::ModelResponse {
            reason: format!("invalid JSON in SSE data: {e}"),
        })?;

        if let Some(message) = v["error"]["message"].as_str() {
            return Err(AgentError::LlmRequestFailed {
                reason: message.to_owned(),
            });
        }

        Ok(v["choices"][0]["delta"]["content"]
            .as_str()
            .filter(|content| !content.is_empty())
            .map(str::to_owned))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

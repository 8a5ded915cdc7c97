//! Streaming delta chunks.
//!
//! Every runnable streams its result as a sequence of [`RunChunk`]s.  A
//! chunk carries a free-text fragment, a partial structured object, or
//! both.  [`OutputCollector`] folds a stream back into the value the same
//! call would have returned without streaming:
//!
//! - text fragments are concatenated in arrival order,
//! - delta objects are shallow-merged in arrival order (later key wins),
//! - the result is `{ "$text": <text, if non-empty>, ...merged }`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Reserved output name for free text.
pub const TEXT_KEY: &str = "$text";

/// One increment of a streamed result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunChunk {
    /// A free-text fragment.
    #[serde(rename = "$text", default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// A partial structured result to shallow-merge.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<Map<String, Value>>,
}

impl RunChunk {
    /// A text-only chunk.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            delta: None,
        }
    }

    /// A delta-only chunk.
    pub fn delta(delta: Map<String, Value>) -> Self {
        Self {
            text: None,
            delta: Some(delta),
        }
    }

    /// Split a finished result object into the chunk that reproduces it:
    /// `$text` (when it is a string) becomes the text fragment and every
    /// other key goes into the delta.
    pub fn from_output(mut output: Map<String, Value>) -> Self {
        let text = match output.remove(TEXT_KEY) {
            Some(Value::String(s)) => Some(s),
            Some(other) => {
                output.insert(TEXT_KEY.to_owned(), other);
                None
            }
            None => None,
        };
        Self {
            text,
            delta: (!output.is_empty()).then_some(output),
        }
    }
}

/// Incrementally applies the reconstruction rule to a chunk stream.
#[derive(Debug, Clone, Default)]
pub struct OutputCollector {
    text: String,
    merged: Map<String, Value>,
}

impl OutputCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one chunk in.
    pub fn push(&mut self, chunk: &RunChunk) {
        if let Some(text) = &chunk.text {
            self.text.push_str(text);
        }
        if let Some(delta) = &chunk.delta {
            for (key, value) in delta {
                self.merged.insert(key.clone(), value.clone());
            }
        }
    }

    /// Text accumulated so far.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Merged deltas accumulated so far, without the text.
    pub fn merged(&self) -> &Map<String, Value> {
        &self.merged
    }

    /// The current reconstructed value.
    pub fn snapshot(&self) -> Map<String, Value> {
        let mut output = Map::new();
        if !self.text.is_empty() {
            output.insert(TEXT_KEY.to_owned(), Value::String(self.text.clone()));
        }
        for (key, value) in &self.merged {
            output.insert(key.clone(), value.clone());
        }
        output
    }

    /// Finish and return the reconstructed value.
    pub fn into_output(self) -> Map<String, Value> {
        let mut output = Map::new();
        if !self.text.is_empty() {
            output.insert(TEXT_KEY.to_owned(), Value::String(self.text));
        }
        output.extend(self.merged);
        output
    }
}

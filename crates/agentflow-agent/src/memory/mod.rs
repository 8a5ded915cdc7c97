//! Memory integration.
//!
//! A [`Memorable`] is any retrieval/storage backend an agent can consult.
//! Agents declare [`MemoryBinding`]s; before an agent processes its input,
//! every binding is searched concurrently and the results are collected
//! into a [`Memories`] map keyed by both the binding id and its name.
//!
//! A binding whose store cannot be found is skipped with a warning.  This
//! is graceful degradation, not an error.

pub mod store;

use std::sync::Arc;

use agentflow_core::{Identified, render};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::{join_all, try_join_all};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::context::Context;
use crate::error::Result;
use crate::llm::Message;
use crate::runnable::{RunInput, RunnableInfo};

pub use store::InMemoryStore;

/// Search results keyed by binding id and binding name.
///
/// Each value is a serialized [`SearchResult`], i.e. `{ "results": [...] }`,
/// so it can be addressed from message templates.
pub type Memories = Map<String, Value>;

// ---------------------------------------------------------------------------
// Items
// ---------------------------------------------------------------------------

/// A stored memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryItem {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// The remembered content.
    pub memory: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// A memory returned from a search, with its relevance score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryItemWithScore {
    #[serde(flatten)]
    pub item: MemoryItem,
    pub score: f64,
}

/// What [`Memorable::search`] returns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub results: Vec<MemoryItemWithScore>,
}

/// Scope and backend-specific options for memory actions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Backend-specific extras, e.g. `limit`.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// ---------------------------------------------------------------------------
// Contract
// ---------------------------------------------------------------------------

/// A memory backend.
#[async_trait]
pub trait Memorable: Send + Sync {
    /// Derive and store memories from a conversation.
    async fn add(&self, messages: &[Message], options: &MemoryOptions) -> Result<Vec<MemoryItem>>;

    /// Find memories relevant to a query.
    async fn search(&self, query: &str, options: &MemoryOptions) -> Result<SearchResult>;

    /// List memories matching the scope in `options`.
    async fn filter(&self, options: &MemoryOptions) -> Result<Vec<MemoryItem>>;

    async fn get(&self, id: &str) -> Result<Option<MemoryItem>>;

    /// Store one memory verbatim.
    async fn create(&self, memory: &str, options: &MemoryOptions) -> Result<MemoryItem>;

    async fn update(&self, id: &str, memory: &str) -> Result<Option<MemoryItem>>;

    async fn delete(&self, id: &str) -> Result<Option<MemoryItem>>;

    /// Remove everything.
    async fn reset(&self) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Bindings
// ---------------------------------------------------------------------------

/// Where a binding takes its search query from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "from", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum MemoryQuery {
    /// Every input value, as `key value` lines.
    Input,
    /// A single input, identified by its input id.
    Variable { from_variable_id: String },
}

/// A memory store attached to an agent.
#[derive(Clone, Serialize, Deserialize)]
pub struct MemoryBinding {
    /// Unique id; also the primary key in [`Memories`].
    pub id: String,
    /// Secondary key in [`Memories`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Query source; defaults to the whole input.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<MemoryQuery>,
    /// Extra options passed to `search`.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub options: Map<String, Value>,
    /// The backing store.  When absent, the store registered under this
    /// binding id in [`crate::Services`] is used.
    #[serde(skip)]
    pub memory: Option<Arc<dyn Memorable>>,
}

impl MemoryBinding {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            query: None,
            options: Map::new(),
            memory: None,
        }
    }

    /// Builder: set the secondary key.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Builder: query from one input.
    #[must_use]
    pub fn from_variable(mut self, input_id: impl Into<String>) -> Self {
        self.query = Some(MemoryQuery::Variable {
            from_variable_id: input_id.into(),
        });
        self
    }

    /// Builder: attach the store.
    #[must_use]
    pub fn with_memory(mut self, memory: Arc<dyn Memorable>) -> Self {
        self.memory = Some(memory);
        self
    }
}

impl Identified for MemoryBinding {
    fn id(&self) -> &str {
        &self.id
    }
}

impl std::fmt::Debug for MemoryBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBinding")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("query", &self.query)
            .field("options", &self.options)
            .field("memory", &self.memory.as_ref().map(|_| "<dyn Memorable>"))
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Load / update
// ---------------------------------------------------------------------------

fn resolve_store(binding: &MemoryBinding, context: &Context) -> Option<Arc<dyn Memorable>> {
    binding
        .memory
        .clone()
        .or_else(|| context.services().memory(&binding.id))
}

fn scope(context: &Context) -> MemoryOptions {
    MemoryOptions {
        user_id: context.state().user_id.clone(),
        session_id: context.state().session_id.clone(),
        extra: Map::new(),
    }
}

/// Compute the search query a binding uses for this input.
pub fn memory_query(binding: &MemoryBinding, info: &RunnableInfo, input: &RunInput) -> String {
    let as_text = |value: &Value| {
        let mut vars = Map::new();
        vars.insert("value".into(), value.clone());
        render("{{value}}", &vars)
    };

    match &binding.query {
        Some(MemoryQuery::Variable { from_variable_id }) => info
            .definition()
            .inputs
            .get(from_variable_id)
            .and_then(|dt| input.get(dt.key()))
            .map(as_text)
            .unwrap_or_default(),
        _ => input
            .iter()
            .map(|(key, value)| format!("{key} {}", as_text(value)))
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

/// Search every binding of `info` concurrently.
pub async fn load_memories(
    info: &RunnableInfo,
    input: &RunInput,
    context: &Context,
) -> Result<Memories> {
    let searches = info.memories().iter().filter_map(|binding| {
        let Some(store) = resolve_store(binding, context) else {
            warn!(agent_id = %info.id(), binding = %binding.id, "memory binding has no store, skipping");
            return None;
        };
        let query = memory_query(binding, info, input);
        let mut options = scope(context);
        options.extra = binding.options.clone();
        Some(async move {
            let result = store.search(&query, &options).await;
            (binding, result)
        })
    });

    let mut memories = Memories::new();
    for (binding, result) in join_all(searches).await {
        let result = serde_json::to_value(result?)?;
        debug!(agent_id = %info.id(), binding = %binding.id, "memories loaded");
        if let Some(name) = &binding.name {
            memories.insert(name.clone(), result.clone());
        }
        memories.insert(binding.id.clone(), result);
    }
    Ok(memories)
}

/// Add `messages` to every binding of `info` concurrently.
pub async fn update_memories(
    info: &RunnableInfo,
    messages: &[Message],
    context: &Context,
) -> Result<()> {
    let options = scope(context);
    let adds = info.memories().iter().filter_map(|binding| {
        let Some(store) = resolve_store(binding, context) else {
            warn!(agent_id = %info.id(), binding = %binding.id, "memory binding has no store, skipping");
            return None;
        };
        let options = &options;
        Some(async move { store.add(messages, options).await })
    });

    try_join_all(adds).await?;
    Ok(())
}

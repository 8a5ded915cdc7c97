//! Process-local conversation memory.
//!
//! [`InMemoryStore`] keeps memories in a `Vec` behind a tokio mutex and
//! scores searches by word overlap.  It is meant for the CLI and for tests;
//! real deployments plug in a vector store through [`Memorable`].

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Map;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{Memorable, MemoryItem, MemoryItemWithScore, MemoryOptions, SearchResult};
use crate::error::Result;
use crate::llm::{Message, Role};

/// Default number of search hits when `limit` is not given.
const DEFAULT_SEARCH_LIMIT: usize = 10;

/// A simple in-process [`Memorable`].
#[derive(Debug, Default)]
pub struct InMemoryStore {
    items: Mutex<Vec<MemoryItem>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored memories.
    pub async fn len(&self) -> usize {
        self.items.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.lock().await.is_empty()
    }
}

fn in_scope(item: &MemoryItem, options: &MemoryOptions) -> bool {
    let matches = |want: &Option<String>, have: &Option<String>| want.is_none() || want == have;
    matches(&options.user_id, &item.user_id) && matches(&options.session_id, &item.session_id)
}

fn words(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn new_item(memory: &str, options: &MemoryOptions) -> MemoryItem {
    let now = Utc::now();
    MemoryItem {
        id: Uuid::now_v7().to_string(),
        user_id: options.user_id.clone(),
        session_id: options.session_id.clone(),
        created_at: now,
        updated_at: now,
        memory: memory.to_owned(),
        metadata: Map::new(),
    }
}

#[async_trait]
impl Memorable for InMemoryStore {
    async fn add(&self, messages: &[Message], options: &MemoryOptions) -> Result<Vec<MemoryItem>> {
        let added: Vec<MemoryItem> = messages
            .iter()
            .filter(|m| matches!(m.role, Role::User | Role::Assistant) && !m.content.is_empty())
            .map(|m| {
                let mut item = new_item(&m.content, options);
                item.metadata
                    .insert("role".into(), serde_json::to_value(m.role).unwrap_or_default());
                item
            })
            .collect();

        self.items.lock().await.extend(added.iter().cloned());
        tracing::debug!(count = added.len(), "memories added");
        Ok(added)
    }

    async fn search(&self, query: &str, options: &MemoryOptions) -> Result<SearchResult> {
        let limit = options
            .extra
            .get("limit")
            .and_then(|v| v.as_u64())
            .map_or(DEFAULT_SEARCH_LIMIT, |n| n as usize);
        let query_words = words(query);

        let items = self.items.lock().await;
        let mut results: Vec<MemoryItemWithScore> = items
            .iter()
            .filter(|item| in_scope(item, options))
            .filter_map(|item| {
                let item_words = words(&item.memory);
                if item_words.is_empty() {
                    return None;
                }
                let overlap = query_words.intersection(&item_words).count();
                (overlap > 0).then(|| MemoryItemWithScore {
                    item: item.clone(),
                    score: overlap as f64 / item_words.len() as f64,
                })
            })
            .collect();

        results.sort_by(|a, b| b.score.total_cmp(&a.score));
        results.truncate(limit);
        Ok(SearchResult { results })
    }

    async fn filter(&self, options: &MemoryOptions) -> Result<Vec<MemoryItem>> {
        let items = self.items.lock().await;
        Ok(items.iter().filter(|i| in_scope(i, options)).cloned().collect())
    }

    async fn get(&self, id: &str) -> Result<Option<MemoryItem>> {
        let items = self.items.lock().await;
        Ok(items.iter().find(|i| i.id == id).cloned())
    }

    async fn create(&self, memory: &str, options: &MemoryOptions) -> Result<MemoryItem> {
        let item = new_item(memory, options);
        self.items.lock().await.push(item.clone());
        Ok(item)
    }

    async fn update(&self, id: &str, memory: &str) -> Result<Option<MemoryItem>> {
        let mut items = self.items.lock().await;
        Ok(items.iter_mut().find(|i| i.id == id).map(|item| {
            item.memory = memory.to_owned();
            item.updated_at = Utc::now();
            item.clone()
        }))
    }

    async fn delete(&self, id: &str) -> Result<Option<MemoryItem>> {
        let mut items = self.items.lock().await;
        let index = items.iter().position(|i| i.id == id);
        Ok(index.map(|index| items.remove(index)))
    }

    async fn reset(&self) -> Result<()> {
        self.items.lock().await.clear();
        Ok(())
    }
}

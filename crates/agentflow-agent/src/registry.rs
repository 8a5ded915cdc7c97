//! Runnable registry.
//!
//! The registry maps ids to either a constructed runnable (shared by every
//! resolver) or a definition (instantiated fresh on every resolve, so two
//! composites referencing one definition never share state).
//!
//! Internally the registry is backed by [`DashMap`], which gives lock-free
//! concurrent reads; it is cheaply cloneable and `Send + Sync`.
//!
//! # Example
//!
//! ```rust
//! # use agentflow_agent::registry::Registry;
//! # use agentflow_agent::definition::AgentDefinition;
//! let registry = Registry::new();
//! let definition: AgentDefinition = serde_json::from_value(serde_json::json!({
//!     "type": "llm",
//!     "id": "greeter",
//!     "messages": [{ "id": "m1", "role": "user", "content": "hi" }]
//! })).unwrap();
//! registry.register_definition(definition);
//!
//! assert!(registry.contains("greeter"));
//! assert!(registry.resolve("missing").is_err());
//! ```

use std::sync::Arc;

use dashmap::DashMap;

use crate::definition::AgentDefinition;
use crate::error::{AgentError, Result};
use crate::runnable::{Runnable, RunnableInfo};

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// What is registered under an id.
#[derive(Clone)]
pub enum Registration {
    /// A constructed runnable; every resolve returns this same instance.
    Instance(Arc<dyn Runnable>),
    /// A definition; every resolve builds a new instance.
    Definition(Arc<AgentDefinition>),
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Instance(runnable) => f
                .debug_tuple("Instance")
                .field(&runnable.info().id())
                .finish(),
            Self::Definition(definition) => f.debug_tuple("Definition").field(definition).finish(),
        }
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Concurrent runnable registry backed by [`DashMap`].
#[derive(Debug, Clone, Default)]
pub struct Registry {
    inner: Arc<DashMap<String, Registration>>,
}

impl Registry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a constructed runnable under its own id.
    ///
    /// An existing registration with the same id is overwritten.
    pub fn register_instance(&self, runnable: Arc<dyn Runnable>) {
        let id = runnable.info().id().to_owned();
        tracing::debug!(runnable_id = %id, "instance registered");
        self.inner.insert(id, Registration::Instance(runnable));
    }

    /// Register a definition under its id.
    ///
    /// An existing registration with the same id is overwritten.
    pub fn register_definition(&self, definition: AgentDefinition) {
        let id = definition.id().to_owned();
        tracing::debug!(runnable_id = %id, kind = definition.kind(), "definition registered");
        self.inner
            .insert(id, Registration::Definition(Arc::new(definition)));
    }

    /// Register every definition in order.
    pub fn register_all(&self, definitions: impl IntoIterator<Item = AgentDefinition>) {
        for definition in definitions {
            self.register_definition(definition);
        }
    }

    /// Remove a registration.
    pub fn unregister(&self, id: &str) -> Option<Registration> {
        self.inner.remove(id).map(|(_, registration)| registration)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.inner.contains_key(id)
    }

    /// Snapshot of the registration under `id`.
    pub fn get(&self, id: &str) -> Option<Registration> {
        self.inner.get(id).map(|entry| entry.value().clone())
    }

    /// All registered ids, sorted.
    pub fn list_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.inner.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Definition-level information for an id, without instantiating.
    pub fn info(&self, id: &str) -> Result<RunnableInfo> {
        match self.lookup(id)? {
            Registration::Instance(runnable) => Ok(runnable.info().clone()),
            Registration::Definition(definition) => Ok(definition.info()),
        }
    }

    /// Resolve an id to a runnable.
    pub fn resolve(&self, id: &str) -> Result<Arc<dyn Runnable>> {
        // The entry guard is released by `lookup` before instantiating, so
        // composite constructors may read the registry again.
        match self.lookup(id)? {
            Registration::Instance(runnable) => Ok(runnable),
            Registration::Definition(definition) => definition.instantiate(self),
        }
    }

    /// Instantiate every registered definition, surfacing configuration
    /// errors before anything runs.
    pub fn validate(&self) -> Result<()> {
        for id in self.list_ids() {
            if let Some(Registration::Definition(definition)) = self.get(&id) {
                definition.instantiate(self)?;
                tracing::debug!(runnable_id = %id, "definition validated");
            }
        }
        Ok(())
    }

    fn lookup(&self, id: &str) -> Result<Registration> {
        self.get(id).ok_or_else(|| AgentError::UnresolvedRunnable { id: id.to_owned() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn llm_definition(id: &str) -> AgentDefinition {
        serde_json::from_value(json!({
            "type": "llm",
            "id": id,
            "name": "Greeter",
            "messages": [{ "id": "m1", "role": "user", "content": "hi" }]
        }))
        .unwrap()
    }

    #[test]
    fn definitions_resolve_to_fresh_instances() {
        let registry = Registry::new();
        registry.register_definition(llm_definition("a"));

        let first = registry.resolve("a").unwrap();
        let second = registry.resolve("a").unwrap();
        assert_eq!(first.info().name(), "Greeter");
        assert!(!Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn instances_are_shared() {
        let registry = Registry::new();
        let instance = llm_definition("a").instantiate(&registry).unwrap();
        registry.register_instance(instance.clone());

        let resolved = registry.resolve("a").unwrap();
        assert!(Arc::ptr_eq(&instance, &resolved));
    }

    #[test]
    fn unknown_id_is_error() {
        let registry = Registry::new();
        let err = registry.resolve("nope").err().unwrap();
        assert!(matches!(err, AgentError::UnresolvedRunnable { ref id } if id == "nope"));
        assert!(registry.info("nope").is_err());
    }

    #[test]
    fn list_and_unregister() {
        let registry = Registry::new();
        registry.register_all([llm_definition("b"), llm_definition("a")]);
        assert_eq!(registry.list_ids(), vec!["a", "b"]);
        assert!(registry.unregister("a").is_some());
        assert!(!registry.contains("a"));
        registry.validate().unwrap();
    }
}

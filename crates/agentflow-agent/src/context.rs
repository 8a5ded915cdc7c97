//! Per-request execution environment.
//!
//! A [`Context`] is created once per execution request and passed by
//! reference to every nested runnable.  It carries read-only request state,
//! the [`Registry`] used to resolve runnables by id, and the injected
//! [`Services`] (model, function runner, HTTP client, configuration, memory
//! stores).  Agents never mutate it.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::definition::RunnableRef;
use crate::error::{AgentError, Result};
use crate::function::FunctionRunner;
use crate::llm::LlmModel;
use crate::memory::Memorable;
use crate::openapi::{HttpClient, OperationCatalog, ReqwestHttpClient};
use crate::registry::Registry;
use crate::runnable::Runnable;

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Read-only request state visible to every agent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

// ---------------------------------------------------------------------------
// Services
// ---------------------------------------------------------------------------

/// Collaborators injected into agents.
///
/// Built once per process and shared behind an `Arc`.  Each collaborator
/// is optional where the engine can run without it; agents that need a
/// missing one fail at run time.
pub struct Services {
    config: EngineConfig,
    model: Option<Arc<dyn LlmModel>>,
    function_runner: Option<Arc<dyn FunctionRunner>>,
    http: Arc<dyn HttpClient>,
    memories: HashMap<String, Arc<dyn Memorable>>,
    catalog: OperationCatalog,
}

impl Services {
    /// Services with a reqwest-backed HTTP client using the configured
    /// timeout, and no model or function runner.
    pub fn new(config: EngineConfig) -> Result<Self> {
        let http = ReqwestHttpClient::new(config.http.timeout())?;
        Ok(Self::with_http_client(config, Arc::new(http)))
    }

    /// Services with a caller-supplied HTTP client.
    pub fn with_http_client(config: EngineConfig, http: Arc<dyn HttpClient>) -> Self {
        Self {
            config,
            model: None,
            function_runner: None,
            http,
            memories: HashMap::new(),
            catalog: OperationCatalog::new(),
        }
    }

    /// Builder: inject the chat model.
    #[must_use]
    pub fn with_model(mut self, model: Arc<dyn LlmModel>) -> Self {
        self.model = Some(model);
        self
    }

    /// Builder: inject the function runner.
    #[must_use]
    pub fn with_function_runner(mut self, runner: Arc<dyn FunctionRunner>) -> Self {
        self.function_runner = Some(runner);
        self
    }

    /// Builder: register a memory store for bindings with this id.
    #[must_use]
    pub fn with_memory(mut self, binding_id: impl Into<String>, memory: Arc<dyn Memorable>) -> Self {
        self.memories.insert(binding_id.into(), memory);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The chat model, or [`AgentError::MissingModel`].
    pub fn model(&self) -> Result<Arc<dyn LlmModel>> {
        self.model.clone().ok_or(AgentError::MissingModel)
    }

    /// The function runner, or [`AgentError::MissingRunner`].
    pub fn function_runner(&self) -> Result<Arc<dyn FunctionRunner>> {
        self.function_runner.clone().ok_or(AgentError::MissingRunner)
    }

    pub fn http(&self) -> &Arc<dyn HttpClient> {
        &self.http
    }

    /// The memory store registered for a binding id.
    pub fn memory(&self, binding_id: &str) -> Option<Arc<dyn Memorable>> {
        self.memories.get(binding_id).cloned()
    }

    /// The memoized operation catalog used by blocklet agents.
    pub fn catalog(&self) -> &OperationCatalog {
        &self.catalog
    }
}

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Services")
            .field("config", &self.config)
            .field("model", &self.model.is_some())
            .field("function_runner", &self.function_runner.is_some())
            .field("memories", &self.memories.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

/// The per-request environment.  Cheap to clone.
#[derive(Debug, Clone)]
pub struct Context {
    state: ContextState,
    registry: Registry,
    services: Arc<Services>,
}

impl Context {
    pub fn new(registry: Registry, services: Arc<Services>) -> Self {
        Self {
            state: ContextState::default(),
            registry,
            services,
        }
    }

    /// Builder: set the request state.
    #[must_use]
    pub fn with_state(mut self, state: ContextState) -> Self {
        self.state = state;
        self
    }

    pub fn state(&self) -> &ContextState {
        &self.state
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    /// Instantiate a runnable from an id or an inline definition.
    ///
    /// An id registered as an instance yields that shared instance every
    /// time; an id registered as a definition, or an inline definition,
    /// yields a fresh instance per call.
    pub fn resolve(&self, reference: &RunnableRef) -> Result<Arc<dyn Runnable>> {
        match reference {
            RunnableRef::Id(id) => self.registry.resolve(id),
            RunnableRef::Definition(definition) => definition.instantiate(&self.registry),
        }
    }

    /// Shorthand for resolving by id.
    pub fn resolve_id(&self, id: &str) -> Result<Arc<dyn Runnable>> {
        self.registry.resolve(id)
    }
}

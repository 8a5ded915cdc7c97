//! Serializable agent definitions.
//!
//! Definitions are the build-time form of agents: plain data, tagged by
//! `type`, that reference each other by id.  [`AgentDefinition::instantiate`]
//! turns one into a [`Runnable`], validating composite definitions eagerly.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::decision::{DecisionAgentDefinition, LlmDecisionAgent};
use crate::error::Result;
use crate::function::{FunctionAgent, FunctionAgentDefinition};
use crate::llm_agent::{LlmAgent, LlmAgentDefinition};
use crate::openapi::{BlockletAgent, BlockletAgentDefinition, OpenApiAgent, OpenApiAgentDefinition};
use crate::pipeline::{PipelineAgent, PipelineAgentDefinition};
use crate::registry::Registry;
use crate::runnable::{Runnable, RunnableDefinition, RunnableInfo};

/// Any agent definition, tagged by `type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentDefinition {
    Llm(LlmAgentDefinition),
    Function(FunctionAgentDefinition),
    OpenApi(OpenApiAgentDefinition),
    Blocklet(BlockletAgentDefinition),
    Pipeline(PipelineAgentDefinition),
    Decision(DecisionAgentDefinition),
}

impl AgentDefinition {
    /// The shared part of the definition.
    pub fn base(&self) -> &RunnableDefinition {
        match self {
            Self::Llm(d) => &d.base,
            Self::Function(d) => &d.base,
            Self::OpenApi(d) => &d.base,
            Self::Blocklet(d) => &d.base,
            Self::Pipeline(d) => &d.base,
            Self::Decision(d) => &d.base,
        }
    }

    pub fn id(&self) -> &str {
        &self.base().id
    }

    /// The `type` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Llm(_) => "llm",
            Self::Function(_) => "function",
            Self::OpenApi(_) => "open_api",
            Self::Blocklet(_) => "blocklet",
            Self::Pipeline(_) => "pipeline",
            Self::Decision(_) => "decision",
        }
    }

    /// Definition-level info, without instantiating.
    pub fn info(&self) -> RunnableInfo {
        RunnableInfo::new(self.base().clone())
    }

    /// Build a runnable.
    ///
    /// Pipeline and decision definitions are validated against `registry`
    /// here; any structural problem is returned before execution.
    pub fn instantiate(&self, registry: &Registry) -> Result<Arc<dyn Runnable>> {
        let runnable: Arc<dyn Runnable> = match self {
            Self::Llm(d) => Arc::new(LlmAgent::new(d.clone())),
            Self::Function(d) => Arc::new(FunctionAgent::new(d.clone())),
            Self::OpenApi(d) => Arc::new(OpenApiAgent::new(d.clone())),
            Self::Blocklet(d) => Arc::new(BlockletAgent::new(d.clone())),
            Self::Pipeline(d) => Arc::new(PipelineAgent::new(d.clone(), registry)?),
            Self::Decision(d) => Arc::new(LlmDecisionAgent::new(d.clone(), registry)?),
        };
        Ok(runnable)
    }
}

/// A reference to a runnable: a registered id or an inline definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RunnableRef {
    Id(String),
    Definition(Box<AgentDefinition>),
}

impl RunnableRef {
    /// Definition-level info for the referenced runnable.
    pub fn info(&self, registry: &Registry) -> Result<RunnableInfo> {
        match self {
            Self::Id(id) => registry.info(id),
            Self::Definition(definition) => Ok(definition.info()),
        }
    }

    /// Like [`info`](Self::info), but an inline definition is also
    /// instantiated so a nested composite surfaces its own configuration
    /// errors now rather than mid-run.
    pub fn validate(&self, registry: &Registry) -> Result<RunnableInfo> {
        match self {
            Self::Id(id) => registry.info(id),
            Self::Definition(definition) => {
                definition.instantiate(registry)?;
                Ok(definition.info())
            }
        }
    }

    /// The referenced id, for logging.
    pub fn id(&self) -> &str {
        match self {
            Self::Id(id) => id,
            Self::Definition(definition) => definition.id(),
        }
    }
}

impl From<&str> for RunnableRef {
    fn from(id: &str) -> Self {
        Self::Id(id.to_owned())
    }
}

impl From<AgentDefinition> for RunnableRef {
    fn from(definition: AgentDefinition) -> Self {
        Self::Definition(Box::new(definition))
    }
}

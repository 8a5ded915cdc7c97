//! Agent that calls an operation of the configured app by its symbolic id.

use agentflow_core::RunChunk;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::context::Context;
use crate::error::{AgentError, Result};
use crate::memory::Memories;
use crate::openapi::agent::fetch_object;
use crate::openapi::auth::AuthConfig;
use crate::openapi::catalog::Operation;
use crate::openapi::request::{HttpRequest, ParameterLocation, RequestTemplate, build_request};
use crate::runnable::{Agent, ChunkStream, RunInput, RunnableDefinition, RunnableInfo};

/// Definition of a [`BlockletAgent`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockletAgentDefinition {
    #[serde(flatten)]
    pub base: RunnableDefinition,
    /// The operation's `x-id` in the app's service document.
    pub openapi_id: String,
    /// Input locations; these take precedence over the operation's own.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub parameters: IndexMap<String, ParameterLocation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<AuthConfig>,
}

impl BlockletAgentDefinition {
    /// Build the request for a discovered operation.
    pub fn build_request(&self, app_url: &str, operation: &Operation, input: &RunInput) -> Result<HttpRequest> {
        let url = format!("{}{}", app_url.trim_end_matches('/'), operation.path);
        let mut parameters = operation.parameters.clone();
        parameters.extend(self.parameters.iter().map(|(k, v)| (k.clone(), *v)));

        build_request(
            &RequestTemplate {
                url: &url,
                method: operation.method,
                inputs: &self.base.inputs,
                parameters: &parameters,
                auth: self.auth.as_ref(),
            },
            input,
        )
    }
}

/// Resolves its operation through the memoized catalog, then behaves like
/// an [`crate::openapi::OpenApiAgent`].
#[derive(Debug)]
pub struct BlockletAgent {
    info: RunnableInfo,
    definition: BlockletAgentDefinition,
}

impl BlockletAgent {
    pub fn new(definition: BlockletAgentDefinition) -> Self {
        Self {
            info: RunnableInfo::new(definition.base.clone()),
            definition,
        }
    }
}

impl Agent for BlockletAgent {
    fn agent_info(&self) -> &RunnableInfo {
        &self.info
    }

    fn process<'a>(
        &'a self,
        input: RunInput,
        context: &'a Context,
        _memories: Memories,
    ) -> ChunkStream<'a> {
        Box::pin(async_stream::try_stream! {
            let services = context.services();
            let app_url = services
                .config()
                .blocklet
                .app_url
                .as_deref()
                .filter(|url| !url.trim().is_empty())
                .ok_or(AgentError::MissingUrl)?;
            let http = services.http().as_ref();

            let operation = services
                .catalog()
                .find(http, app_url, &self.definition.openapi_id)
                .await?;
            let request = self.definition.build_request(app_url, &operation, &input)?;
            tracing::debug!(
                agent_id = %self.info.id(),
                operation = %operation.id,
                url = %request.url,
                "calling operation"
            );

            let output = fetch_object(http, &request).await?;
            yield RunChunk::delta(output);
        })
    }
}

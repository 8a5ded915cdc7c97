//! Agent that calls an HTTP endpoint described by url, method, and input
//! locations.

use agentflow_core::RunChunk;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::Context;
use crate::error::{AgentError, Result};
use crate::memory::Memories;
use crate::openapi::auth::AuthConfig;
use crate::openapi::request::{HttpMethod, HttpRequest, ParameterLocation, RequestTemplate, build_request};
use crate::openapi::transport::HttpClient;
use crate::runnable::{Agent, ChunkStream, RunInput, RunOutput, RunnableDefinition, RunnableInfo};

/// Definition of an [`OpenApiAgent`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenApiAgentDefinition {
    #[serde(flatten)]
    pub base: RunnableDefinition,
    /// Endpoint with `{name}` placeholders for path inputs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default)]
    pub method: HttpMethod,
    /// Input locations, keyed by input id or name.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub parameters: IndexMap<String, ParameterLocation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<AuthConfig>,
}

impl OpenApiAgentDefinition {
    /// Build the request this definition sends for `input`.
    pub fn build_request(&self, input: &RunInput) -> Result<HttpRequest> {
        build_request(
            &RequestTemplate {
                url: self.url.as_deref().unwrap_or_default(),
                method: self.method,
                inputs: &self.base.inputs,
                parameters: &self.parameters,
                auth: self.auth.as_ref(),
            },
            input,
        )
    }
}

/// Send a request and require an object response.
pub(crate) async fn fetch_object(http: &dyn HttpClient, request: &HttpRequest) -> Result<RunOutput> {
    match http.send(request).await? {
        Value::Object(map) => Ok(map),
        _ => Err(AgentError::InvalidResponse {
            url: request.url.clone(),
        }),
    }
}

/// Calls one HTTP endpoint and emits the JSON response as a single delta.
#[derive(Debug)]
pub struct OpenApiAgent {
    info: RunnableInfo,
    definition: OpenApiAgentDefinition,
}

impl OpenApiAgent {
    pub fn new(definition: OpenApiAgentDefinition) -> Self {
        Self {
            info: RunnableInfo::new(definition.base.clone()),
            definition,
        }
    }
}

impl Agent for OpenApiAgent {
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
            let request = self.definition.build_request(&input)?;
            tracing::debug!(agent_id = %self.info.id(), url = %request.url, "calling endpoint");
            let output = fetch_object(context.services().http().as_ref(), &request).await?;
            yield RunChunk::delta(output);
        })
    }
}

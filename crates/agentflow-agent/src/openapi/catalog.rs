//! Remote operation discovery for blocklet agents.
//!
//! The service document at `{app_url}/.well-known/service/openapi.json` is
//! fetched once per process and flattened into a list of [`Operation`]s
//! keyed by their `x-id` extension.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::OnceCell;

use crate::error::{AgentError, Result};
use crate::openapi::request::{HttpMethod, HttpRequest, ParameterLocation};
use crate::openapi::transport::HttpClient;

/// Path of the service document relative to the app url.
pub const OPENAPI_DOCUMENT_PATH: &str = "/.well-known/service/openapi.json";

/// One remote operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    /// The `x-id` extension value.
    pub id: String,
    pub path: String,
    pub method: HttpMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Declared parameter locations by name.
    #[serde(default)]
    pub parameters: IndexMap<String, ParameterLocation>,
}

/// Flatten `{paths: {path: {method: operation}}}` into operations.
///
/// Operations without an `x-id`, and methods that are not HTTP verbs, are
/// skipped.  Parameters with an unknown `in` are dropped.
pub fn flatten_operations(document: &Value) -> Vec<Operation> {
    let Some(paths) = document.get("paths").and_then(Value::as_object) else {
        return Vec::new();
    };

    let mut operations = Vec::new();
    for (path, methods) in paths {
        let Some(methods) = methods.as_object() else {
            continue;
        };
        for (method, operation) in methods {
            let Some(method) = HttpMethod::parse(method) else {
                continue;
            };
            let Some(id) = operation.get("x-id").and_then(Value::as_str) else {
                continue;
            };

            let parameters = operation
                .get("parameters")
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
                .filter_map(|p| {
                    let name = p.get("name")?.as_str()?;
                    let location = ParameterLocation::parse(p.get("in")?.as_str()?)?;
                    Some((name.to_owned(), location))
                })
                .collect();

            operations.push(Operation {
                id: id.to_owned(),
                path: path.clone(),
                method,
                summary: operation
                    .get("summary")
                    .and_then(Value::as_str)
                    .map(str::to_owned),
                parameters,
            });
        }
    }
    operations
}

/// Process-lifetime cache of the remote operation list.
#[derive(Debug, Default)]
pub struct OperationCatalog {
    operations: OnceCell<Vec<Operation>>,
}

impl OperationCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch the operation list on first use; later calls reuse it.
    pub async fn operations(&self, http: &dyn HttpClient, app_url: &str) -> Result<&[Operation]> {
        let operations = self
            .operations
            .get_or_try_init(|| async {
                let url = format!("{}{}", app_url.trim_end_matches('/'), OPENAPI_DOCUMENT_PATH);
                let document = http
                    .send(&HttpRequest {
                        url: url.clone(),
                        ..HttpRequest::default()
                    })
                    .await?;
                let operations = flatten_operations(&document);
                tracing::info!(url = %url, operations = operations.len(), "operation catalog fetched");
                Ok::<_, AgentError>(operations)
            })
            .await?;
        Ok(operations)
    }

    /// Find an operation by its `x-id`.
    pub async fn find(&self, http: &dyn HttpClient, app_url: &str, id: &str) -> Result<Operation> {
        self.operations(http, app_url)
            .await?
            .iter()
            .find(|op| op.id == id)
            .cloned()
            .ok_or_else(|| AgentError::UnknownOperation { id: id.to_owned() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn flattens_by_x_id() {
        let document = json!({
            "paths": {
                "/api/users/{id}": {
                    "get": {
                        "x-id": "getUser",
                        "summary": "Fetch a user",
                        "parameters": [
                            { "name": "id", "in": "path" },
                            { "name": "fields", "in": "query" },
                            { "name": "weird", "in": "matrix" }
                        ]
                    },
                    "delete": { "summary": "no id" }
                },
                "/api/users": {
                    "post": { "x-id": "createUser" },
                    "parameters": [{ "name": "ignored", "in": "query" }]
                }
            }
        });

        let operations = flatten_operations(&document);
        assert_eq!(operations.len(), 2);

        let get = operations.iter().find(|op| op.id == "getUser").unwrap();
        assert_eq!(get.method, HttpMethod::Get);
        assert_eq!(get.path, "/api/users/{id}");
        assert_eq!(get.parameters.len(), 2);
        assert_eq!(get.parameters["id"], ParameterLocation::Path);

        let post = operations.iter().find(|op| op.id == "createUser").unwrap();
        assert_eq!(post.method, HttpMethod::Post);
        assert!(post.parameters.is_empty());
    }

    #[test]
    fn missing_paths_is_empty() {
        assert!(flatten_operations(&json!({})).is_empty());
    }
}

//! HTTP leaf agents.
//!
//! - [`request`]: pure request construction from inputs and locations.
//! - [`auth`]: auth-derived request entries.
//! - [`transport`]: the [`HttpClient`] seam and its reqwest implementation.
//! - [`catalog`]: memoized operation discovery for blocklet agents.

pub mod agent;
pub mod auth;
pub mod blocklet;
pub mod catalog;
pub mod request;
pub mod transport;

pub use agent::{OpenApiAgent, OpenApiAgentDefinition};
pub use auth::{AuthConfig, AuthLocation, CustomAuth};
pub use blocklet::{BlockletAgent, BlockletAgentDefinition};
pub use catalog::{Operation, OperationCatalog, flatten_operations};
pub use request::{HttpMethod, HttpRequest, ParameterLocation, RequestTemplate, build_request};
pub use transport::{HttpClient, ReqwestHttpClient};

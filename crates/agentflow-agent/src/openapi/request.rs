//! HTTP request construction for OpenAPI-style agents.
//!
//! [`build_request`] is pure: it routes each declared input into the URL
//! path, query, headers, cookies, or JSON body, merges in auth-derived
//! entries (auth wins on collision), and drops empty buckets.

use agentflow_core::{DataType, OrderedRecord, render};
use indexmap::IndexMap;
use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{AgentError, Result};
use crate::openapi::auth::{AuthConfig, AuthLocation};
use crate::runnable::RunInput;

/// Characters escaped when a value is substituted into a path segment.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// String-valued request bucket (query, headers, cookies).
pub type StringMap = IndexMap<String, String>;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// HTTP method.  Serialized uppercase; lowercase is accepted on input.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    #[serde(alias = "get")]
    Get,
    #[serde(alias = "post")]
    Post,
    #[serde(alias = "put")]
    Put,
    #[serde(alias = "patch")]
    Patch,
    #[serde(alias = "delete")]
    Delete,
    #[serde(alias = "head")]
    Head,
    #[serde(alias = "options")]
    Options,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
        }
    }

    /// Parse a method name in any case.
    pub fn parse(method: &str) -> Option<Self> {
        match method.to_ascii_uppercase().as_str() {
            "GET" => Some(Self::Get),
            "POST" => Some(Self::Post),
            "PUT" => Some(Self::Put),
            "PATCH" => Some(Self::Patch),
            "DELETE" => Some(Self::Delete),
            "HEAD" => Some(Self::Head),
            "OPTIONS" => Some(Self::Options),
            _ => None,
        }
    }

    /// Methods whose undeclared inputs default to the query string.
    pub fn is_get_like(&self) -> bool {
        matches!(self, Self::Get | Self::Head | Self::Options | Self::Delete)
    }
}

/// Where an input is placed in the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterLocation {
    Path,
    Query,
    Header,
    Cookie,
    Body,
}

impl ParameterLocation {
    pub fn parse(location: &str) -> Option<Self> {
        match location {
            "path" => Some(Self::Path),
            "query" => Some(Self::Query),
            "header" => Some(Self::Header),
            "cookie" => Some(Self::Cookie),
            "body" => Some(Self::Body),
            _ => None,
        }
    }
}

/// A fully built request.  Empty buckets are `None`, never `{}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HttpRequest {
    pub url: String,
    pub method: HttpMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<StringMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<StringMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cookies: Option<StringMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Map<String, Value>>,
}

/// Everything [`build_request`] needs.
#[derive(Debug, Clone, Copy)]
pub struct RequestTemplate<'a> {
    /// URL with `{name}` placeholders for path inputs.
    pub url: &'a str,
    pub method: HttpMethod,
    /// Declared inputs.
    pub inputs: &'a OrderedRecord<DataType>,
    /// Explicit locations, keyed by input id or input name.
    pub parameters: &'a IndexMap<String, ParameterLocation>,
    pub auth: Option<&'a AuthConfig>,
}

// ---------------------------------------------------------------------------
// Building
// ---------------------------------------------------------------------------

/// Build the request for `input`.
pub fn build_request(template: &RequestTemplate<'_>, input: &RunInput) -> Result<HttpRequest> {
    if template.url.trim().is_empty() {
        return Err(AgentError::MissingUrl);
    }

    let mut url = template.url.to_owned();
    let mut headers = StringMap::new();
    let mut query = StringMap::new();
    let mut cookies = StringMap::new();
    let mut body = Map::new();

    for declared in template.inputs {
        let name = declared.key();
        let Some(value) = input.get(name).filter(|v| !v.is_null()) else {
            continue;
        };

        let location = template
            .parameters
            .get(&declared.id)
            .or_else(|| template.parameters.get(name))
            .copied()
            .unwrap_or(if template.method.is_get_like() {
                ParameterLocation::Query
            } else {
                ParameterLocation::Body
            });

        match location {
            ParameterLocation::Path => {
                let encoded = utf8_percent_encode(&value_to_string(value), PATH_SEGMENT).to_string();
                url = url.replace(&format!("{{{name}}}"), &encoded);
            }
            ParameterLocation::Query => {
                query.insert(name.to_owned(), value_to_string(value));
            }
            ParameterLocation::Header => {
                headers.insert(name.to_owned(), value_to_string(value));
            }
            ParameterLocation::Cookie => {
                cookies.insert(name.to_owned(), value_to_string(value));
            }
            ParameterLocation::Body => {
                body.insert(name.to_owned(), value.clone());
            }
        }
    }

    if let Some(auth) = template.auth {
        let (location, entries) = auth.entries()?;
        let bucket = match location {
            AuthLocation::Header => &mut headers,
            AuthLocation::Query => &mut query,
            AuthLocation::Cookie => &mut cookies,
        };
        bucket.extend(entries);
    }

    let non_empty = |map: StringMap| (!map.is_empty()).then_some(map);
    Ok(HttpRequest {
        url,
        method: template.method,
        headers: non_empty(headers),
        query: non_empty(query),
        cookies: non_empty(cookies),
        body: (!body.is_empty()).then_some(body),
    })
}

/// Strings as-is, everything else as compact JSON.
fn value_to_string(value: &Value) -> String {
    let mut vars = Map::new();
    vars.insert("value".into(), value.clone());
    render("{{value}}", &vars)
}

//! HTTP transport for leaf HTTP agents.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{COOKIE, HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;
use url::Url;

use crate::error::{AgentError, Result};
use crate::openapi::request::{HttpMethod, HttpRequest};

/// Sends a built [`HttpRequest`] and returns the decoded JSON body.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn send(&self, request: &HttpRequest) -> Result<Value>;
}

/// [`HttpClient`] backed by `reqwest`, with a fixed timeout.
#[derive(Debug, Clone)]
pub struct ReqwestHttpClient {
    client: Client,
}

impl ReqwestHttpClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn send(&self, request: &HttpRequest) -> Result<Value> {
        let mut url = Url::parse(&request.url).map_err(|e| AgentError::Request {
            reason: format!("invalid url {}: {e}", request.url),
        })?;
        if let Some(query) = &request.query {
            url.query_pairs_mut()
                .extend_pairs(query.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        }

        let mut headers = HeaderMap::new();
        for (name, value) in request.headers.iter().flatten() {
            headers.insert(header_name(name)?, header_value(value)?);
        }
        if let Some(cookies) = &request.cookies {
            let cookie = cookies
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join("; ");
            headers.insert(COOKIE, header_value(&cookie)?);
        }

        let mut builder = self
            .client
            .request(to_reqwest_method(request.method), url.clone())
            .headers(headers);
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        tracing::debug!(url = %url, method = request.method.as_str(), "sending request");
        let response = builder.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            let message = error_message(&text)
                .unwrap_or_else(|| format!("{} fetching {}", status.as_u16(), request.url));
            tracing::debug!(url = %request.url, status = status.as_u16(), "request failed");
            return Err(AgentError::Http {
                status: status.as_u16(),
                message,
            });
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }
}

/// `error.message`, else `message`, from a JSON error body.
pub fn error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    value
        .pointer("/error/message")
        .and_then(Value::as_str)
        .or_else(|| value.get("message").and_then(Value::as_str))
        .map(str::to_owned)
}

fn to_reqwest_method(method: HttpMethod) -> reqwest::Method {
    match method {
        HttpMethod::Get => reqwest::Method::GET,
        HttpMethod::Post => reqwest::Method::POST,
        HttpMethod::Put => reqwest::Method::PUT,
        HttpMethod::Patch => reqwest::Method::PATCH,
        HttpMethod::Delete => reqwest::Method::DELETE,
        HttpMethod::Head => reqwest::Method::HEAD,
        HttpMethod::Options => reqwest::Method::OPTIONS,
    }
}

fn header_name(name: &str) -> Result<HeaderName> {
    HeaderName::from_bytes(name.as_bytes()).map_err(|e| AgentError::Request {
        reason: format!("invalid header name {name}: {e}"),
    })
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value).map_err(|e| AgentError::Request {
        reason: format!("invalid header value: {e}"),
    })
}

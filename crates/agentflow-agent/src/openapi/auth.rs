//! Request authentication.
//!
//! An [`AuthConfig`] produces request entries that are merged into one
//! bucket after the agent's own inputs, overriding them on collision.

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use crate::error::{AgentError, Result};
use crate::openapi::request::StringMap;

/// Entry key used when an auth config does not name one.
pub const DEFAULT_AUTH_KEY: &str = "Authorization";

/// The bucket auth entries are placed in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthLocation {
    #[default]
    Header,
    Query,
    Cookie,
}

/// Headers computed by user code.
#[derive(Clone)]
pub struct CustomAuth(Arc<dyn Fn() -> StringMap + Send + Sync>);

impl CustomAuth {
    pub fn new(f: impl Fn() -> StringMap + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub fn headers(&self) -> StringMap {
        (self.0)()
    }
}

impl std::fmt::Debug for CustomAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("CustomAuth(..)")
    }
}

/// Authentication scheme, tagged by `type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthConfig {
    #[serde(alias = "apiKey")]
    ApiKey {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        key: Option<String>,
        #[serde(default, rename = "in")]
        location: AuthLocation,
        token: String,
    },
    Basic {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        key: Option<String>,
        #[serde(default, rename = "in")]
        location: AuthLocation,
        /// A prepared credential; takes precedence over username/password.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        token: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        username: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        password: Option<String>,
    },
    Bearer {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        key: Option<String>,
        #[serde(default, rename = "in")]
        location: AuthLocation,
        token: String,
    },
    /// Only constructible from code.
    #[serde(skip)]
    Custom(CustomAuth),
}

impl AuthConfig {
    pub fn bearer(token: impl Into<String>) -> Self {
        Self::Bearer {
            key: None,
            location: AuthLocation::Header,
            token: token.into(),
        }
    }

    pub fn custom(f: impl Fn() -> StringMap + Send + Sync + 'static) -> Self {
        Self::Custom(CustomAuth::new(f))
    }

    /// The target bucket and the entries to merge into it.
    pub fn entries(&self) -> Result<(AuthLocation, StringMap)> {
        let single = |key: &Option<String>, value: String| {
            let key = key.clone().unwrap_or_else(|| DEFAULT_AUTH_KEY.to_owned());
            StringMap::from([(key, value)])
        };

        match self {
            Self::ApiKey { key, location, token } => Ok((*location, single(key, token.clone()))),
            Self::Bearer { key, location, token } => {
                Ok((*location, single(key, format!("Bearer {token}"))))
            }
            Self::Basic {
                key,
                location,
                token,
                username,
                password,
            } => {
                let credential = match (token, username) {
                    (Some(token), _) => token.clone(),
                    (None, Some(username)) => {
                        let password = password.as_deref().unwrap_or_default();
                        STANDARD.encode(format!("{username}:{password}"))
                    }
                    (None, None) => {
                        return Err(AgentError::Config {
                            reason: "basic auth requires a token or a username".into(),
                        });
                    }
                };
                Ok((*location, single(key, format!("Basic {credential}"))))
            }
            Self::Custom(custom) => Ok((AuthLocation::Header, custom.headers())),
        }
    }
}

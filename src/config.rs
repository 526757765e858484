//! # Application Configuration
//!
//! [`AppConfig`] is read from YAML, then selected values can be overridden
//! from the environment:
//!
//! ```yaml
//! http:
//!   addr: 0.0.0.0:8080
//!   stack_size: 0x8000
//!   max_body_bytes: 1048576
//! base_path: /api
//! cors:
//!   enabled: true
//!   allowed_origins: ["https://example.com"]
//! graphql:
//!   enabled: true
//!   path: /graphql
//! chain:
//!   groups: [send-response, cors, middleware, find-route, authentication, parse-params, invoke-operation]
//! ```
//!
//! | Variable | Overrides |
//! |----------|-----------|
//! | `BRRTC_ADDR` | `http.addr` |
//! | `BRRTC_STACK_SIZE` | `http.stack_size` |

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use tracing::{debug, warn};

use crate::runtime_config::{parse_size, DEFAULT_STACK_SIZE};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub http: HttpConfig,
    /// Prefix applied to every registered route (e.g. `/api`)
    pub base_path: Option<String>,
    pub cors: CorsConfig,
    pub graphql: GraphQlConfig,
    pub chain: ChainConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub addr: String,
    /// Coroutine stack size in bytes; YAML accepts `0x` hex strings
    #[serde(deserialize_with = "deserialize_size")]
    pub stack_size: usize,
    /// Requests with a larger body are rejected by the transport with 413
    pub max_body_bytes: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:8080".to_string(),
            stack_size: DEFAULT_STACK_SIZE,
            max_body_bytes: 1024 * 1024,
        }
    }
}

/// CORS settings; see [`crate::middleware::CorsMiddlewareBuilder::from_config`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    pub enabled: bool,
    pub allowed_origins: Vec<String>,
    pub origin_patterns: Vec<String>,
    pub allowed_headers: Vec<String>,
    pub allowed_methods: Vec<String>,
    pub allow_credentials: bool,
    pub expose_headers: Vec<String>,
    pub max_age: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphQlConfig {
    /// When false, [`crate::application::Application::mount_graphql`] mounts nothing
    pub enabled: bool,
    pub path: String,
}

impl Default for GraphQlConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: "/graphql".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    /// Group order override, outermost first
    pub groups: Option<Vec<String>>,
}

fn deserialize_size<'de, D>(deserializer: D) -> Result<usize, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Size {
        Number(usize),
        Text(String),
    }
    match Size::deserialize(deserializer)? {
        Size::Number(n) if n > 0 => Ok(n),
        Size::Number(_) => Err(serde::de::Error::custom("stack size must be positive")),
        Size::Text(s) => parse_size(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid size '{s}'"))),
    }
}

impl AppConfig {
    /// Parse YAML text
    ///
    /// # Errors
    ///
    /// Malformed YAML or an invalid field value.
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).context("Failed to parse configuration")
    }

    /// Read a YAML file and apply environment overrides
    ///
    /// # Errors
    ///
    /// The file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config = Self::from_yaml_str(&text)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        config.apply_env_overrides();
        debug!(path = %path.display(), addr = %config.http.addr, "Configuration loaded");
        Ok(config)
    }

    /// Apply `BRRTC_ADDR` and `BRRTC_STACK_SIZE`
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(env::var("BRRTC_ADDR").ok(), env::var("BRRTC_STACK_SIZE").ok());
    }

    fn apply_overrides(&mut self, addr: Option<String>, stack_size: Option<String>) {
        if let Some(addr) = addr.filter(|a| !a.trim().is_empty()) {
            self.http.addr = addr;
        }
        if let Some(raw) = stack_size {
            match parse_size(&raw) {
                Some(size) => self.http.stack_size = size,
                None => warn!(value = %raw, "Ignoring invalid BRRTC_STACK_SIZE"),
            }
        }
    }
}

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SwitchboardError};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelConfig {
    pub provider: String,
    pub model: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RouterConfig {
    #[serde(default = "default_max_model_turns")]
    pub max_model_turns: usize,
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            max_model_turns: default_max_model_turns(),
            tool_timeout_secs: default_tool_timeout_secs(),
        }
    }
}

impl RouterConfig {
    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }
}

fn default_max_model_turns() -> usize {
    6
}

fn default_tool_timeout_secs() -> u64 {
    30
}

/// One remote MCP tool server. Keyed by a human-chosen label in the
/// `[mcp_servers.<label>]` table; the label doubles as the server name in
/// logs and discovery errors.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerEndpoint {
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub model: ModelConfig,
    #[serde(default)]
    pub router: RouterConfig,
    #[serde(default)]
    pub mcp_servers: BTreeMap<String, ServerEndpoint>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".into(),
                port: 8000,
            },
            model: ModelConfig {
                provider: "groq".into(),
                model: "llama3-8b-8192".into(),
                api_key: None,
                base_url: None,
            },
            router: RouterConfig::default(),
            mcp_servers: BTreeMap::new(),
        }
    }
}

impl AppConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        let cfg: Self = toml::from_str(&raw).map_err(|err| {
            SwitchboardError::Config(format!("failed to parse configuration: {err}"))
        })?;
        Ok(cfg)
    }

    pub fn from_env_or_file(path: impl AsRef<Path>) -> Result<Self> {
        let mut cfg = Self::from_file(path)?;
        if let Ok(host) = env::var("SWITCHBOARD_HOST") {
            cfg.server.host = host;
        }
        if let Ok(port) = env::var("SWITCHBOARD_PORT") {
            if let Ok(parsed) = port.parse::<u16>() {
                cfg.server.port = parsed;
            }
        }
        if let Ok(turns) = env::var("SWITCHBOARD_MAX_TURNS") {
            if let Ok(parsed) = turns.parse::<usize>() {
                cfg.router.max_model_turns = parsed;
            }
        }
        if let Ok(timeout) = env::var("SWITCHBOARD_TOOL_TIMEOUT_SECS") {
            if let Ok(parsed) = timeout.parse::<u64>() {
                cfg.router.tool_timeout_secs = parsed;
            }
        }
        if let Ok(key) = env::var("GROQ_API_KEY") {
            cfg.model.api_key = Some(key);
        }
        Ok(cfg)
    }
}

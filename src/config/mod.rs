//! Configuration Management
//!
//! Loads and manages agent-core configuration from a TOML file, with
//! environment-variable overrides and field defaults, matching the layered
//! resolution the teacher crate uses for `selfware.toml`.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    pub api_key: Option<String>,

    /// Directory holding the seven persisted JSON stores (§6).
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Project root under which `module_path`s in tool metadata are resolved
    /// by the self-modification engine (§4.7).
    #[serde(default = "default_project_root")]
    pub project_root: PathBuf,

    #[serde(default)]
    pub critics: CriticConfig,

    #[serde(default)]
    pub agent: AgentConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CriticConfig {
    /// Number of independent reviewers run per code change. Bounded at 4 by
    /// the concurrency model in §5.
    #[serde(default = "default_critic_count")]
    pub count: usize,
}

impl Default for CriticConfig {
    fn default() -> Self {
        Self {
            count: default_critic_count(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Bound on replans per goal (§9 open question (b), resolved to 3).
    #[serde(default = "default_max_replans")]
    pub max_replans_per_goal: usize,

    /// Cap on the archived-task history (§4.3).
    #[serde(default = "default_archive_cap")]
    pub archived_task_cap: usize,

    /// Cap on the number of facts surfaced to a single plan (§4.11 step 2).
    #[serde(default = "default_fact_cap")]
    pub max_relevant_facts: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_replans_per_goal: default_max_replans(),
            archived_task_cap: default_archive_cap(),
            max_relevant_facts: default_fact_cap(),
        }
    }
}

fn default_endpoint() -> String {
    "http://localhost:11434/v1/chat/completions".to_string()
}
fn default_model() -> String {
    "default-model".to_string()
}
fn default_max_tokens() -> usize {
    4096
}
fn default_temperature() -> f32 {
    0.2
}
fn default_data_dir() -> PathBuf {
    PathBuf::from(".agentcore")
}
fn default_project_root() -> PathBuf {
    PathBuf::from(".")
}
fn default_critic_count() -> usize {
    2
}
fn default_max_replans() -> usize {
    3
}
fn default_archive_cap() -> usize {
    100
}
fn default_fact_cap() -> usize {
    7
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            api_key: None,
            data_dir: default_data_dir(),
            project_root: default_project_root(),
            critics: CriticConfig::default(),
            agent: AgentConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from `path` if given, else `agentcore.toml` in the
    /// current directory, else `~/.config/agentcore/config.toml`, falling
    /// back to defaults. Environment variables always win.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut config: Self = match path {
            Some(p) => {
                let content = std::fs::read_to_string(p)
                    .with_context(|| format!("failed to read config from {}", p))?;
                toml::from_str(&content).context("failed to parse config")?
            }
            None => {
                let home_config = dirs::home_dir()
                    .map(|h| h.join(".config/agentcore/config.toml"))
                    .and_then(|p| p.to_str().map(String::from));

                let mut default_paths: Vec<&str> = vec!["agentcore.toml"];
                let home_config_str: String;
                if let Some(ref hc) = home_config {
                    home_config_str = hc.clone();
                    default_paths.push(&home_config_str);
                }

                let mut loaded = None;
                for p in &default_paths {
                    if let Ok(content) = std::fs::read_to_string(p) {
                        loaded = Some(toml::from_str(&content).context("failed to parse config")?);
                        break;
                    }
                }
                loaded.unwrap_or_default()
            }
        };

        if let Ok(endpoint) = std::env::var("AGENTCORE_ENDPOINT") {
            config.endpoint = endpoint;
        }
        if let Ok(model) = std::env::var("AGENTCORE_MODEL") {
            config.model = model;
        }
        if let Ok(api_key) = std::env::var("AGENTCORE_API_KEY") {
            config.api_key = Some(api_key);
        }
        if let Ok(max_tokens) = std::env::var("AGENTCORE_MAX_TOKENS") {
            if let Ok(n) = max_tokens.parse::<usize>() {
                config.max_tokens = n;
            }
        }
        if let Ok(temp) = std::env::var("AGENTCORE_TEMPERATURE") {
            if let Ok(t) = temp.parse::<f32>() {
                config.temperature = t;
            }
        }
        if let Ok(dir) = std::env::var("AGENTCORE_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }

        Ok(config)
    }
}

//! Configuration management

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use crate::Result;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Working directory the tools operate in; the current directory when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace: Option<PathBuf>,

    /// Model to use
    #[serde(default = "default_model")]
    pub model: String,

    /// Key under which the provider's tokens are cached
    #[serde(default = "default_provider_key")]
    pub provider_key: String,

    /// Token cache file
    #[serde(default = "default_credentials_path")]
    pub credentials_path: PathBuf,

    /// System instructions sent with every request
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

fn default_model() -> String {
    "gpt-5.1-codex-mini".to_string()
}

fn default_provider_key() -> String {
    "openai_oauth_responses".to_string()
}

fn default_credentials_path() -> PathBuf {
    config_dir().join("providers.json")
}

fn default_system_prompt() -> String {
    "You are a coding assistant with access to tools: Read, Edit, Bash, and Grep.\n\
     When the user asks you to modify code, use your tools to find files, read them,\n\
     and make changes. Do not ask the user for file paths; search for them yourself.\n\
     Act, don't ask.\n"
        .to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workspace: None,
            model: default_model(),
            provider_key: default_provider_key(),
            credentials_path: default_credentials_path(),
            system_prompt: default_system_prompt(),
        }
    }
}

impl Config {
    /// Configured workspace, resolved against the current directory at call time
    pub fn workspace(&self) -> PathBuf {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        match &self.workspace {
            Some(path) => cwd.join(path),
            None => cwd,
        }
    }
}

/// Get the config directory path
pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".quill")
}

/// Get the config file path
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

/// Load configuration from file, falling back to defaults when absent
pub fn load() -> Result<Config> {
    load_from(&config_path())
}

/// Load configuration from an explicit path
pub fn load_from(path: &std::path::Path) -> Result<Config> {
    if !path.exists() {
        tracing::debug!("No config at {:?}, using defaults", path);
        return Ok(Config::default());
    }

    let content = std::fs::read_to_string(path)?;
    let config: Config = serde_json::from_str(&content)?;
    Ok(config)
}

/// Save configuration to file
pub fn save(config: &Config) -> Result<()> {
    save_to(config, &config_path())
}

/// Save configuration to an explicit path
pub fn save_to(config: &Config, path: &std::path::Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let content = serde_json::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}

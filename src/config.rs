//! File and environment configuration.
//!
//! Settings come from a YAML file (by default
//! `<config dir>/physio-chat/config.yaml`) and are then overridden by
//! `PHYSIO_CHAT_*` environment variables.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ChatError;

/// Prefix shared by every environment variable read by [`ChatConfig::apply_env`].
pub const ENV_PREFIX: &str = "PHYSIO_CHAT_";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChatConfig {
    /// Absolute URL of the chat endpoint
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub model: Option<String>,
    /// System prompt sent ahead of the conversation
    pub system: Option<String>,
    pub timeout_seconds: Option<u64>,
    pub proxy_url: Option<String>,
    /// Prefer streamed replies; defaults to `true` when unset
    pub stream: Option<bool>,
}

impl ChatConfig {
    /// Location of the user's config file, if the platform has a config dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("physio-chat").join("config.yaml"))
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self, ChatError> {
        Ok(serde_yaml::from_str(raw)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, ChatError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ChatError::ConfigError(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_yaml_str(&raw)
    }

    /// Reads `path` (or the default file when it exists) and applies the
    /// process environment on top.
    pub fn load(path: Option<&Path>) -> Result<Self, ChatError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path() {
                Some(path) if path.is_file() => {
                    log::debug!("loading chat config from {}", path.display());
                    Self::from_file(&path)?
                }
                _ => Self::default(),
            },
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Overrides fields from `PHYSIO_CHAT_*` variables found through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ChatError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));

        if let Some(value) = var("ENDPOINT") {
            self.endpoint = Some(value);
        }
        if let Some(value) = var("API_KEY") {
            self.api_key = Some(value);
        }
        if let Some(value) = var("MODEL") {
            self.model = Some(value);
        }
        if let Some(value) = var("SYSTEM") {
            self.system = Some(value);
        }
        if let Some(value) = var("TIMEOUT_SECONDS") {
            let seconds = value.trim().parse().map_err(|e| {
                ChatError::ConfigError(format!("{ENV_PREFIX}TIMEOUT_SECONDS={value}: {e}"))
            })?;
            self.timeout_seconds = Some(seconds);
        }
        if let Some(value) = var("PROXY_URL") {
            self.proxy_url = Some(value);
        }
        if let Some(value) = var("STREAM") {
            self.stream = Some(parse_flag(&value).ok_or_else(|| {
                ChatError::ConfigError(format!("{ENV_PREFIX}STREAM={value}: expected true or false"))
            })?);
        }
        Ok(())
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

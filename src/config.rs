use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

const APP_DIR: &str = "newsbrief";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AiBackend {
    #[default]
    OpenAi,
    OpenRouter,
    Claude,
}

impl fmt::Display for AiBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AiBackend::OpenAi => "openai",
            AiBackend::OpenRouter => "openrouter",
            AiBackend::Claude => "claude",
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: String,

    #[serde(default)]
    pub ai_backend: AiBackend,

    pub openai_api_key: Option<String>,
    pub openrouter_api_key: Option<String>,
    pub claude_api_key: Option<String>,

    /// Sent as the referer to OpenRouter.
    pub app_url: Option<String>,

    /// Six-field cron expression (seconds first), evaluated in UTC.
    #[serde(default = "default_ingest_schedule")]
    pub ingest_schedule: String,

    #[serde(default = "default_max_items_per_source")]
    pub max_items_per_source: usize,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_db_path() -> String {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
        .join("newsbrief.db")
        .to_string_lossy()
        .to_string()
}

fn default_ingest_schedule() -> String {
    "0 0 8 * * *".to_string()
}

fn default_max_items_per_source() -> usize {
    3
}

fn default_request_timeout() -> u64 {
    60
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            ai_backend: AiBackend::default(),
            openai_api_key: None,
            openrouter_api_key: None,
            claude_api_key: None,
            app_url: None,
            ingest_schedule: default_ingest_schedule(),
            max_items_per_source: default_max_items_per_source(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl Config {
    /// Loads from `path` (or the default location), writing defaults on first
    /// run, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = path.map(Path::to_path_buf).unwrap_or_else(Self::config_path);

        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str::<Config>(&content)?
        } else {
            let config = Config::default();
            config.save_to(&config_path)?;
            config
        };

        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self).map_err(|e| AppError::Config(e.to_string()))?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
            .join("config.toml")
    }

    fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = non_empty("OPENAI_API_KEY") {
            self.openai_api_key = Some(key);
        }
        if let Some(key) = non_empty("OPENROUTER_API_KEY") {
            self.openrouter_api_key = Some(key);
        }
        if let Some(key) = non_empty("ANTHROPIC_API_KEY") {
            self.claude_api_key = Some(key);
        }
        if let Some(url) = non_empty("APP_URL") {
            self.app_url = Some(url);
        }
    }
}

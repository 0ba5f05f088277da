use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub telegram: TelegramConfig,
    #[serde(default = "default_database_config")]
    pub database: DatabaseConfig,
    /// Per-matcher settings keyed by matcher identifier
    #[serde(default)]
    pub matchers: HashMap<String, MatcherConfig>,
    #[serde(default = "default_topflop_config")]
    pub topflop: TopFlopConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
    /// The only chat the bot serves; messages from other chats are ignored
    pub chat_id: i64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MatcherConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TopFlopConfig {
    #[serde(default = "default_limit")]
    pub default_limit: usize,
    #[serde(default = "default_max_limit")]
    pub max_limit: usize,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("tallybot.db")
}

fn default_enabled() -> bool {
    true
}

fn default_limit() -> usize {
    10
}

fn default_max_limit() -> usize {
    50
}

fn default_database_config() -> DatabaseConfig {
    DatabaseConfig {
        path: default_db_path(),
    }
}

fn default_topflop_config() -> TopFlopConfig {
    TopFlopConfig {
        default_limit: default_limit(),
        max_limit: default_max_limit(),
    }
}

impl Config {
    /// Whether the matcher with this identifier participates in dispatch.
    /// Matchers without a section are enabled.
    pub fn matcher_enabled(&self, identifier: &str) -> bool {
        self.matchers
            .get(identifier)
            .map(|m| m.enabled)
            .unwrap_or(true)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).context("Failed to parse config file")?;

        if config.telegram.bot_token.trim().is_empty() {
            anyhow::bail!("telegram.bot_token must not be empty");
        }
        if config.topflop.default_limit == 0 || config.topflop.max_limit == 0 {
            anyhow::bail!("topflop limits must be greater than zero");
        }

        Ok(config)
    }
}

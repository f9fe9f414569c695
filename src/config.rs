use crate::models::ChatId;
use crate::notifiers::vk::DEFAULT_API_VERSION;
use crate::retry::{RetryPolicy, DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::time::Duration;

pub const CONFIG_PATH: &str = "data/config.yaml";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Config {
    #[serde(default = "default_tracing_level")]
    pub tracing_level: String,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_seconds")]
    pub retry_delay_seconds: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default)]
    pub telegram: Option<TelegramConfig>,
    #[serde(default)]
    pub vk: Option<VkConfig>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TelegramConfig {
    pub bot_token: String,
    #[serde(default)]
    pub chat_ids: Vec<ChatId>,
    /// Self-hosted Bot API server instead of api.telegram.org
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct VkConfig {
    pub access_token: String,
    #[serde(default)]
    pub peer_ids: Vec<ChatId>,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
}

fn default_tracing_level() -> String {
    "info".to_string()
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_retry_delay_seconds() -> u64 {
    DEFAULT_RETRY_DELAY.as_secs()
}

fn default_user_agent() -> String {
    format!("adcast/{}", env!("CARGO_PKG_VERSION"))
}

fn default_api_version() -> String {
    DEFAULT_API_VERSION.to_string()
}

fn parse_chat_ids(raw: &str) -> Vec<ChatId> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ChatId::parse)
        .collect()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tracing_level: default_tracing_level(),
            max_retries: default_max_retries(),
            retry_delay_seconds: default_retry_delay_seconds(),
            user_agent: default_user_agent(),
            telegram: None,
            vk: None,
        }
    }
}

impl Config {
    pub fn load_from(config_path: &str) -> Result<Self> {
        let mut config: Config = match fs::read_to_string(config_path) {
            Ok(config_str) => serde_yaml::from_str(&config_str)
                .with_context(|| format!("Failed to parse {}", config_path))?,
            Err(_) => Config::default(),
        };

        config.apply_env_overrides()?;
        config.validate()?;

        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(tracing_level) = env::var("TRACING_LEVEL") {
            self.tracing_level = tracing_level;
        }

        if let Ok(max_retries) = env::var("MAX_RETRIES") {
            self.max_retries = max_retries.parse()
                .context("Failed to parse MAX_RETRIES environment variable")?;
        }

        if let Ok(retry_delay) = env::var("RETRY_DELAY_SECONDS") {
            self.retry_delay_seconds = retry_delay.parse()
                .context("Failed to parse RETRY_DELAY_SECONDS environment variable")?;
        }

        if let Ok(token) = env::var("TELEGRAM_BOT_TOKEN") {
            let telegram = self.telegram.get_or_insert_with(|| TelegramConfig {
                bot_token: String::new(),
                chat_ids: vec![],
                api_base: None,
            });
            telegram.bot_token = token;
        }

        if let Ok(chat_ids) = env::var("TELEGRAM_CHAT_IDS") {
            if let Some(telegram) = self.telegram.as_mut() {
                telegram.chat_ids = parse_chat_ids(&chat_ids);
            }
        }

        if let Ok(token) = env::var("VK_ACCESS_TOKEN") {
            let vk = self.vk.get_or_insert_with(|| VkConfig {
                access_token: String::new(),
                peer_ids: vec![],
                api_version: default_api_version(),
                api_url: None,
            });
            vk.access_token = token;
        }

        if let Ok(peer_ids) = env::var("VK_PEER_IDS") {
            if let Some(vk) = self.vk.as_mut() {
                vk.peer_ids = parse_chat_ids(&peer_ids);
            }
        }

        if let Ok(api_version) = env::var("VK_API_VERSION") {
            if let Some(vk) = self.vk.as_mut() {
                vk.api_version = api_version;
            }
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.telegram.is_none() && self.vk.is_none() {
            anyhow::bail!("No platform configured (set `telegram` or `vk` in {} or TELEGRAM_BOT_TOKEN / VK_ACCESS_TOKEN env vars)", CONFIG_PATH);
        }

        if let Some(telegram) = &self.telegram {
            if telegram.bot_token.is_empty() || telegram.bot_token == "YOUR_TELEGRAM_BOT_TOKEN" {
                anyhow::bail!("telegram.bot_token is required (set via {} or TELEGRAM_BOT_TOKEN env var)", CONFIG_PATH);
            }
            if telegram.chat_ids.is_empty() {
                anyhow::bail!("At least one Telegram chat id is required (set via {} or TELEGRAM_CHAT_IDS env var)", CONFIG_PATH);
            }
        }

        if let Some(vk) = &self.vk {
            if vk.access_token.is_empty() || vk.access_token == "YOUR_VK_ACCESS_TOKEN" {
                anyhow::bail!("vk.access_token is required (set via {} or VK_ACCESS_TOKEN env var)", CONFIG_PATH);
            }
            if vk.peer_ids.is_empty() {
                anyhow::bail!("At least one VK peer id is required (set via {} or VK_PEER_IDS env var)", CONFIG_PATH);
            }
        }

        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, Duration::from_secs(self.retry_delay_seconds))
    }

    pub fn create_default() -> Result<()> {
        // Ensure data directory exists
        std::fs::create_dir_all("data")?;

        let default_config = Config {
            telegram: Some(TelegramConfig {
                bot_token: "YOUR_TELEGRAM_BOT_TOKEN".to_string(),
                chat_ids: vec![ChatId::Numeric(0)],
                api_base: None,
            }),
            vk: Some(VkConfig {
                access_token: "YOUR_VK_ACCESS_TOKEN".to_string(),
                peer_ids: vec![ChatId::Numeric(0)],
                api_version: default_api_version(),
                api_url: None,
            }),
            ..Config::default()
        };

        let config_str = serde_yaml::to_string(&default_config)?;
        fs::write(CONFIG_PATH, config_str)?;
        Ok(())
    }
}

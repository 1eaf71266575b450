//! IdeaBot configuration loader.
//!
//! Values come from an optional TOML file, then environment variables
//! (after `.env` is loaded by `main`), then validation.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct IdeaBotConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub slack: SlackConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub github: GithubConfig,
    #[serde(default)]
    pub conversation: ConversationConfig,
    #[serde(default)]
    pub locale: Locale,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default = "default_http_timeout_seconds")]
    pub http_timeout_seconds: u64,
    /// Upper bound on reading a webhook body before falling back to whatever arrived.
    #[serde(default = "default_body_read_timeout_ms")]
    pub body_read_timeout_ms: u64,
    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: usize,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_http_timeout_seconds() -> u64 {
    120
}

fn default_body_read_timeout_ms() -> u64 {
    2000
}

fn default_max_concurrent_requests() -> usize {
    64
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            http_timeout_seconds: default_http_timeout_seconds(),
            body_read_timeout_ms: default_body_read_timeout_ms(),
            max_concurrent_requests: default_max_concurrent_requests(),
        }
    }
}

impl ServerConfig {
    pub fn body_read_timeout(&self) -> Duration {
        Duration::from_millis(self.body_read_timeout_ms)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SlackConfig {
    /// Optional at startup: without it the webhook answers 500.
    #[serde(default)]
    pub signing_secret: Option<String>,
    #[serde(default)]
    pub bot_token: String,
    #[serde(default)]
    pub api_base: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default)]
    pub api_base: Option<String>,
}

fn default_model() -> String {
    ib_llm::DEFAULT_MODEL.to_string()
}

fn default_max_tokens() -> u32 {
    ib_llm::DEFAULT_MAX_TOKENS
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            api_base: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GithubConfig {
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub repo: String,
    #[serde(default)]
    pub api_base: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConversationConfig {
    #[serde(default = "default_ttl_minutes")]
    pub ttl_minutes: u64,
    #[serde(default = "default_max_messages")]
    pub max_messages: usize,
    #[serde(default = "default_sweep_interval_seconds")]
    pub sweep_interval_seconds: u64,
}

fn default_ttl_minutes() -> u64 {
    30
}

fn default_max_messages() -> usize {
    20
}

fn default_sweep_interval_seconds() -> u64 {
    300
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            ttl_minutes: default_ttl_minutes(),
            max_messages: default_max_messages(),
            sweep_interval_seconds: default_sweep_interval_seconds(),
        }
    }
}

impl ConversationConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_minutes * 60)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    Ja,
    En,
}

impl std::str::FromStr for Locale {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ja" => Ok(Self::Ja),
            "en" => Ok(Self::En),
            other => Err(anyhow::anyhow!(
                "unsupported locale {other:?}; expected one of: ja, en"
            )),
        }
    }
}

impl IdeaBotConfig {
    /// Loads config from `path`, or from the default location when `None`.
    ///
    /// An explicit path must exist; a missing default file means "env only".
    pub async fn load(path: Option<PathBuf>) -> anyhow::Result<Self> {
        let explicit = path.is_some();
        let path = path.unwrap_or_else(default_config_path);

        let mut cfg = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => toml::from_str::<IdeaBotConfig>(&contents)
                .map_err(|e| anyhow::anyhow!("parse config {}: {e}", path.display()))?,
            Err(e) if !explicit && e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file; using defaults and env");
                IdeaBotConfig::default()
            }
            Err(e) => return Err(anyhow::anyhow!("read config {}: {e}", path.display())),
        };

        cfg.apply_env_overrides()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn apply_env_overrides(&mut self) -> anyhow::Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<()> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = var("SLACK_SIGNING_SECRET") {
            self.slack.signing_secret = Some(v);
        }
        if let Some(v) = var("SLACK_BOT_TOKEN") {
            self.slack.bot_token = v;
        }
        if let Some(v) = var("ANTHROPIC_API_KEY") {
            self.llm.api_key = v;
        }
        if let Some(v) = var("IDEABOT_MODEL") {
            self.llm.model = v;
        }
        if let Some(v) = var("GITHUB_TOKEN") {
            self.github.token = v;
        }
        if let Some(v) = var("GITHUB_OWNER") {
            self.github.owner = v;
        }
        if let Some(v) = var("GITHUB_REPO") {
            self.github.repo = v;
        }
        if let Some(v) = var("IDEABOT_BIND_ADDR") {
            self.server.bind_addr = v;
        }
        if let Some(v) = var("IDEABOT_LOCALE") {
            self.locale = v.parse()?;
        }
        Ok(())
    }

    fn validate(&self) -> anyhow::Result<()> {
        let required = [
            ("slack.bot_token (SLACK_BOT_TOKEN)", &self.slack.bot_token),
            ("llm.api_key (ANTHROPIC_API_KEY)", &self.llm.api_key),
            ("llm.model (IDEABOT_MODEL)", &self.llm.model),
            ("github.token (GITHUB_TOKEN)", &self.github.token),
            ("github.owner (GITHUB_OWNER)", &self.github.owner),
            ("github.repo (GITHUB_REPO)", &self.github.repo),
            ("server.bind_addr (IDEABOT_BIND_ADDR)", &self.server.bind_addr),
        ];
        let missing = required
            .iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(name, _)| *name)
            .collect::<Vec<_>>();
        if !missing.is_empty() {
            return Err(anyhow::anyhow!(
                "missing required config: {}",
                missing.join(", ")
            ));
        }

        if self.llm.max_tokens == 0 {
            return Err(anyhow::anyhow!("llm.max_tokens must be > 0"));
        }
        if self.conversation.max_messages == 0 {
            return Err(anyhow::anyhow!("conversation.max_messages must be > 0"));
        }
        if self.conversation.ttl_minutes == 0 {
            return Err(anyhow::anyhow!("conversation.ttl_minutes must be > 0"));
        }
        if self.conversation.sweep_interval_seconds == 0 {
            return Err(anyhow::anyhow!(
                "conversation.sweep_interval_seconds must be > 0"
            ));
        }
        if self.server.http_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("server.http_timeout_seconds must be > 0"));
        }
        if self.server.body_read_timeout_ms == 0 {
            return Err(anyhow::anyhow!("server.body_read_timeout_ms must be > 0"));
        }
        if self.server.max_concurrent_requests == 0 {
            return Err(anyhow::anyhow!(
                "server.max_concurrent_requests must be > 0"
            ));
        }
        Ok(())
    }

    pub fn signing_secret(&self) -> Option<&str> {
        self.slack
            .signing_secret
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

pub fn default_config_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    Path::new(&home).join(".ideabot").join("config.toml")
}

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use tracing::warn;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub slack: BackendConfig,
    pub telegram: BackendConfig,
    pub throttle: ThrottleConfig,
    pub reporting: ReportingConfig,
    pub integrations: IntegrationsConfig,
}

/// Credentials and command prefix for one backend kind.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct BackendConfig {
    /// Comma separated list; one adapter is launched per entry.
    #[serde(default)]
    pub credentials: String,
    pub prefix: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ThrottleConfig {
    /// Identical text in the same channel is dropped for this long.
    pub duplicate_window_secs: u64,
    /// Max commands per channel within `channel_window_secs` (0 disables).
    pub channel_burst: u32,
    pub channel_window_secs: u64,
    /// Cron expression for purging expired throttle records.
    pub purge_cron: String,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            duplicate_window_secs: 3,
            channel_burst: 5,
            channel_window_secs: 10,
            purge_cron: "0 */5 * * * *".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct ReportingConfig {
    /// Fault reports are POSTed here. Setting it also turns on fault isolation.
    pub endpoint: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct IntegrationsConfig {
    pub wiki_api_url: String,
    pub wiki_page_url: String,
    pub tinyurl_api_url: String,
}

impl Default for IntegrationsConfig {
    fn default() -> Self {
        Self {
            wiki_api_url: "https://en.wikipedia.org/w/api.php".to_string(),
            wiki_page_url: "https://en.wikipedia.org/wiki/".to_string(),
            tinyurl_api_url: "https://tinyurl.com/api-create.php".to_string(),
        }
    }
}

impl Config {
    /// Slack command prefix ([slack] prefix, default "!").
    pub fn slack_prefix(&self) -> &str {
        self.slack.prefix.as_deref().unwrap_or("!")
    }

    /// Telegram command prefix ([telegram] prefix, default "/").
    pub fn telegram_prefix(&self) -> &str {
        self.telegram.prefix.as_deref().unwrap_or("/")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            Self::parse(&content)?
        } else {
            warn!(
                "Config file {} not found, using defaults and environment",
                path.display()
            );
            Config::default()
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse config file")
    }

    /// Environment values win over the file. Empty values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(csv) = lookup("MULTIBOT_SLACK") {
            self.slack.credentials = csv;
        }
        if let Some(csv) = lookup("MULTIBOT_TELEGRAM") {
            self.telegram.credentials = csv;
        }
        if let Some(endpoint) = lookup("MULTIBOT_REPORT_ENDPOINT") {
            self.reporting.endpoint = Some(endpoint);
        }
    }

    pub fn validate(&self) -> Result<()> {
        for (name, prefix) in [
            ("slack", self.slack_prefix()),
            ("telegram", self.telegram_prefix()),
        ] {
            anyhow::ensure!(!prefix.is_empty(), "[{}] prefix must not be empty", name);
            anyhow::ensure!(
                !prefix.chars().any(char::is_whitespace),
                "[{}] prefix must not contain whitespace: {:?}",
                name,
                prefix
            );
        }
        Ok(())
    }
}

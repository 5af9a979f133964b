use anyhow::{Context, Result};
use async_trait::async_trait;

use super::{CommandContext, CommandHandler};
use crate::config::IntegrationsConfig;

/// Shortens a URL through the TinyURL API.
pub struct TinyUrlCommand {
    client: reqwest::Client,
    api_url: String,
}

impl TinyUrlCommand {
    pub fn new(integrations: &IntegrationsConfig) -> Self {
        Self {
            client: crate::http::client(crate::http::REQUEST_TIMEOUT),
            api_url: integrations.tinyurl_api_url.clone(),
        }
    }

    async fn shorten(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(&self.api_url)
            .query(&[("url", url)])
            .send()
            .await
            .context("Failed to send request to TinyURL")?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("TinyURL API error ({})", status);
        }

        let short = response
            .text()
            .await
            .context("Failed to read TinyURL response")?;
        Ok(short.trim().to_string())
    }
}

/// Slack wraps links as `<https://x|label>`; unwrap to the bare URL.
fn strip_link_markup(arg: &str) -> &str {
    let inner = arg
        .strip_prefix('<')
        .and_then(|s| s.strip_suffix('>'))
        .unwrap_or(arg);
    inner.split('|').next().unwrap_or(inner)
}

#[async_trait]
impl CommandHandler for TinyUrlCommand {
    async fn handle(&self, ctx: &CommandContext) -> Result<()> {
        let url = strip_link_markup(ctx.args());
        if url.is_empty() {
            ctx.reply(format!("Usage: {}tinyurl url", ctx.prefix)).await;
            return Ok(());
        }

        let short = self.shorten(url).await?;
        ctx.reply(format!("Short URL: {}", short)).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::context;
    use crate::platform::testing::RecordingAdapter;
    use std::sync::Arc;

    #[test]
    fn test_strip_link_markup() {
        assert_eq!(strip_link_markup("<https://example.com>"), "https://example.com");
        assert_eq!(
            strip_link_markup("<https://example.com|example.com>"),
            "https://example.com"
        );
        assert_eq!(strip_link_markup("https://example.com"), "https://example.com");
    }

    #[tokio::test]
    async fn test_usage_without_url() {
        let adapter = Arc::new(RecordingAdapter::new("!"));
        TinyUrlCommand::new(&IntegrationsConfig::default())
            .handle(&context(adapter.clone(), "!tinyurl"))
            .await
            .unwrap();
        assert_eq!(adapter.texts().await, vec!["Usage: !tinyurl url".to_string()]);
    }
}

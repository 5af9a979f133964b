use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use super::{CommandContext, CommandHandler};
use crate::config::IntegrationsConfig;
use crate::platform::RichMessage;

const ATTACHMENT_COLOR: &str = "#36a64f";
const THUMBNAIL_SIZE: &str = "400";

/// Wikipedia page summary with the title image as a rich attachment.
pub struct WikiCommand {
    client: reqwest::Client,
    api_url: String,
    page_url: String,
}

impl WikiCommand {
    pub fn new(integrations: &IntegrationsConfig) -> Self {
        Self {
            client: crate::http::client(crate::http::REQUEST_TIMEOUT),
            api_url: integrations.wiki_api_url.clone(),
            page_url: integrations.wiki_page_url.clone(),
        }
    }

    async fn query(&self, params: &[(&str, &str)]) -> Result<Value> {
        debug!("Querying wiki API: {:?}", params);
        let response = self
            .client
            .get(&self.api_url)
            .query(&[("action", "query"), ("format", "json")])
            .query(params)
            .send()
            .await
            .context("Failed to send request to wiki API")?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("Wiki API error ({})", status);
        }

        response
            .json()
            .await
            .context("Failed to parse wiki API response")
    }

    async fn page_source(&self, title: &str) -> Result<Option<String>> {
        let body = self
            .query(&[("prop", "revisions"), ("rvprop", "content"), ("titles", title)])
            .await?;
        Ok(latest_revision(&body))
    }

    async fn title_image(&self, title: &str) -> Result<Option<String>> {
        let body = self
            .query(&[
                ("prop", "pageimages"),
                ("pithumbsize", THUMBNAIL_SIZE),
                ("titles", title),
            ])
            .await?;
        Ok(thumbnail(&body))
    }

    fn page_link(&self, title: &str) -> String {
        format!(
            "{}{}",
            self.page_url,
            urlencoding::encode(&title.replace(' ', "_"))
        )
    }
}

#[async_trait]
impl CommandHandler for WikiCommand {
    async fn handle(&self, ctx: &CommandContext) -> Result<()> {
        let title = ctx.args();
        if title.is_empty() {
            ctx.reply(format!("Usage: {}wiki query", ctx.prefix)).await;
            return Ok(());
        }

        let summary = self
            .page_source(title)
            .await?
            .map(|source| excerpt(&source))
            .unwrap_or_default();
        if summary.is_empty() {
            ctx.reply("The page you've requested could not be found.")
                .await;
            return Ok(());
        }

        let image_url = match self.title_image(title).await {
            Ok(url) => url,
            Err(e) => {
                warn!("Failed to fetch wiki title image for {}: {:#}", title, e);
                None
            }
        };

        let attachment = RichMessage {
            title: Some(title.to_string()),
            title_link: Some(self.page_link(title)),
            text: Some(summary),
            color: Some(ATTACHMENT_COLOR.to_string()),
            image_url,
        };
        ctx.reply_rich("", attachment).await;
        Ok(())
    }
}

/// Pick the wikitext of the latest revision out of a `prop=revisions` reply.
fn latest_revision(body: &Value) -> Option<String> {
    body["query"]["pages"]
        .as_object()?
        .values()
        .find_map(|page| page["revisions"][0]["*"].as_str())
        .map(str::to_string)
}

fn thumbnail(body: &Value) -> Option<String> {
    body["query"]["pages"]
        .as_object()?
        .values()
        .find_map(|page| page["thumbnail"]["source"].as_str())
        .map(str::to_string)
}

/// Lines of template/table/list markup, e.g. `{{Infobox` or `| name = x`.
fn is_markup(line: &str) -> bool {
    let mut chars = line.chars();
    match chars.next() {
        Some(c) if c.is_whitespace() || "[{|*}+".contains(c) => chars.next().is_some(),
        _ => false,
    }
}

/// Leading prose of a page: stops at the first section heading or after
/// the second blank line, skipping markup lines.
fn excerpt(source: &str) -> String {
    let mut result = String::new();
    let mut blank_lines = 0;
    for line in source.lines() {
        if is_markup(line) {
            continue;
        }
        if line.starts_with("==") {
            break;
        }
        if line.is_empty() {
            blank_lines += 1;
            if blank_lines > 1 {
                break;
            }
            continue;
        }
        result.push_str(line);
        result.push('\n');
    }
    result
}

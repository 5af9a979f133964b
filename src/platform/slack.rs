//! Slack adapter.
//!
//! Receives over Socket Mode (WebSocket) and sends through the Web API.
//! A credential is `app_token:bot_token`: the `xapp-` token opens the socket,
//! the `xoxb-` token posts messages.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use reqwest::Client;
use serde_json::{json, Value};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, info, warn};

use super::{Adapter, BackendKind, InboundMessage, OutgoingMessage};
use crate::bot::{BotCore, Dispatch};

const SLACK_API_BASE: &str = "https://slack.com/api";
const RECONNECT_DELAY: Duration = Duration::from_secs(1);
const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(60);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Web API error codes that retrying will not fix.
const FATAL_API_ERRORS: &[&str] = &[
    "invalid_auth",
    "not_authed",
    "account_inactive",
    "token_revoked",
    "token_expired",
    "not_allowed_token_type",
];

/// `"ok": false` from a Web API method.
#[derive(Debug)]
struct SlackApiError {
    method: &'static str,
    code: String,
}

impl SlackApiError {
    fn from_body(method: &'static str, body: &Value) -> Self {
        Self {
            method,
            code: body["error"].as_str().unwrap_or("unknown").to_string(),
        }
    }
}

impl fmt::Display for SlackApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Slack {} failed: {}", self.method, self.code)
    }
}

impl std::error::Error for SlackApiError {}

/// True when the error means the credential itself is unusable.
fn is_fatal(err: &anyhow::Error) -> bool {
    err.downcast_ref::<SlackApiError>()
        .is_some_and(|e| FATAL_API_ERRORS.contains(&e.code.as_str()))
}

fn next_backoff(delay: Duration) -> Duration {
    (delay * 2).min(MAX_RECONNECT_DELAY)
}

#[derive(Debug, Clone, PartialEq)]
pub struct SlackCredential {
    pub app_token: String,
    pub bot_token: String,
}

impl SlackCredential {
    pub fn parse(credential: &str) -> Result<Self> {
        let (app_token, bot_token) = credential
            .split_once(':')
            .context("Slack credential must be app_token:bot_token")?;
        let (app_token, bot_token) = (app_token.trim(), bot_token.trim());
        anyhow::ensure!(
            !app_token.is_empty() && !bot_token.is_empty(),
            "Slack credential has an empty token"
        );
        Ok(Self {
            app_token: app_token.to_string(),
            bot_token: bot_token.to_string(),
        })
    }
}

/// Why a socket session ended without an error.
#[derive(Debug, PartialEq)]
enum SessionEnd {
    /// Slack asked us to reconnect (routine connection refresh)
    Refresh,
    /// The server closed the socket
    Closed,
}

/// Outbound side of one Slack workspace connection.
pub struct SlackAdapter {
    client: Client,
    bot_token: String,
    prefix: String,
}

impl SlackAdapter {
    pub fn new(bot_token: String, prefix: String) -> Self {
        Self {
            client: crate::http::client(crate::http::REQUEST_TIMEOUT),
            bot_token,
            prefix,
        }
    }

    async fn send(&self, message: &OutgoingMessage) -> Result<()> {
        let body = post_message_body(message);

        let response = self
            .client
            .post(format!("{}/chat.postMessage", SLACK_API_BASE))
            .header("Authorization", format!("Bearer {}", self.bot_token))
            .json(&body)
            .send()
            .await
            .context("Failed to send Slack message")?;

        let result: Value = response
            .json()
            .await
            .context("Failed to parse Slack response")?;
        if result["ok"].as_bool() != Some(true) {
            return Err(SlackApiError::from_body("chat.postMessage", &result).into());
        }
        Ok(())
    }
}

#[async_trait]
impl Adapter for SlackAdapter {
    fn kind(&self) -> BackendKind {
        BackendKind::Slack
    }

    fn command_prefix(&self) -> &str {
        &self.prefix
    }

    async fn post_message(&self, message: OutgoingMessage) {
        if let Err(e) = self.send(&message).await {
            warn!("Slack send to {} failed: {:#}", message.channel, e);
        }
    }
}

fn post_message_body(message: &OutgoingMessage) -> Value {
    let mut body = json!({
        "channel": message.channel,
        "text": message.text,
    });
    if let Some(attachment) = &message.attachment {
        body["attachments"] = json!([attachment]);
    }
    body
}

/// Extract a user text message from a Socket Mode envelope.
/// Bot messages and subtypes (edits, joins, ...) are skipped.
fn inbound_from_envelope(payload: &Value) -> Option<InboundMessage> {
    if payload["type"].as_str() != Some("events_api") {
        return None;
    }

    let event = &payload["payload"]["event"];
    if event["type"].as_str() != Some("message")
        || event["bot_id"].is_string()
        || event["subtype"].is_string()
    {
        return None;
    }

    let text = event["text"].as_str().filter(|t| !t.is_empty())?;
    let channel = event["channel"].as_str()?;
    Some(InboundMessage::new(channel, unescape_text(text)))
}

/// Slack sends `&`, `<` and `>` as HTML entities in message text.
fn unescape_text(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

async fn open_connection(client: &Client, app_token: &str) -> Result<String> {
    let resp = client
        .post(format!("{}/apps.connections.open", SLACK_API_BASE))
        .header("Authorization", format!("Bearer {}", app_token))
        .header("Content-Type", "application/x-www-form-urlencoded")
        .send()
        .await
        .context("Failed to open Slack Socket Mode connection")?;

    let body: Value = resp
        .json()
        .await
        .context("Failed to parse Slack connection response")?;
    if body["ok"].as_bool() != Some(true) {
        return Err(SlackApiError::from_body("apps.connections.open", &body).into());
    }

    body["url"]
        .as_str()
        .map(|s| s.to_string())
        .context("Missing 'url' in Slack connection response")
}

/// One WebSocket session. Messages are handled one at a time, in order.
async fn run_session(
    core: &Arc<BotCore>,
    adapter: &Arc<SlackAdapter>,
    wss_url: &str,
) -> Result<SessionEnd> {
    let (ws_stream, _) =
        tokio::time::timeout(CONNECT_TIMEOUT, tokio_tungstenite::connect_async(wss_url))
            .await
            .context("Timed out connecting to Slack Socket Mode")?
            .context("Failed to connect to Slack Socket Mode")?;
    let (mut ws_write, mut ws_read) = ws_stream.split();

    while let Some(msg) = ws_read.next().await {
        let msg = msg.context("Slack WebSocket error")?;
        let payload: Value = match msg {
            WsMessage::Text(text) => match serde_json::from_str(text.as_str()) {
                Ok(v) => v,
                Err(e) => {
                    debug!("Skipping non-JSON Slack frame: {}", e);
                    continue;
                }
            },
            WsMessage::Close(_) => return Ok(SessionEnd::Closed),
            _ => continue,
        };

        // Ack before handling; Slack retries envelopes not acked within 3s
        if let Some(envelope_id) = payload["envelope_id"].as_str() {
            let ack = json!({ "envelope_id": envelope_id });
            ws_write
                .send(WsMessage::Text(ack.to_string().into()))
                .await
                .context("Failed to ack Slack envelope")?;
        }

        if payload["type"].as_str() == Some("disconnect") {
            return Ok(SessionEnd::Refresh);
        }

        if let Some(inbound) = inbound_from_envelope(&payload) {
            let channel = inbound.channel.clone();
            let outcome = core.handle_inbound(adapter.clone(), inbound).await;
            if let Dispatch::Handled { command } = outcome {
                debug!("Slack {} handled by {}", channel, command);
            }
        }
    }

    Ok(SessionEnd::Closed)
}

async fn connect_and_run(
    client: &Client,
    credential: &SlackCredential,
    core: &Arc<BotCore>,
    adapter: &Arc<SlackAdapter>,
) -> Result<SessionEnd> {
    let wss_url = open_connection(client, &credential.app_token).await?;
    run_session(core, adapter, &wss_url).await
}

/// Connect one Slack workspace and dispatch messages.
///
/// Dropped sockets and failed reconnects are retried with exponential
/// backoff. Only a rejected credential ends the adapter.
pub async fn run(core: Arc<BotCore>, credential: String, prefix: String) -> Result<()> {
    let credential = SlackCredential::parse(&credential)?;
    let adapter = Arc::new(SlackAdapter::new(credential.bot_token.clone(), prefix));
    let client = crate::http::client(crate::http::REQUEST_TIMEOUT);

    info!("Starting Slack platform...");
    let mut backoff = RECONNECT_DELAY;
    loop {
        let wait = match connect_and_run(&client, &credential, &core, &adapter).await {
            Ok(end) => {
                match end {
                    SessionEnd::Refresh => info!("Slack requested reconnect"),
                    SessionEnd::Closed => warn!("Slack socket closed, reconnecting"),
                }
                backoff = RECONNECT_DELAY;
                RECONNECT_DELAY
            }
            Err(e) if is_fatal(&e) => return Err(e),
            Err(e) => {
                let wait = backoff;
                backoff = next_backoff(backoff);
                warn!("Slack session failed: {:#}; retrying in {:?}", e, wait);
                wait
            }
        };
        tokio::time::sleep(wait).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::RichMessage;

    #[test]
    fn test_parse_credential() {
        let cred = SlackCredential::parse("xapp-1-abc:xoxb-2-def").unwrap();
        assert_eq!(cred.app_token, "xapp-1-abc");
        assert_eq!(cred.bot_token, "xoxb-2-def");

        assert!(SlackCredential::parse("xoxb-only").is_err());
        assert!(SlackCredential::parse(":xoxb-2").is_err());
    }

    #[test]
    fn test_inbound_from_envelope() {
        let payload = json!({
            "type": "events_api",
            "envelope_id": "e1",
            "payload": { "event": {
                "type": "message", "channel": "C123", "user": "U1", "text": "!help", "ts": "1.2"
            }}
        });
        assert_eq!(
            inbound_from_envelope(&payload),
            Some(InboundMessage::new("C123", "!help"))
        );
    }

    #[test]
    fn test_envelope_filters() {
        let bot = json!({
            "type": "events_api",
            "payload": { "event": { "type": "message", "channel": "C1", "text": "!help", "bot_id": "B1" } }
        });
        let edit = json!({
            "type": "events_api",
            "payload": { "event": { "type": "message", "channel": "C1", "text": "!help", "subtype": "message_changed" } }
        });
        let hello = json!({ "type": "hello" });
        let empty = json!({
            "type": "events_api",
            "payload": { "event": { "type": "message", "channel": "C1", "text": "" } }
        });

        for payload in [bot, edit, hello, empty] {
            assert!(inbound_from_envelope(&payload).is_none());
        }
    }

    #[test]
    fn test_inbound_text_is_unescaped() {
        let payload = json!({
            "type": "events_api",
            "payload": { "event": {
                "type": "message", "channel": "C1", "text": "!b64e a&amp;b &lt;tag&gt; &amp;lt;"
            }}
        });
        let inbound = inbound_from_envelope(&payload).unwrap();
        assert_eq!(inbound.text, "!b64e a&b <tag> &lt;");
    }

    #[test]
    fn test_only_rejected_credentials_are_fatal() {
        let auth = anyhow::Error::from(SlackApiError {
            method: "apps.connections.open",
            code: "invalid_auth".to_string(),
        })
        .context("reconnect");
        assert!(is_fatal(&auth));

        let limited = anyhow::Error::from(SlackApiError {
            method: "apps.connections.open",
            code: "ratelimited".to_string(),
        });
        assert!(!is_fatal(&limited));

        let reset = anyhow::anyhow!("Connection reset without closing handshake")
            .context("Slack WebSocket error");
        assert!(!is_fatal(&reset));
    }

    #[test]
    fn test_backoff_doubles_up_to_cap() {
        assert_eq!(next_backoff(RECONNECT_DELAY), Duration::from_secs(2));
        assert_eq!(next_backoff(Duration::from_secs(40)), MAX_RECONNECT_DELAY);
        assert_eq!(next_backoff(MAX_RECONNECT_DELAY), MAX_RECONNECT_DELAY);
    }

    #[test]
    fn test_post_body_with_attachment() {
        let message = OutgoingMessage::rich(
            "C1",
            "",
            RichMessage {
                title: Some("Rust".to_string()),
                color: Some("#36a64f".to_string()),
                ..Default::default()
            },
        );
        let body = post_message_body(&message);
        assert_eq!(body["channel"], "C1");
        assert_eq!(body["attachments"][0]["title"], "Rust");
        assert_eq!(body["attachments"][0]["color"], "#36a64f");

        let plain = post_message_body(&OutgoingMessage::text("C1", "hi"));
        assert!(plain.get("attachments").is_none());
    }
}

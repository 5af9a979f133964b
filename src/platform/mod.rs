pub mod slack;
pub mod telegram;

use async_trait::async_trait;
use serde::Serialize;

/// Supported chat networks. Selects the adapter and its prefix convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    Slack,
    Telegram,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Slack => write!(f, "slack"),
            BackendKind::Telegram => write!(f, "telegram"),
        }
    }
}

/// A text event received from any backend, already normalized
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    /// Backend-specific channel/chat identifier
    pub channel: String,
    /// The raw message text, command prefix included
    pub text: String,
}

impl InboundMessage {
    pub fn new(channel: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            text: text.into(),
        }
    }
}

/// Structured rich payload. Field names follow Slack's attachment format;
/// backends without attachments degrade it to plain text.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RichMessage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title_link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

impl RichMessage {
    /// Render as plain text for backends that cannot show attachments.
    pub fn to_plain_text(&self) -> String {
        let mut lines = Vec::new();
        if let Some(title) = &self.title {
            lines.push(title.clone());
        }
        if let Some(link) = &self.title_link {
            lines.push(link.clone());
        }
        if let Some(text) = &self.text {
            lines.push(text.clone());
        }
        lines.join("\n")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingMessage {
    pub channel: String,
    pub text: String,
    pub attachment: Option<RichMessage>,
}

impl OutgoingMessage {
    pub fn text(channel: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            text: text.into(),
            attachment: None,
        }
    }

    pub fn rich(channel: impl Into<String>, text: impl Into<String>, attachment: RichMessage) -> Self {
        Self {
            channel: channel.into(),
            text: text.into(),
            attachment: Some(attachment),
        }
    }
}

/// The outbound half of a running backend connection.
///
/// Each adapter instance is bound to one credential. Its receive loop lives in
/// the backend module's `run` function, which hands every text event to
/// `BotCore::handle_inbound` together with the adapter itself.
#[async_trait]
pub trait Adapter: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Prefix that marks a message as a command on this connection.
    fn command_prefix(&self) -> &str;

    /// Best-effort send. Failures are logged by the adapter and never returned.
    async fn post_message(&self, message: OutgoingMessage);
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_skips_missing_fields() {
        let rich = RichMessage {
            title: Some("Rust".to_string()),
            text: Some("A language.".to_string()),
            color: Some("#36a64f".to_string()),
            ..Default::default()
        };
        assert_eq!(rich.to_plain_text(), "Rust\nA language.");
    }

    #[test]
    fn test_rich_serializes_as_slack_attachment() {
        let rich = RichMessage {
            title: Some("t".to_string()),
            title_link: Some("https://example.com".to_string()),
            ..Default::default()
        };
        let value = serde_json::to_value(&rich).unwrap();
        assert_eq!(value["title_link"], "https://example.com");
        assert!(value.get("image_url").is_none());
    }
}

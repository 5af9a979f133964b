pub mod crypto;
pub mod help;
pub mod tinyurl;
pub mod wiki;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

use crate::config::IntegrationsConfig;
use crate::platform::{Adapter, OutgoingMessage, RichMessage};

/// Everything a handler needs to answer one command.
#[derive(Clone)]
pub struct CommandContext {
    /// Adapter the message came in on; replies go back through it
    pub adapter: Arc<dyn Adapter>,
    pub channel: String,
    /// Full message text, prefix included
    pub text: String,
    pub prefix: String,
    /// Registered command names, in registration order
    pub commands: Arc<[String]>,
}

impl CommandContext {
    /// Leading token after the prefix (e.g. "wiki" for "!wiki rust").
    pub fn command(&self) -> &str {
        self.body().split(char::is_whitespace).next().unwrap_or("")
    }

    /// Everything after the leading token, trimmed.
    pub fn args(&self) -> &str {
        let body = self.body();
        match body.find(char::is_whitespace) {
            Some(pos) => body[pos..].trim(),
            None => "",
        }
    }

    fn body(&self) -> &str {
        self.text.strip_prefix(&self.prefix).unwrap_or(&self.text)
    }

    pub async fn reply(&self, text: impl Into<String>) {
        self.adapter
            .post_message(OutgoingMessage::text(&self.channel, text))
            .await;
    }

    pub async fn reply_rich(&self, text: impl Into<String>, attachment: RichMessage) {
        self.adapter
            .post_message(OutgoingMessage::rich(&self.channel, text, attachment))
            .await;
    }
}

/// One command's business logic.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn handle(&self, ctx: &CommandContext) -> Result<()>;
}

/// Ordered command-name → handler table, built once at startup.
///
/// Lookup takes the first whitespace-delimited token of the command text.
/// An exact name match wins; otherwise the longest registered name the token
/// starts with wins, so `!helpme` still reaches `help` and `sha512sum` picks
/// `sha512` over a shorter `sha` regardless of registration order.
#[derive(Clone, Default)]
pub struct CommandRegistry {
    entries: Vec<(String, Arc<dyn CommandHandler>)>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Register a handler. Re-registering a name replaces it in place.
    pub fn register(&mut self, name: &str, handler: Arc<dyn CommandHandler>) -> Result<()> {
        anyhow::ensure!(!name.is_empty(), "command name must not be empty");
        anyhow::ensure!(
            !name.chars().any(char::is_whitespace),
            "command name must not contain whitespace: {:?}",
            name
        );

        match self.entries.iter().position(|(n, _)| n == name) {
            Some(index) => self.entries[index].1 = handler,
            None => self.entries.push((name.to_string(), handler)),
        }
        Ok(())
    }

    /// Resolve prefix-stripped command text to a registered handler.
    pub fn lookup(&self, command: &str) -> Option<(&str, &Arc<dyn CommandHandler>)> {
        let token = command.split(char::is_whitespace).next().unwrap_or("");
        if token.is_empty() {
            return None;
        }

        if let Some((name, handler)) = self.entries.iter().find(|(n, _)| n == token) {
            return Some((name.as_str(), handler));
        }

        self.entries
            .iter()
            .filter(|(name, _)| token.starts_with(name.as_str()))
            .max_by_key(|(name, _)| name.len())
            .map(|(name, handler)| (name.as_str(), handler))
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|(name, _)| name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Build the registry of bundled commands.
pub fn builtin_registry(integrations: &IntegrationsConfig) -> Result<CommandRegistry> {
    let mut registry = CommandRegistry::new();

    let help: Arc<dyn CommandHandler> = Arc::new(help::HelpCommand);
    for name in ["help", "h", "?"] {
        registry.register(name, help.clone())?;
    }

    let crypto: Arc<dyn CommandHandler> = Arc::new(crypto::CryptoCommand);
    for name in crypto::COMMANDS {
        registry.register(name, crypto.clone())?;
    }

    registry.register("wiki", Arc::new(wiki::WikiCommand::new(integrations)))?;
    registry.register(
        "tinyurl",
        Arc::new(tinyurl::TinyUrlCommand::new(integrations)),
    )?;

    info!("Registered {} commands", registry.len());
    Ok(registry)
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::platform::testing::RecordingAdapter;

    fn registry(names: &[&'static str]) -> CommandRegistry {
        let mut registry = CommandRegistry::new();
        for name in names {
            registry.register(name, Arc::new(FixedReply(*name))).unwrap();
        }
        registry
    }

    #[test]
    fn test_exact_match() {
        let registry = registry(&["help", "wiki"]);
        assert_eq!(registry.lookup("wiki rust").map(|(n, _)| n), Some("wiki"));
        assert_eq!(registry.lookup("help").map(|(n, _)| n), Some("help"));
    }

    #[test]
    fn test_token_prefix_match() {
        let registry = registry(&["help"]);
        assert_eq!(registry.lookup("helpme now").map(|(n, _)| n), Some("help"));
        assert!(registry.lookup("hel").is_none());
    }

    #[test]
    fn test_overlapping_names_resolve_deterministically() {
        // "h" is a prefix of "help"; both orders must pick the same winner
        for names in [["h", "help"], ["help", "h"]] {
            let registry = registry(&names);
            assert_eq!(registry.lookup("help args").map(|(n, _)| n), Some("help"));
            assert_eq!(registry.lookup("h").map(|(n, _)| n), Some("h"));
            assert_eq!(registry.lookup("helpful").map(|(n, _)| n), Some("help"));
            assert_eq!(registry.lookup("hx").map(|(n, _)| n), Some("h"));
        }
    }

    #[test]
    fn test_no_match() {
        let registry = registry(&["help"]);
        assert!(registry.lookup("unknown").is_none());
        assert!(registry.lookup("").is_none());
        // Leading whitespace leaves an empty token
        assert!(registry.lookup(" help").is_none());
    }

    #[test]
    fn test_register_replaces_in_place() {
        let mut registry = registry(&["a", "b"]);
        registry.register("a", Arc::new(FixedReply("new"))).unwrap();
        assert_eq!(registry.names(), vec!["a", "b"]);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_register_rejects_bad_names() {
        let mut registry = CommandRegistry::new();
        assert!(registry.register("", Arc::new(FixedReply("x"))).is_err());
        assert!(registry.register("two words", Arc::new(FixedReply("x"))).is_err());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_builtin_registry() {
        let registry = builtin_registry(&IntegrationsConfig::default()).unwrap();
        for name in ["help", "h", "?", "b64e", "b64d", "md5", "sha1", "sha256", "sha512", "wiki", "tinyurl"] {
            assert!(registry.lookup(name).is_some(), "missing {}", name);
        }
        // "sha512" must not be shadowed by a shorter name
        assert_eq!(registry.lookup("sha512 x").map(|(n, _)| n), Some("sha512"));
        assert_eq!(registry.lookup("sha1 x").map(|(n, _)| n), Some("sha1"));
    }

    #[test]
    fn test_context_command_and_args() {
        let adapter = Arc::new(RecordingAdapter::new("!"));
        let ctx = context(adapter.clone(), "!wiki  Rust language ");
        assert_eq!(ctx.command(), "wiki");
        assert_eq!(ctx.args(), "Rust language");

        let ctx = context(adapter, "!help");
        assert_eq!(ctx.command(), "help");
        assert_eq!(ctx.args(), "");
    }

    #[tokio::test]
    async fn test_reply_goes_to_origin_channel() {
        let adapter = Arc::new(RecordingAdapter::new("!"));
        let ctx = context(adapter.clone(), "!help");
        ctx.reply("hi").await;

        let posted = adapter.posted.lock().await;
        assert_eq!(posted.len(), 1);
        assert_eq!(posted[0].channel, "C1");
        assert_eq!(posted[0].text, "hi");
    }
}

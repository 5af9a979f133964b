use anyhow::Result;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};

use super::{CommandContext, CommandHandler};

/// Names served by [`CryptoCommand`].
pub const COMMANDS: [&str; 6] = ["b64e", "b64d", "md5", "sha1", "sha256", "sha512"];

/// Encoding and digest helpers. The command name selects the operation.
pub struct CryptoCommand;

/// Apply the named operation to `input`. `None` for unknown operations.
pub fn transform(operation: &str, input: &str) -> Option<String> {
    let result = match operation {
        "b64e" => STANDARD.encode(input),
        "b64d" => match STANDARD.decode(input.trim()) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) => format!("Invalid base64 input: {}", e),
        },
        "md5" => hex::encode(Md5::digest(input.as_bytes())),
        "sha1" => hex::encode(Sha1::digest(input.as_bytes())),
        "sha256" => hex::encode(Sha256::digest(input.as_bytes())),
        "sha512" => hex::encode(Sha512::digest(input.as_bytes())),
        _ => return None,
    };
    Some(result)
}

#[async_trait]
impl CommandHandler for CryptoCommand {
    async fn handle(&self, ctx: &CommandContext) -> Result<()> {
        let command = ctx.command();
        // Prefix-matched names such as "sha512sum" resolve to the base operation
        let operation = COMMANDS
            .iter()
            .filter(|name| command.starts_with(*name))
            .max_by_key(|name| name.len())
            .copied()
            .unwrap_or(command);

        let input = ctx.args();
        if input.is_empty() {
            ctx.reply(format!("Usage: {}{} string", ctx.prefix, operation))
                .await;
            return Ok(());
        }

        match transform(operation, input) {
            Some(output) => ctx.reply(output).await,
            None => anyhow::bail!("crypto handler registered under unknown name {}", command),
        }
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
    fn test_transform() {
        assert_eq!(transform("b64e", "hello").as_deref(), Some("aGVsbG8="));
        assert_eq!(transform("b64d", "aGVsbG8=").as_deref(), Some("hello"));
        assert_eq!(
            transform("sha256", "abc").as_deref(),
            Some("ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad")
        );
        assert_eq!(
            transform("md5", "abc").as_deref(),
            Some("900150983cd24fb0d6963f7d28e17f72")
        );
        assert_eq!(
            transform("sha1", "abc").as_deref(),
            Some("a9993e364706816aba3e25717850c26c9cd0d89d")
        );
        assert_eq!(transform("sha512", "").map(|h| h.len()), Some(128));
        assert!(transform("md4", "abc").is_none());
    }

    #[test]
    fn test_invalid_base64_is_reported_to_user() {
        let out = transform("b64d", "***").unwrap();
        assert!(out.starts_with("Invalid base64 input"));
    }

    #[tokio::test]
    async fn test_handle_replies_with_digest() {
        let adapter = Arc::new(RecordingAdapter::new("!"));
        CryptoCommand
            .handle(&context(adapter.clone(), "!b64e hello"))
            .await
            .unwrap();
        assert_eq!(adapter.texts().await, vec!["aGVsbG8=".to_string()]);
    }

    #[tokio::test]
    async fn test_handle_without_args_shows_usage() {
        let adapter = Arc::new(RecordingAdapter::new("!"));
        CryptoCommand
            .handle(&context(adapter.clone(), "!sha256"))
            .await
            .unwrap();
        assert_eq!(adapter.texts().await, vec!["Usage: !sha256 string".to_string()]);
    }

    #[tokio::test]
    async fn test_handle_md5() {
        let adapter = Arc::new(RecordingAdapter::new("!"));
        CryptoCommand
            .handle(&context(adapter.clone(), "!md5 hello"))
            .await
            .unwrap();
        assert_eq!(
            adapter.texts().await,
            vec!["5d41402abc4b2a76b9719d911017c592".to_string()]
        );
    }
}

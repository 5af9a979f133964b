use anyhow::Result;
use async_trait::async_trait;

use super::{CommandContext, CommandHandler};

/// Lists every registered command with the caller's prefix.
pub struct HelpCommand;

#[async_trait]
impl CommandHandler for HelpCommand {
    async fn handle(&self, ctx: &CommandContext) -> Result<()> {
        let listed: Vec<String> = ctx
            .commands
            .iter()
            .map(|name| format!("{}{}", ctx.prefix, name))
            .collect();
        ctx.reply(format!("Available commands: {}", listed.join(", ")))
            .await;
        Ok(())
    }
}

use std::sync::Arc;

use tracing::{debug, info};

use crate::commands::{CommandContext, CommandRegistry};
use crate::isolation::Isolation;
use crate::platform::{Adapter, InboundMessage, OutgoingMessage};
use crate::throttle::RateLimiter;

/// What `handle_inbound` did with a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// Not a command (no prefix)
    Ignored,
    /// Dropped by the rate limiter
    Throttled,
    /// Passed to the named handler, whether or not it succeeded
    Handled { command: String },
    /// No handler matched; the unknown-command reply was posted
    Unknown,
}

/// The assembled runtime shared by every adapter task.
///
/// Built once in `main` and passed around as `Arc<BotCore>`. The registry is
/// read-only from here on; the rate limiter's cache is the only mutable state.
pub struct BotCore {
    registry: CommandRegistry,
    commands: Arc<[String]>,
    limiter: RateLimiter,
    isolation: Isolation,
}

impl BotCore {
    pub fn new(registry: CommandRegistry, limiter: RateLimiter, isolation: Isolation) -> Self {
        let commands = Arc::from(registry.names());
        Self {
            registry,
            commands,
            limiter,
            isolation,
        }
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Process one normalized message from `adapter`.
    pub async fn handle_inbound(&self, adapter: Arc<dyn Adapter>, msg: InboundMessage) -> Dispatch {
        let prefix = adapter.command_prefix().to_string();
        let Some(command) = msg.text.strip_prefix(prefix.as_str()) else {
            return Dispatch::Ignored;
        };

        if !self.limiter.allow(&msg.channel, &msg.text).await {
            return Dispatch::Throttled;
        }

        info!("PROCESS -> `{}` ({} {})", command, adapter.kind(), msg.channel);

        let Some((name, handler)) = self.registry.lookup(command) else {
            let reply = format!(
                "Could not process your message: {}{}. Command unknown. Send {}help for list of valid commands.",
                prefix, command, prefix
            );
            adapter
                .post_message(OutgoingMessage::text(&msg.channel, reply))
                .await;
            return Dispatch::Unknown;
        };

        let name = name.to_string();
        let ctx = CommandContext {
            adapter,
            channel: msg.channel,
            text: msg.text,
            prefix,
            commands: self.commands.clone(),
        };

        let label = format!("command {}", name);
        if let Some(fault) = self.isolation.run(&label, handler.handle(&ctx)).await {
            debug!("Command {} ended with fault {}", name, fault.id);
        }
        Dispatch::Handled { command: name }
    }
}

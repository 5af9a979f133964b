mod bot;
mod commands;
mod config;
mod http;
mod isolation;
mod lifecycle;
mod platform;
mod report;
mod scheduler;
mod throttle;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::bot::BotCore;
use crate::config::Config;
use crate::isolation::Isolation;
use crate::platform::BackendKind;
use crate::scheduler::Scheduler;
use crate::throttle::RateLimiter;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,multibot=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Slack's socket runs over rustls; pick the provider explicitly
    if let Err(e) = rustls::crypto::ring::default_provider().install_default() {
        warn!("Failed to install default crypto provider: {:?}", e);
    }

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    info!("Loading configuration from: {}", config_path.display());
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    let isolation = Isolation::from_endpoint(config.reporting.endpoint.as_deref());
    info!("Configuration loaded successfully");
    info!("  Slack prefix: {}", config.slack_prefix());
    info!("  Telegram prefix: {}", config.telegram_prefix());
    info!(
        "  Fault reporting: {}",
        if isolation.is_enabled() { "enabled" } else { "disabled" }
    );

    let registry = commands::builtin_registry(&config.integrations)?;
    let limiter = RateLimiter::new(&config.throttle);
    let core = Arc::new(BotCore::new(registry, limiter, isolation.clone()));

    let scheduler = Scheduler::new(isolation.clone()).await?;
    scheduler::tasks::register_builtin_tasks(&scheduler, core.clone(), &config.throttle.purge_cron)
        .await?;
    scheduler.start().await?;

    let mut launched = 0;
    launched += lifecycle::launch_csv(
        &isolation,
        BackendKind::Slack,
        &config.slack.credentials,
        config.slack_prefix(),
        {
            let core = core.clone();
            move |credential, prefix| platform::slack::run(core.clone(), credential, prefix)
        },
    );
    launched += lifecycle::launch_csv(
        &isolation,
        BackendKind::Telegram,
        &config.telegram.credentials,
        config.telegram_prefix(),
        {
            let core = core.clone();
            move |credential, prefix| platform::telegram::run(core.clone(), credential, prefix)
        },
    );

    if launched == 0 {
        warn!("No backend credentials configured; nothing will be dispatched");
    } else {
        info!("Bot is running with {} adapter(s)", launched);
    }

    lifecycle::wait_for_shutdown().await
}

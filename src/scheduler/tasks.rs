use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use tracing::{debug, info};

use crate::bot::BotCore;
use crate::scheduler::Scheduler;

/// Hourly liveness line in the log.
const HEARTBEAT_CRON: &str = "0 0 * * * *";

/// Register the built-in maintenance jobs.
pub async fn register_builtin_tasks(
    scheduler: &Scheduler,
    core: Arc<BotCore>,
    purge_cron: &str,
) -> anyhow::Result<()> {
    scheduler
        .add_job(HEARTBEAT_CRON, "heartbeat", || {
            async {
                info!("Heartbeat: bot is alive");
                Ok::<(), anyhow::Error>(())
            }
            .boxed()
        })
        .await?;

    scheduler
        .add_job(purge_cron, "throttle-purge", move || {
            let core = core.clone();
            async move {
                let removed = core.limiter().cache().purge_expired(Instant::now()).await;
                debug!("Purged {} expired throttle records", removed);
                Ok::<(), anyhow::Error>(())
            }
            .boxed()
        })
        .await?;

    Ok(())
}

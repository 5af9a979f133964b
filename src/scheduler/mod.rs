pub mod tasks;

use anyhow::{Context, Result};
use futures::future::BoxFuture;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{debug, info};

use crate::isolation::Isolation;

/// Cron runner for maintenance jobs. Every run goes through the same fault
/// isolation as command handlers.
pub struct Scheduler {
    inner: JobScheduler,
    isolation: Isolation,
}

impl Scheduler {
    pub async fn new(isolation: Isolation) -> Result<Self> {
        let inner = JobScheduler::new()
            .await
            .context("Failed to create job scheduler")?;
        Ok(Self { inner, isolation })
    }

    /// Add a recurring job. `cron_expr` uses the six-field form (seconds first).
    pub async fn add_job<F>(&self, cron_expr: &str, name: &str, task: F) -> Result<()>
    where
        F: Fn() -> BoxFuture<'static, Result<()>> + Send + Sync + 'static,
    {
        let label = format!("job {}", name);
        let isolation = self.isolation.clone();
        let job = Job::new_async(cron_expr, move |_uuid, _lock| {
            let label = label.clone();
            let isolation = isolation.clone();
            let fut = task();
            Box::pin(async move {
                debug!("Running {}", label);
                isolation.run(&label, fut).await;
            })
        })
        .with_context(|| format!("Invalid cron expression for {}: {}", name, cron_expr))?;

        self.inner
            .add(job)
            .await
            .with_context(|| format!("Failed to add job: {}", name))?;

        info!("Scheduled job '{}' with cron: {}", name, cron_expr);
        Ok(())
    }

    pub async fn start(&self) -> Result<()> {
        self.inner
            .start()
            .await
            .context("Failed to start scheduler")?;
        info!("Scheduler started");
        Ok(())
    }
}

use std::future::Future;

use anyhow::Result;
use tracing::{info, warn};

use crate::isolation::Isolation;
use crate::platform::BackendKind;

/// Split a comma separated credential list, dropping empty entries.
pub fn parse_credentials(csv: &str) -> Vec<String> {
    csv.split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}

/// Spawn one adapter task per credential in `csv`.
///
/// Fire-and-forget: tasks are not awaited, supervised or restarted. Each run
/// loop is wrapped in `isolation`, so a failing adapter ends only its own
/// task. Returns the number of tasks launched.
pub fn launch_csv<F, Fut>(
    isolation: &Isolation,
    kind: BackendKind,
    csv: &str,
    prefix: &str,
    run: F,
) -> usize
where
    F: Fn(String, String) -> Fut,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    let credentials = parse_credentials(csv);
    for (index, credential) in credentials.iter().enumerate() {
        // Credentials stay out of logs; adapters are named by kind and index
        let label = format!("{} adapter #{}", kind, index);
        let fut = run(credential.clone(), prefix.to_string());
        let isolation = isolation.clone();

        info!("Launching {}", label);
        tokio::spawn(async move {
            isolation.run(&label, fut).await;
            warn!("{} stopped", label);
        });
    }
    credentials.len()
}

/// Park the main task until the process is told to stop.
pub async fn wait_for_shutdown() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");
    Ok(())
}

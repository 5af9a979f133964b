use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use futures::FutureExt;
use tracing::{error, warn};

use crate::report::{Fault, FaultKind, Reporter, WebhookReporter};

/// Fault isolation wrapper, applied around every handler call and every
/// adapter run loop.
///
/// With a reporter configured, panics and errors are captured, reported and
/// swallowed. Without one the future is awaited as-is: errors are only
/// logged and a panic unwinds into the enclosing task.
#[derive(Clone)]
pub struct Isolation {
    reporter: Option<Arc<dyn Reporter>>,
    report_timeout: Duration,
}

/// How long a fault report may hold up the caller.
const REPORT_TIMEOUT: Duration = Duration::from_secs(15);

impl Isolation {
    pub fn disabled() -> Self {
        Self {
            reporter: None,
            report_timeout: REPORT_TIMEOUT,
        }
    }

    pub fn with_reporter(reporter: Arc<dyn Reporter>) -> Self {
        Self {
            reporter: Some(reporter),
            report_timeout: REPORT_TIMEOUT,
        }
    }

    pub fn with_report_timeout(mut self, timeout: Duration) -> Self {
        self.report_timeout = timeout;
        self
    }

    /// Enabled when a reporting endpoint is configured.
    pub fn from_endpoint(endpoint: Option<&str>) -> Self {
        match endpoint.filter(|url| !url.trim().is_empty()) {
            Some(url) => Self::with_reporter(Arc::new(WebhookReporter::new(url.to_string()))),
            None => Self::disabled(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.reporter.is_some()
    }

    /// Run `fut` under isolation. Returns the captured fault, if any.
    pub async fn run<F>(&self, context: &str, fut: F) -> Option<Fault>
    where
        F: Future<Output = Result<()>>,
    {
        let Some(reporter) = &self.reporter else {
            return match fut.await {
                Ok(()) => None,
                Err(e) => {
                    warn!("{} failed: {:#}", context, e);
                    Some(Fault::new(context, FaultKind::Error, format!("{:#}", e)))
                }
            };
        };

        let fault = match AssertUnwindSafe(fut).catch_unwind().await {
            Ok(Ok(())) => return None,
            Ok(Err(e)) => {
                warn!("{} failed: {:#}", context, e);
                Fault::new(context, FaultKind::Error, format!("{:#}", e))
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!("{} panicked: {}", context, message);
                Fault::new(context, FaultKind::Panic, message)
            }
        };

        match tokio::time::timeout(self.report_timeout, reporter.report(&fault)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Failed to report fault {}: {:#}", fault.id, e),
            Err(_) => warn!(
                "Reporting fault {} timed out after {:?}",
                fault.id, self.report_timeout
            ),
        }
        Some(fault)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

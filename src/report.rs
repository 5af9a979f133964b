use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FaultKind {
    /// The code under isolation panicked
    Panic,
    /// The code under isolation returned an error
    Error,
}

/// One captured fault, as sent to the reporting endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct Fault {
    pub id: Uuid,
    pub occurred_at: DateTime<Utc>,
    /// Where it happened, e.g. "command wiki" or "telegram adapter #0"
    pub context: String,
    pub kind: FaultKind,
    pub message: String,
}

impl Fault {
    pub fn new(context: &str, kind: FaultKind, message: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            occurred_at: Utc::now(),
            context: context.to_string(),
            kind,
            message,
        }
    }
}

/// Sink for isolated faults.
#[async_trait]
pub trait Reporter: Send + Sync {
    /// Deliver one fault. The isolation wrapper waits for this to finish.
    async fn report(&self, fault: &Fault) -> Result<()>;
}

/// Posts each fault as JSON to a webhook endpoint.
pub struct WebhookReporter {
    client: reqwest::Client,
    endpoint: String,
}

impl WebhookReporter {
    pub fn new(endpoint: String) -> Self {
        Self::with_timeout(endpoint, crate::http::REQUEST_TIMEOUT)
    }

    pub fn with_timeout(endpoint: String, timeout: Duration) -> Self {
        Self {
            client: crate::http::client(timeout),
            endpoint,
        }
    }
}

#[async_trait]
impl Reporter for WebhookReporter {
    async fn report(&self, fault: &Fault) -> Result<()> {
        debug!("Reporting fault {} to {}", fault.id, self.endpoint);

        let response = self
            .client
            .post(&self.endpoint)
            .json(fault)
            .send()
            .await
            .context("Failed to send fault report")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Fault report rejected ({}): {}", status, body);
        }
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fault_json_shape() {
        let fault = Fault::new("command wiki", FaultKind::Panic, "boom".to_string());
        let value = serde_json::to_value(&fault).unwrap();
        assert_eq!(value["kind"], "panic");
        assert_eq!(value["context"], "command wiki");
        assert_eq!(value["message"], "boom");
        assert!(value["id"].as_str().is_some());
        assert!(value["occurred_at"].as_str().is_some());
    }

    #[tokio::test]
    async fn test_webhook_unreachable_is_error() {
        let reporter = WebhookReporter::new("http://127.0.0.1:9/report".to_string());
        let fault = Fault::new("test", FaultKind::Error, "x".to_string());
        assert!(reporter.report(&fault).await.is_err());
    }

    #[tokio::test]
    async fn test_webhook_silent_endpoint_gives_up() {
        let endpoint = crate::http::testing::silent_endpoint().await;
        let reporter = WebhookReporter::with_timeout(endpoint, Duration::from_millis(200));
        let fault = Fault::new("test", FaultKind::Error, "x".to_string());

        let result = tokio::time::timeout(Duration::from_secs(5), reporter.report(&fault)).await;
        assert!(matches!(result, Ok(Err(_))));
    }
}

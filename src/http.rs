use std::time::Duration;

use reqwest::Client;

/// Upper bound on one outbound request, connect through body.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared HTTP client constructor. Every request is bounded by `timeout`, so
/// a peer that accepts and never answers can't stall a dispatch loop.
pub fn client(timeout: Duration) -> Client {
    Client::builder()
        .timeout(timeout)
        .connect_timeout(CONNECT_TIMEOUT.min(timeout))
        .build()
        .unwrap_or_else(|_| Client::new())
}

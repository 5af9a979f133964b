use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::debug;

use crate::config::ThrottleConfig;

/// Sweep expired records inline once the cache grows past this size.
const SWEEP_THRESHOLD: usize = 4096;

struct Records {
    map: HashMap<String, Record>,
    /// Size at which the next inline sweep runs. Doubles past the live set
    /// after each sweep so a large live set isn't rescanned on every admit.
    sweep_at: usize,
}

/// One limit to enforce: at most `limit` hits on `key` per `window`.
#[derive(Debug, Clone)]
pub struct Rule {
    pub key: String,
    pub window: Duration,
    pub limit: u32,
}

/// Fixed-window hit counter.
#[derive(Debug, Clone, Copy)]
struct Record {
    started: Instant,
    window: Duration,
    hits: u32,
}

impl Record {
    fn is_live(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.started) < self.window
    }
}

/// In-memory store of throttle records shared by every adapter task.
pub struct ThrottleCache {
    records: Mutex<Records>,
}

impl ThrottleCache {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(Records {
                map: HashMap::new(),
                sweep_at: SWEEP_THRESHOLD,
            }),
        }
    }

    /// Check every rule and, only if all have room, count a hit on each.
    /// Runs under one lock, so two concurrent callers can't both slip through.
    pub async fn admit(&self, rules: &[Rule], now: Instant) -> bool {
        let mut guard = self.records.lock().await;
        let Records { map: records, sweep_at } = &mut *guard;

        let blocked = rules.iter().any(|rule| {
            records
                .get(&rule.key)
                .is_some_and(|r| r.is_live(now) && r.hits >= rule.limit)
        });
        if blocked {
            return false;
        }

        for rule in rules {
            match records.get_mut(&rule.key) {
                Some(record) if record.is_live(now) => record.hits += 1,
                _ => {
                    records.insert(
                        rule.key.clone(),
                        Record {
                            started: now,
                            window: rule.window,
                            hits: 1,
                        },
                    );
                }
            }
        }

        if records.len() > *sweep_at {
            records.retain(|_, r| r.is_live(now));
            *sweep_at = (records.len() * 2).max(SWEEP_THRESHOLD);
        }
        true
    }

    /// Drop expired records. Returns how many were removed.
    pub async fn purge_expired(&self, now: Instant) -> usize {
        let mut records = self.records.lock().await;
        let before = records.map.len();
        records.map.retain(|_, r| r.is_live(now));
        records.sweep_at = (records.map.len() * 2).max(SWEEP_THRESHOLD);
        before - records.map.len()
    }

    #[allow(dead_code)]
    pub async fn len(&self) -> usize {
        self.records.lock().await.map.len()
    }
}

/// Anti-spam gate consulted before any command parsing.
///
/// Two rules apply per message:
/// - duplicate: the same text in the same channel is let through once per
///   `duplicate_window_secs`;
/// - flood: at most `channel_burst` messages per channel per
///   `channel_window_secs`.
///
/// A zero window or burst disables the corresponding rule.
pub struct RateLimiter {
    cache: ThrottleCache,
    duplicate_window: Duration,
    channel_window: Duration,
    channel_burst: u32,
}

impl RateLimiter {
    pub fn new(config: &ThrottleConfig) -> Self {
        Self {
            cache: ThrottleCache::new(),
            duplicate_window: Duration::from_secs(config.duplicate_window_secs),
            channel_window: Duration::from_secs(config.channel_window_secs),
            channel_burst: config.channel_burst,
        }
    }

    pub async fn allow(&self, channel: &str, text: &str) -> bool {
        self.allow_at(channel, text, Instant::now()).await
    }

    pub async fn allow_at(&self, channel: &str, text: &str, now: Instant) -> bool {
        let rules = self.rules_for(channel, text);
        if rules.is_empty() {
            return true;
        }
        let allowed = self.cache.admit(&rules, now).await;
        if !allowed {
            debug!("Throttled message in channel {}", channel);
        }
        allowed
    }

    pub fn cache(&self) -> &ThrottleCache {
        &self.cache
    }

    fn rules_for(&self, channel: &str, text: &str) -> Vec<Rule> {
        let mut rules = Vec::with_capacity(2);
        if !self.duplicate_window.is_zero() {
            rules.push(Rule {
                key: format!("dup:{}\u{1f}{}", channel, text),
                window: self.duplicate_window,
                limit: 1,
            });
        }
        if self.channel_burst > 0 && !self.channel_window.is_zero() {
            rules.push(Rule {
                key: format!("chan:{}", channel),
                window: self.channel_window,
                limit: self.channel_burst,
            });
        }
        rules
    }
}

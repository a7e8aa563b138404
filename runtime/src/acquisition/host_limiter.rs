//! Per-host concurrency cap shared by both fetch pools.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;

struct HostSlot {
    semaphore: Arc<Semaphore>,
    last_request: Mutex<Option<Instant>>,
}

/// Limits concurrent requests per host and enforces an optional minimum
/// spacing between requests to the same host.
///
/// Requests to a saturated host queue behind one another; other hosts are
/// unaffected.
pub struct HostLimiter {
    per_host: usize,
    min_delay: Duration,
    hosts: DashMap<String, Arc<HostSlot>>,
}

impl HostLimiter {
    /// - `per_host`: maximum concurrent requests to one host (at least 1)
    /// - `min_delay_ms`: minimum milliseconds between request starts on one host
    pub fn new(per_host: usize, min_delay_ms: u64) -> Self {
        Self {
            per_host: per_host.max(1),
            min_delay: Duration::from_millis(min_delay_ms),
            hosts: DashMap::new(),
        }
    }

    pub fn per_host(&self) -> usize {
        self.per_host
    }

    fn slot(&self, host: &str) -> Arc<HostSlot> {
        self.hosts
            .entry(host.to_string())
            .or_insert_with(|| {
                Arc::new(HostSlot {
                    semaphore: Arc::new(Semaphore::new(self.per_host)),
                    last_request: Mutex::new(None),
                })
            })
            .clone()
    }

    /// Wait for a free slot on the URL's host.
    pub async fn acquire(&self, url: &str) -> HostGuard {
        let host = host_key(url);
        let slot = self.slot(&host);

        let permit = slot
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .expect("host semaphore is never closed");

        if !self.min_delay.is_zero() {
            let mut last = slot.last_request.lock().await;
            if let Some(prev) = *last {
                let elapsed = prev.elapsed();
                if elapsed < self.min_delay {
                    tokio::time::sleep(self.min_delay - elapsed).await;
                }
            }
            *last = Some(Instant::now());
        }

        HostGuard {
            host,
            _permit: permit,
        }
    }

    /// Requests currently holding a slot on `host`.
    pub fn in_flight(&self, host: &str) -> usize {
        self.hosts
            .get(&host.to_ascii_lowercase())
            .map(|slot| self.per_host - slot.semaphore.available_permits())
            .unwrap_or(0)
    }
}

/// Releases the host slot when dropped.
pub struct HostGuard {
    host: String,
    _permit: OwnedSemaphorePermit,
}

impl HostGuard {
    pub fn host(&self) -> &str {
        &self.host
    }
}

/// Lowercased host of a URL; unparseable input is used verbatim.
pub fn host_key(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_ascii_lowercase()))
        .unwrap_or_else(|| url.to_string())
}

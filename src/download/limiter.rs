// BulkDL - Bulk Media Downloader
// Copyright (C) 2025 Henning Berge
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


//! Rate limiting and download slots
//!
//! # Limiters
//! - Per-domain request limiters with built-in budgets for fragile hosts
//! - One global request limiter
//! - A global bandwidth bucket drained at the configured bytes per second
//! - Per-domain and global download slot semaphores
//! - A per-domain "spacer" sleep before each download request
//!
//! Acquisition only ever waits. Nothing here returns an error.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, OwnedSemaphorePermit, RwLock, Semaphore};
use tokio::time::{sleep, Instant};
use tracing::debug;

use crate::config::{DomainRateLimit, RateLimitConfig};

/// Domain key used for hosts without their own budget
pub const FALLBACK_DOMAIN: &str = "other";

/// Spacer for domains missing from the spacer table, in seconds
pub const DEFAULT_SPACER: f64 = 0.1;

/// Largest amount the bandwidth bucket holds before it blocks
const MAX_BURST_BYTES: f64 = 10.0 * 1024.0 * 1024.0;

/// Built-in request budgets (requests, period seconds)
const DOMAIN_RATE_LIMITS: &[(&str, u32, f64)] = &[
    ("bunkrr", 5, 1.0),
    ("cyberdrop", 5, 1.0),
    ("coomer", 1, 1.0),
    ("kemono", 1, 1.0),
    ("pixeldrain", 10, 1.0),
    ("gofile", 100, 60.0),
    (FALLBACK_DOMAIN, 25, 1.0),
];

const DOMAIN_SPACERS: &[(&str, f64)] = &[
    ("bunkr", 0.5),
    ("bunkrr", 0.5),
    ("cyberdrop", 0.0),
    ("cyberfile", 0.0),
    ("pixeldrain", 0.0),
    ("coomer", 0.5),
    ("kemono", 0.5),
    ("nhentai.net", 1.0),
];

/// Hosts that only tolerate a few parallel downloads
const DOMAIN_DOWNLOAD_SLOTS: &[(&str, usize)] = &[
    ("bunkr", 1),
    ("bunkrr", 1),
    ("cyberdrop", 1),
    ("cyberfile", 1),
    ("pixeldrain", 2),
    ("xxxbunker", 2),
];

#[derive(Debug)]
struct BucketState {
    level: f64,
    last_leak: Instant,
}

impl BucketState {
    fn leak(&mut self, rate_per_sec: f64) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_leak).as_secs_f64();
        self.level = (self.level - elapsed * rate_per_sec).max(0.0);
        self.last_leak = now;
    }
}

/// Leaky-bucket request limiter: at most `max_rate` acquisitions per `period`
#[derive(Debug)]
pub struct AsyncLimiter {
    max_rate: f64,
    rate_per_sec: f64,
    state: Mutex<BucketState>,
}

impl AsyncLimiter {
    pub fn new(max_rate: u32, period: Duration) -> Self {
        let max_rate = f64::from(max_rate.max(1));
        let period = period.as_secs_f64().max(f64::EPSILON);
        Self {
            max_rate,
            rate_per_sec: max_rate / period,
            state: Mutex::new(BucketState {
                level: 0.0,
                last_leak: Instant::now(),
            }),
        }
    }

    fn from_budget(budget: DomainRateLimit) -> Self {
        Self::new(budget.requests, Duration::from_secs_f64(budget.period_secs.max(0.0)))
    }

    /// Wait for one unit of capacity
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut state = self.state.lock().await;
                state.leak(self.rate_per_sec);
                if state.level + 1.0 <= self.max_rate {
                    state.level += 1.0;
                    return;
                }
                (state.level + 1.0 - self.max_rate) / self.rate_per_sec
            };
            sleep(Duration::from_secs_f64(wait)).await;
        }
    }
}

/// Bandwidth limiter drained at `rate` bytes per second
///
/// One chunk may overfill the bucket; the next acquisition then waits until
/// the level falls back to one second's worth of bytes.
#[derive(Debug)]
pub struct LeakyBucket {
    rate: f64,
    state: Mutex<BucketState>,
}

impl LeakyBucket {
    /// `bytes_per_sec == 0` makes every acquisition a no-op
    pub fn new(bytes_per_sec: u64) -> Self {
        Self {
            rate: bytes_per_sec as f64,
            state: Mutex::new(BucketState {
                level: 0.0,
                last_leak: Instant::now(),
            }),
        }
    }

    pub fn is_unlimited(&self) -> bool {
        self.rate <= 0.0
    }

    pub async fn acquire(&self, amount: usize) {
        if self.is_unlimited() {
            return;
        }
        let amount = amount as f64;

        loop {
            let wait = {
                let mut state = self.state.lock().await;
                state.leak(self.rate);
                if state.level <= self.rate && state.level + amount <= MAX_BURST_BYTES.max(amount) {
                    state.level += amount;
                    return;
                }
                let over = (state.level - self.rate).max(0.0);
                (over / self.rate).max(amount.min(self.rate) / self.rate)
            };
            sleep(Duration::from_secs_f64(wait)).await;
        }
    }
}

/// Every limiter a download passes through
#[derive(Debug)]
pub struct RateLimiterSet {
    domain_limiters: HashMap<String, Arc<AsyncLimiter>>,
    global_limiter: AsyncLimiter,
    bandwidth: LeakyBucket,
    spacers: HashMap<String, f64>,
    download_delay: f64,
    domain_slot_limits: HashMap<String, usize>,
    per_domain_max: usize,
    domain_slots: RwLock<HashMap<String, Arc<Semaphore>>>,
    global_slots: Arc<Semaphore>,
}

impl RateLimiterSet {
    /// Build from config; config entries override the built-in tables
    pub fn new(config: &RateLimitConfig) -> Self {
        let mut budgets: HashMap<String, DomainRateLimit> = DOMAIN_RATE_LIMITS
            .iter()
            .map(|(domain, requests, period_secs)| {
                (
                    domain.to_string(),
                    DomainRateLimit {
                        requests: *requests,
                        period_secs: *period_secs,
                    },
                )
            })
            .collect();
        budgets.extend(config.domain_rate_limits.clone());

        let domain_limiters = budgets
            .into_iter()
            .map(|(domain, budget)| (domain, Arc::new(AsyncLimiter::from_budget(budget))))
            .collect();

        let mut spacers: HashMap<String, f64> = DOMAIN_SPACERS
            .iter()
            .map(|(domain, secs)| (domain.to_string(), *secs))
            .collect();
        spacers.extend(config.domain_download_spacers.clone());

        let mut domain_slot_limits: HashMap<String, usize> = DOMAIN_DOWNLOAD_SLOTS
            .iter()
            .map(|(domain, slots)| (domain.to_string(), *slots))
            .collect();
        domain_slot_limits.extend(config.domain_max_downloads.clone());

        Self {
            domain_limiters,
            global_limiter: AsyncLimiter::new(config.rate_limit, Duration::from_secs(1)),
            bandwidth: LeakyBucket::new(config.download_speed_limit),
            spacers,
            download_delay: config.download_delay.max(0.0),
            domain_slot_limits,
            per_domain_max: config.max_simultaneous_downloads_per_domain.max(1),
            domain_slots: RwLock::new(HashMap::new()),
            global_slots: Arc::new(Semaphore::new(config.max_simultaneous_downloads.max(1))),
        }
    }

    fn domain_limiter(&self, domain: &str) -> Option<&Arc<AsyncLimiter>> {
        self.domain_limiters
            .get(domain)
            .or_else(|| self.domain_limiters.get(FALLBACK_DOMAIN))
    }

    pub async fn acquire_domain(&self, domain: &str) {
        if let Some(limiter) = self.domain_limiter(domain) {
            limiter.acquire().await;
        }
    }

    pub async fn acquire_global(&self) {
        self.global_limiter.acquire().await;
    }

    pub async fn acquire_bandwidth(&self, bytes: usize) {
        self.bandwidth.acquire(bytes).await;
    }

    /// Spacer delay for a domain in seconds
    pub fn spacer(&self, domain: &str) -> f64 {
        self.spacers.get(domain).copied().unwrap_or(DEFAULT_SPACER)
    }

    /// Sleep the domain spacer plus the configured download delay
    pub async fn wait_spacer(&self, domain: &str) {
        let secs = self.spacer(domain) + self.download_delay;
        if secs > 0.0 {
            sleep(Duration::from_secs_f64(secs)).await;
        }
    }

    /// Number of parallel downloads allowed for a domain
    pub fn download_limit(&self, domain: &str) -> usize {
        self.domain_slot_limits
            .get(domain)
            .copied()
            .unwrap_or(self.per_domain_max)
            .min(self.per_domain_max)
            .max(1)
    }

    async fn domain_semaphore(&self, domain: &str) -> Arc<Semaphore> {
        if let Some(semaphore) = self.domain_slots.read().await.get(domain) {
            return semaphore.clone();
        }
        let mut slots = self.domain_slots.write().await;
        slots
            .entry(domain.to_string())
            .or_insert_with(|| {
                let limit = self.download_limit(domain);
                debug!(domain, limit, "Creating download slots");
                Arc::new(Semaphore::new(limit))
            })
            .clone()
    }

    /// Hold one of the domain's download slots until the permit drops
    pub async fn acquire_download_slot(&self, domain: &str) -> OwnedSemaphorePermit {
        let semaphore = self.domain_semaphore(domain).await;
        acquire_owned(semaphore).await
    }

    /// Hold one of the global download slots until the permit drops
    pub async fn acquire_global_download_slot(&self) -> OwnedSemaphorePermit {
        acquire_owned(self.global_slots.clone()).await
    }
}

async fn acquire_owned(semaphore: Arc<Semaphore>) -> OwnedSemaphorePermit {
    loop {
        // semaphores here are never closed
        if let Ok(permit) = semaphore.clone().acquire_owned().await {
            return permit;
        }
        tokio::task::yield_now().await;
    }
}

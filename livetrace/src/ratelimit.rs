use std::sync::Arc;
use std::time::Instant;

use fnv::FnvHashMap;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;

/// Token bucket for one probe id. Refill is driven by the monotonic clock
/// on every consume, so an idle bucket costs nothing.
struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
    dropped: u64,
    rate_per_second: f64,
    burst: f64,
}

impl TokenBucket {
    fn new(rate_per_second: f64, burst: f64) -> Self {
        Self {
            tokens: burst,
            last_refill: Instant::now(),
            dropped: 0,
            rate_per_second,
            burst,
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = self.burst.min(self.tokens + elapsed * self.rate_per_second);
        self.last_refill = now;
    }

    fn consume(&mut self, rate_per_second: f64, burst: f64) -> bool {
        // limits come from the probe record on every call, so an upsert
        // with a new sample config takes effect immediately
        self.rate_per_second = rate_per_second;
        self.burst = burst;
        self.refill();

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            self.dropped += 1;
            false
        }
    }

    fn reset(&mut self) {
        self.tokens = self.burst;
        self.last_refill = Instant::now();
        self.dropped = 0;
    }
}

#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LimiterStats {
    pub rate_per_second: f64,
    pub burst: f64,
    pub tokens: f64,
    pub dropped_count: u64,
}

/// Per-probe admission control. Buckets are created lazily on first hit
/// and torn down with the probe. Each bucket has its own lock so a
/// contended probe never stalls the others.
pub struct RateLimiterSet {
    buckets: RwLock<FnvHashMap<String, Arc<Mutex<TokenBucket>>>>,
}

impl Default for RateLimiterSet {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiterSet {
    pub fn new() -> Self {
        Self {
            buckets: RwLock::new(FnvHashMap::default()),
        }
    }

    pub fn consume(&self, probe_id: &str, rate_per_second: f64, burst: f64) -> bool {
        let bucket = { self.buckets.read().get(probe_id).cloned() };
        let bucket = match bucket {
            Some(b) => b,
            None => {
                let mut buckets = self.buckets.write();
                buckets
                    .entry(probe_id.to_owned())
                    .or_insert_with(|| Arc::new(Mutex::new(TokenBucket::new(rate_per_second, burst))))
                    .clone()
            }
        };

        let allowed = bucket.lock().consume(rate_per_second, burst);
        allowed
    }

    pub fn stats(&self, probe_id: &str) -> Option<LimiterStats> {
        let bucket = self.buckets.read().get(probe_id).cloned()?;
        let mut bucket = bucket.lock();
        bucket.refill();
        Some(LimiterStats {
            rate_per_second: bucket.rate_per_second,
            burst: bucket.burst,
            tokens: bucket.tokens,
            dropped_count: bucket.dropped,
        })
    }

    pub fn reset(&self, probe_id: &str) {
        if let Some(bucket) = self.buckets.read().get(probe_id) {
            bucket.lock().reset();
        }
    }

    pub fn remove(&self, probe_id: &str) {
        self.buckets.write().remove(probe_id);
    }

    /// Sum of dropped counts across all buckets.
    pub fn total_dropped(&self) -> u64 {
        let buckets = self.buckets.read();
        buckets.values().map(|b| b.lock().dropped).sum()
    }
}

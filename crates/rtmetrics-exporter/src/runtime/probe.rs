//! Scheduling-latency probe.
//!
//! Periodically spawns an empty task and records the delay between spawn and
//! first poll. Buckets are fixed in nanoseconds and stored per-bucket (not
//! cumulative); the snapshot builder accumulates them.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rtmetrics_core::sampler::{RawBucket, RawHistogram};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

// 1us .. 1s, plus an overflow slot.
const BOUNDS_NANOS: [u64; 13] = [
    1_000,
    5_000,
    10_000,
    50_000,
    100_000,
    500_000,
    1_000_000,
    5_000_000,
    10_000_000,
    50_000_000,
    100_000_000,
    500_000_000,
    1_000_000_000,
];

pub struct SchedLatencyProbe {
    buckets: [AtomicU64; BOUNDS_NANOS.len() + 1],
    sum_nanos: AtomicU64,
}

impl Default for SchedLatencyProbe {
    fn default() -> Self {
        Self {
            buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            sum_nanos: AtomicU64::new(0),
        }
    }
}

impl SchedLatencyProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&self, latency: Duration) {
        let nanos = u64::try_from(latency.as_nanos()).unwrap_or(u64::MAX);
        let idx = BOUNDS_NANOS
            .iter()
            .position(|&b| nanos <= b)
            .unwrap_or(BOUNDS_NANOS.len());
        self.buckets[idx].fetch_add(1, Ordering::Relaxed);
        self.sum_nanos.fetch_add(nanos, Ordering::Relaxed);
    }

    /// Current distribution in seconds. Counts and sum are read independently,
    /// so a concurrent observation may be reflected in one and not the other.
    pub fn snapshot(&self) -> RawHistogram {
        let mut buckets: Vec<RawBucket> = BOUNDS_NANOS
            .iter()
            .zip(self.buckets.iter())
            .map(|(&b, c)| RawBucket::new(b as f64 / 1e9, c.load(Ordering::Relaxed)))
            .collect();
        let overflow = self.buckets[BOUNDS_NANOS.len()].load(Ordering::Relaxed);
        buckets.push(RawBucket::new(f64::INFINITY, overflow));

        RawHistogram {
            buckets,
            sum: Some(self.sum_nanos.load(Ordering::Relaxed) as f64 / 1e9),
        }
    }

    /// Start probing on `handle` every `interval`. The caller owns the task.
    pub fn spawn(self: &Arc<Self>, handle: &Handle, interval: Duration) -> JoinHandle<()> {
        let probe = Arc::clone(self);
        let inner = handle.clone();
        handle.spawn(async move {
            let mut tick = tokio::time::interval(interval);
            tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tick.tick().await;
                let spawned_at = Instant::now();
                match inner.spawn(async move { spawned_at.elapsed() }).await {
                    Ok(latency) => probe.observe(latency),
                    Err(e) => {
                        tracing::debug!(error = %e, "latency probe task failed");
                        break;
                    }
                }
            }
        })
    }
}

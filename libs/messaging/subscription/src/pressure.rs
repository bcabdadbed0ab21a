//! Queue pressure monitoring
//!
//! A passive sampler: callers report writes, reads and drops, and the monitor
//! logs at most one warning per interval once the tracked depth crosses the
//! configured share of capacity. The "last warned" timestamp is claimed with
//! a compare-and-set so concurrent writers never emit duplicate warnings.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::Instant;

const NEVER_WARNED: u64 = u64::MAX;

/// Warning threshold and rate limit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PressureConfig {
    /// Percentage of capacity (1..=100) at which warnings start
    pub threshold_percent: u8,
    /// Minimum spacing between two warnings
    pub min_interval: Duration,
}

impl Default for PressureConfig {
    fn default() -> Self {
        Self {
            threshold_percent: 80,
            min_interval: Duration::from_secs(5),
        }
    }
}

/// Point-in-time counters for one queue
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PressureSnapshot {
    pub written: u64,
    pub read: u64,
    pub dropped: u64,
    pub depth: usize,
    pub capacity: Option<usize>,
    /// `depth / capacity`, always 0.0 for unbounded queues
    pub fill_ratio: f64,
    pub warnings: u64,
}

#[derive(Debug)]
pub struct QueuePressureMonitor {
    name: String,
    capacity: Option<usize>,
    threshold_depth: usize,
    min_interval_ms: u64,
    origin: Instant,

    depth: AtomicUsize,
    written: AtomicU64,
    read: AtomicU64,
    dropped: AtomicU64,
    warnings: AtomicU64,
    last_warned_ms: AtomicU64,
}

impl QueuePressureMonitor {
    pub fn new(name: impl Into<String>, capacity: Option<usize>, config: PressureConfig) -> Self {
        let percent = config.threshold_percent.clamp(1, 100) as usize;
        let threshold_depth = capacity
            .map(|cap| (cap * percent).div_ceil(100).max(1))
            .unwrap_or(usize::MAX);

        Self {
            name: name.into(),
            capacity,
            threshold_depth,
            min_interval_ms: config.min_interval.as_millis() as u64,
            origin: Instant::now(),
            depth: AtomicUsize::new(0),
            written: AtomicU64::new(0),
            read: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            warnings: AtomicU64::new(0),
            last_warned_ms: AtomicU64::new(NEVER_WARNED),
        }
    }

    /// Warnings only fire for bounded queues
    pub fn is_enabled(&self) -> bool {
        self.capacity.is_some()
    }

    /// An item entered the queue without displacing another
    pub fn record_write(&self) {
        self.written.fetch_add(1, Ordering::Relaxed);
        let depth = self.depth.fetch_add(1, Ordering::AcqRel) + 1;
        if depth >= self.threshold_depth {
            self.maybe_warn(depth, "queue above pressure threshold");
        }
    }

    /// An item was lost to the overflow policy; depth is unchanged
    pub fn record_drop(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// A write found the queue at capacity
    pub fn record_full(&self) {
        let depth = self.depth.load(Ordering::Acquire);
        self.maybe_warn(depth, "queue full");
    }

    pub fn record_read(&self) {
        self.read.fetch_add(1, Ordering::Relaxed);
        // saturate: a reader may race ahead of the writer's increment
        let _ = self
            .depth
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |d| Some(d.saturating_sub(1)));
    }

    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::Acquire)
    }

    pub fn snapshot(&self) -> PressureSnapshot {
        let depth = self.depth();
        PressureSnapshot {
            written: self.written.load(Ordering::Relaxed),
            read: self.read.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            depth,
            capacity: self.capacity,
            fill_ratio: match self.capacity {
                Some(cap) if cap > 0 => depth as f64 / cap as f64,
                _ => 0.0,
            },
            warnings: self.warnings.load(Ordering::Relaxed),
        }
    }

    /// Emit a warning if the rate limit allows; returns whether one was logged
    fn maybe_warn(&self, depth: usize, reason: &str) -> bool {
        let Some(capacity) = self.capacity else {
            return false;
        };

        let now_ms = self.origin.elapsed().as_millis() as u64;
        let last = self.last_warned_ms.load(Ordering::Acquire);
        if last != NEVER_WARNED && now_ms.saturating_sub(last) < self.min_interval_ms {
            return false;
        }
        if self
            .last_warned_ms
            .compare_exchange(last, now_ms, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        self.warnings.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(
            subscription = %self.name,
            depth,
            capacity,
            dropped = self.dropped.load(Ordering::Relaxed),
            "Task subscription {}: {}",
            self.name,
            reason
        );
        true
    }
}

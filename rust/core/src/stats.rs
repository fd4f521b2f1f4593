//! Consumption counters

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Counters kept by a session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStats {
    /// Records handed to the caller
    pub records: u64,
    /// Bytes in those records
    pub record_bytes: u64,
    /// Batch slots advanced onto
    pub chunks_visited: u64,
    /// Successful batch gets
    pub batches_fetched: u64,
    /// Events returned to the transport
    pub events_released: u64,
    /// Reads retried after crossing onto a new chunk
    pub exhaustion_retries: u64,
}

impl SessionStats {
    pub(crate) fn record_read(&mut self, bytes: usize) {
        self.records += 1;
        self.record_bytes += bytes as u64;
    }
}

/// Periodic rate reporting over successive stats snapshots
#[derive(Debug)]
pub struct RateMeter {
    started: Instant,
    last_at: Instant,
    last_records: u64,
}

/// One rate sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RateSample {
    /// Records/s since the previous sample
    pub rate: f64,
    /// Records/s since the meter started
    pub average: f64,
    /// Records counted so far
    pub total: u64,
}

impl RateMeter {
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    pub fn starting_at(now: Instant) -> Self {
        Self {
            started: now,
            last_at: now,
            last_records: 0,
        }
    }

    /// Take a sample if at least `interval` passed since the previous one
    pub fn sample(&mut self, stats: &SessionStats, now: Instant, interval: Duration) -> Option<RateSample> {
        let elapsed = now.saturating_duration_since(self.last_at);
        if elapsed < interval || elapsed.is_zero() {
            return None;
        }

        let delta = stats.records.saturating_sub(self.last_records);
        let total_elapsed = now.saturating_duration_since(self.started).as_secs_f64();
        let sample = RateSample {
            rate: delta as f64 / elapsed.as_secs_f64(),
            average: if total_elapsed > 0.0 {
                stats.records as f64 / total_elapsed
            } else {
                0.0
            },
            total: stats.records,
        };

        self.last_at = now;
        self.last_records = stats.records;
        Some(sample)
    }
}

impl Default for RateMeter {
    fn default() -> Self {
        Self::new()
    }
}

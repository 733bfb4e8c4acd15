use std::collections::VecDeque;

use crate::signal;
use crate::types::{MarketSnapshot, Statistics};

pub const DEFAULT_MAX_AGE_MS: u64 = 60_000;

/// A timestamped value used inside the rolling window
#[derive(Clone, Debug)]
pub struct TimedValue<T> {
    pub ts_ms: u64,
    pub value: T,
}

/// Time-bounded history of market snapshots for one instrument.
///
/// Feeds the statistics collaborator: rolling mean/stddev of price, mean
/// volume and realized volatility of log returns.
#[derive(Debug)]
pub struct RollingWindow {
    /// Snapshots ordered by time, oldest first.
    values: VecDeque<TimedValue<MarketSnapshot>>,

    /// Maximum age relative to the newest push.
    max_age_ms: u64,
}

impl Default for RollingWindow {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_AGE_MS)
    }
}

impl RollingWindow {
    pub fn new(max_age_ms: u64) -> Self {
        Self {
            values: VecDeque::new(),
            max_age_ms,
        }
    }

    /// Appends a snapshot. Out-of-order timestamps are dropped.
    pub fn push(&mut self, ts_ms: u64, snapshot: MarketSnapshot) {
        if let Some(back) = self.values.back() {
            if ts_ms < back.ts_ms {
                return;
            }
        }

        self.values.push_back(TimedValue {
            ts_ms,
            value: snapshot,
        });

        self.evict_old(ts_ms);
    }

    /// Evict values older than max_age
    fn evict_old(&mut self, now_ms: u64) {
        while let Some(front) = self.values.front() {
            if now_ms.saturating_sub(front.ts_ms) > self.max_age_ms {
                self.values.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn latest(&self) -> Option<MarketSnapshot> {
        self.values.back().map(|v| v.value)
    }

    pub fn prices(&self) -> Vec<f64> {
        self.values.iter().map(|v| v.value.price).collect()
    }

    pub fn returns(&self) -> Vec<f64> {
        signal::log_returns(&self.prices())
    }

    /// Rolling statistics, or `None` until two points are available.
    pub fn statistics(&self) -> Option<Statistics> {
        if self.values.len() < 2 {
            return None;
        }

        let prices = self.prices();
        let volumes: Vec<f64> = self.values.iter().map(|v| v.value.volume).collect();

        Some(Statistics {
            mean: signal::mean(&prices),
            stddev: signal::stddev(&prices),
            volume: signal::mean(&volumes),
            volatility: signal::stddev(&self.returns()),
        })
    }
}

use serde::Serialize;
use std::collections::BTreeMap;

use crate::models::config::validate_interval;
use crate::models::packet::ProtocolCategory;
use crate::utils::error::AppResult;
use crate::utils::time::window_label;

/// Smallest distance, in seconds, at which a timestamp counts as on a boundary
const BOUNDARY_TOLERANCE: f64 = 1e-9;

/// Totals for one window
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindowBucket {
    /// Start of the half-open window in seconds since the epoch
    pub window_start: f64,

    /// Human-readable start time, fixed on the first write
    pub label: String,

    /// Accumulated weight per category; only categories seen are present
    pub totals: BTreeMap<ProtocolCategory, u64>,
}

impl WindowBucket {
    /// Total for a category, zero if nothing was added
    pub fn total(&self, category: ProtocolCategory) -> u64 {
        self.totals.get(&category).copied().unwrap_or(0)
    }
}

/// Sparse map of fixed-width windows to per-category totals.
///
/// Buckets are keyed by the integer window index, so iteration is always in
/// chronological order no matter in which order events arrive.
#[derive(Debug, Clone)]
pub struct WindowAggregator {
    interval: f64,
    buckets: BTreeMap<i64, WindowBucket>,
}

impl WindowAggregator {
    /// Create an aggregator with windows `interval` seconds wide
    pub fn new(interval: f64) -> AppResult<Self> {
        validate_interval(interval)?;
        Ok(Self {
            interval,
            buckets: BTreeMap::new(),
        })
    }

    pub fn interval(&self) -> f64 {
        self.interval
    }

    /// Index of the window containing `timestamp`.
    ///
    /// A timestamp closer to a boundary than its own representation error
    /// (one ulp, at least 1 ns) is treated as lying on it, so `0.3` with a
    /// `0.1` interval is window 3. The tolerance is measured in seconds and
    /// stays below a microsecond for epoch timestamps, so packets just before
    /// a boundary keep their window.
    pub fn window_key(&self, timestamp: f64) -> i64 {
        let quotient = timestamp / self.interval;
        let nearest = quotient.round();
        let tolerance = (timestamp.abs() * f64::EPSILON).max(BOUNDARY_TOLERANCE);
        if (timestamp - nearest * self.interval).abs() <= tolerance {
            nearest as i64
        } else {
            quotient.floor() as i64
        }
    }

    /// Start time of the window with index `key`
    pub fn window_start(&self, key: i64) -> f64 {
        key as f64 * self.interval
    }

    /// Add `weight` to `category` in window `key`, creating the bucket if absent
    pub fn add(&mut self, key: i64, category: ProtocolCategory, weight: u64) {
        let interval = self.interval;
        let bucket = self.buckets.entry(key).or_insert_with(|| {
            let window_start = key as f64 * interval;
            WindowBucket {
                window_start,
                label: window_label(window_start),
                totals: BTreeMap::new(),
            }
        });
        *bucket.totals.entry(category).or_insert(0) += weight;
    }

    /// All buckets in ascending window order
    pub fn buckets(&self) -> impl Iterator<Item = &WindowBucket> {
        self.buckets.values()
    }

    /// `(window_start, totals)` pairs in ascending window order
    pub fn snapshot(&self) -> Vec<(f64, BTreeMap<ProtocolCategory, u64>)> {
        self.buckets
            .values()
            .map(|b| (b.window_start, b.totals.clone()))
            .collect()
    }

    /// Per-second rate of `category` in the window starting at `window_start`
    pub fn rate(&self, window_start: f64, category: ProtocolCategory) -> f64 {
        self.buckets
            .get(&self.window_key(window_start))
            .map_or(0.0, |b| b.total(category) as f64 / self.interval)
    }

    /// Sum of a category over all windows
    pub fn total(&self, category: ProtocolCategory) -> u64 {
        self.buckets.values().map(|b| b.total(category)).sum()
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

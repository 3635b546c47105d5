use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

/// Identifier of a monitored link, rendered as `"A-B"`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LinkKey(String);

impl LinkKey {
    /// Build the key for a pair of endpoints.
    ///
    /// With `canonical` unset the pair order is kept, so `(h1, h2)` and
    /// `(h2, h1)` are distinct links. With `canonical` set the endpoints are
    /// sorted first and both orders map to the same key.
    pub fn from_pair(a: &str, b: &str, canonical: bool) -> Self {
        if canonical && b < a {
            LinkKey(format!("{}-{}", b, a))
        } else {
            LinkKey(format!("{}-{}", a, b))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LinkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LinkKey {
    fn from(key: &str) -> Self {
        LinkKey(key.to_string())
    }
}

/// One active bandwidth measurement
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BandwidthSample {
    pub timestamp: DateTime<Utc>,
    pub mbps: f64,
}

/// One active latency measurement
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatencySample {
    pub timestamp: DateTime<Utc>,
    pub ms: f64,
}

/// Accumulated statistics for one link
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LinkStats {
    /// Total bytes sent from the first endpoint
    pub bytes_sent: u64,

    /// Total bytes received by the first endpoint
    pub bytes_recv: u64,

    /// Total packets sent from the first endpoint
    pub packets_sent: u64,

    /// Total packets received by the first endpoint
    pub packets_recv: u64,

    /// Bandwidth samples, oldest first
    pub bandwidth_history: VecDeque<BandwidthSample>,

    /// Latency samples, oldest first
    pub latency_history: VecDeque<LatencySample>,
}

impl LinkStats {
    /// Most recent bandwidth sample in Mbps
    pub fn current_bandwidth(&self) -> Option<f64> {
        self.bandwidth_history.back().map(|s| s.mbps)
    }

    /// Most recent latency sample in ms
    pub fn current_latency(&self) -> Option<f64> {
        self.latency_history.back().map(|s| s.ms)
    }
}

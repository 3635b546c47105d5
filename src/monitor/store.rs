use chrono::Utc;
use log::{debug, error, warn};
use parking_lot::Mutex;
use std::collections::{BTreeMap, VecDeque};
use std::path::PathBuf;

use crate::models::config::MonitorConfig;
use crate::models::stats::{BandwidthSample, LatencySample, LinkKey, LinkStats};
use crate::monitor::records::RecordWriter;
use crate::utils::error::AppResult;

struct StoreInner {
    links: BTreeMap<LinkKey, LinkStats>,
    records: Option<RecordWriter>,
    persist_errors: u64,
}

/// Thread-safe per-link statistics for one monitoring session.
///
/// One mutex guards both the link map and the record files, so every write
/// and every snapshot is serialized against all others. Writers to unrelated
/// links also wait on each other, including for the CSV append, which is
/// fine at one sampling task plus occasional reads.
pub struct LiveStatsStore {
    inner: Mutex<StoreInner>,
    canonical_links: bool,
    history_limit: Option<usize>,
}

impl LiveStatsStore {
    /// Create a store persisting records under the configured output directory
    pub fn new(config: &MonitorConfig) -> AppResult<Self> {
        let records = RecordWriter::create(&config.output_directory)?;
        Ok(Self::build(Some(records), config.canonical_links, config.history_limit))
    }

    /// Create a store that keeps statistics in memory only
    pub fn in_memory(canonical_links: bool, history_limit: Option<usize>) -> Self {
        Self::build(None, canonical_links, history_limit)
    }

    fn build(
        records: Option<RecordWriter>,
        canonical_links: bool,
        history_limit: Option<usize>,
    ) -> Self {
        Self {
            inner: Mutex::new(StoreInner {
                links: BTreeMap::new(),
                records,
                persist_errors: 0,
            }),
            canonical_links,
            history_limit,
        }
    }

    /// Key under which the pair `(a, b)` is stored
    pub fn link_key(&self, a: &str, b: &str) -> LinkKey {
        LinkKey::from_pair(a, b, self.canonical_links)
    }

    /// Add counter deltas to a link.
    ///
    /// If any delta is negative nothing is changed and `false` is returned.
    pub fn update_counters(
        &self,
        a: &str,
        b: &str,
        bytes_sent: i64,
        bytes_recv: i64,
        packets_sent: i64,
        packets_recv: i64,
    ) -> bool {
        if bytes_sent < 0 || bytes_recv < 0 || packets_sent < 0 || packets_recv < 0 {
            debug!(
                "Rejecting negative counter update for {}-{}: ({}, {}, {}, {})",
                a, b, bytes_sent, bytes_recv, packets_sent, packets_recv
            );
            return false;
        }
        let (bytes_sent, bytes_recv) = (bytes_sent as u64, bytes_recv as u64);
        let (packets_sent, packets_recv) = (packets_sent as u64, packets_recv as u64);

        let key = self.link_key(a, b);
        let mut inner = self.inner.lock();
        let timestamp = Utc::now();

        let stats = inner.links.entry(key.clone()).or_default();
        stats.bytes_sent = stats.bytes_sent.saturating_add(bytes_sent);
        stats.bytes_recv = stats.bytes_recv.saturating_add(bytes_recv);
        stats.packets_sent = stats.packets_sent.saturating_add(packets_sent);
        stats.packets_recv = stats.packets_recv.saturating_add(packets_recv);

        let result = inner.records.as_mut().map(|records| {
            records.write_traffic(
                &timestamp,
                &key,
                bytes_sent,
                bytes_recv,
                packets_sent,
                packets_recv,
            )
        });
        Self::note_persist_result(&mut inner, result, "traffic");
        true
    }

    /// Append a bandwidth sample to a link
    pub fn record_bandwidth(&self, a: &str, b: &str, mbps: f64) {
        if !mbps.is_finite() {
            warn!("Ignoring non-finite bandwidth sample for {}-{}", a, b);
            return;
        }

        let key = self.link_key(a, b);
        let mut inner = self.inner.lock();
        let timestamp = Utc::now();

        let stats = inner.links.entry(key.clone()).or_default();
        stats.bandwidth_history.push_back(BandwidthSample { timestamp, mbps });
        Self::enforce_limit(&mut stats.bandwidth_history, self.history_limit);

        let result = inner
            .records
            .as_mut()
            .map(|records| records.write_bandwidth(&timestamp, &key, mbps));
        Self::note_persist_result(&mut inner, result, "bandwidth");
    }

    /// Append a latency sample to a link
    pub fn record_latency(&self, a: &str, b: &str, ms: f64) {
        if !ms.is_finite() {
            warn!("Ignoring non-finite latency sample for {}-{}", a, b);
            return;
        }

        let key = self.link_key(a, b);
        let mut inner = self.inner.lock();
        let timestamp = Utc::now();

        let stats = inner.links.entry(key.clone()).or_default();
        stats.latency_history.push_back(LatencySample { timestamp, ms });
        Self::enforce_limit(&mut stats.latency_history, self.history_limit);

        let result = inner
            .records
            .as_mut()
            .map(|records| records.write_latency(&timestamp, &key, ms));
        Self::note_persist_result(&mut inner, result, "latency");
    }

    /// Consistent copy of every link
    pub fn snapshot(&self) -> BTreeMap<LinkKey, LinkStats> {
        self.inner.lock().links.clone()
    }

    /// Copy of a single link, if it has been seen
    pub fn link(&self, key: &LinkKey) -> Option<LinkStats> {
        self.inner.lock().links.get(key).cloned()
    }

    /// Number of links seen so far
    pub fn link_count(&self) -> usize {
        self.inner.lock().links.len()
    }

    /// Records that could not be written
    pub fn persist_errors(&self) -> u64 {
        self.inner.lock().persist_errors
    }

    /// Directory holding the record files, if persisting
    pub fn output_directory(&self) -> Option<PathBuf> {
        self.inner
            .lock()
            .records
            .as_ref()
            .map(|r| r.directory().to_path_buf())
    }

    fn enforce_limit<T>(history: &mut VecDeque<T>, limit: Option<usize>) {
        if let Some(limit) = limit {
            while history.len() > limit {
                history.pop_front();
            }
        }
    }

    fn note_persist_result(inner: &mut StoreInner, result: Option<AppResult<()>>, kind: &str) {
        if let Some(Err(e)) = result {
            inner.persist_errors += 1;
            error!("Failed to persist {} record: {}", kind, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::records::{BANDWIDTH_FILE, LATENCY_FILE, TRAFFIC_FILE};
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn accumulates_counters() {
        let store = LiveStatsStore::in_memory(false, None);
        assert!(store.update_counters("h1", "s1", 100, 50, 2, 1));
        assert!(store.update_counters("h1", "s1", 10, 5, 1, 1));

        let stats = store.link(&LinkKey::from("h1-s1")).unwrap();
        assert_eq!(
            (stats.bytes_sent, stats.bytes_recv, stats.packets_sent, stats.packets_recv),
            (110, 55, 3, 2)
        );
    }

    #[test]
    fn rejects_negative_deltas() {
        let store = LiveStatsStore::in_memory(false, None);
        store.update_counters("h1", "s1", 100, 100, 1, 1);
        assert!(!store.update_counters("h1", "s1", 10, -1, 1, 1));

        let stats = store.link(&LinkKey::from("h1-s1")).unwrap();
        assert_eq!(stats.bytes_sent, 100);

        // a rejected first update must not create the link
        assert!(!store.update_counters("h2", "s1", -5, 0, 0, 0));
        assert!(store.link(&LinkKey::from("h2-s1")).is_none());
    }

    #[test]
    fn link_order_is_kept_unless_canonical() {
        let store = LiveStatsStore::in_memory(false, None);
        store.update_counters("h1", "h2", 1, 0, 0, 0);
        store.update_counters("h2", "h1", 1, 0, 0, 0);
        assert_eq!(store.link_count(), 2);

        let store = LiveStatsStore::in_memory(true, None);
        store.update_counters("h1", "h2", 1, 0, 0, 0);
        store.update_counters("h2", "h1", 1, 0, 0, 0);
        assert_eq!(store.link_count(), 1);
        assert_eq!(store.link(&LinkKey::from("h1-h2")).unwrap().bytes_sent, 2);
    }

    #[test]
    fn histories_are_ordered_and_optionally_bounded() {
        let store = LiveStatsStore::in_memory(false, None);
        for i in 0..5 {
            store.record_bandwidth("h1", "h2", i as f64);
            store.record_latency("h1", "h2", 10.0 + i as f64);
        }
        let stats = store.link(&LinkKey::from("h1-h2")).unwrap();
        assert_eq!(stats.bandwidth_history.len(), 5);
        assert!(stats
            .bandwidth_history
            .iter()
            .zip(stats.bandwidth_history.iter().skip(1))
            .all(|(a, b)| a.timestamp <= b.timestamp));
        assert_eq!(stats.current_latency(), Some(14.0));

        let bounded = LiveStatsStore::in_memory(false, Some(2));
        for i in 0..5 {
            bounded.record_bandwidth("h1", "h2", i as f64);
        }
        let stats = bounded.link(&LinkKey::from("h1-h2")).unwrap();
        let kept: Vec<f64> = stats.bandwidth_history.iter().map(|s| s.mbps).collect();
        assert_eq!(kept, vec![3.0, 4.0]);
    }

    #[test]
    fn ignores_non_finite_samples() {
        let store = LiveStatsStore::in_memory(false, None);
        store.record_bandwidth("h1", "h2", f64::NAN);
        store.record_latency("h1", "h2", f64::INFINITY);
        assert!(store.snapshot().is_empty());
    }

    #[test]
    fn concurrent_updates_are_not_lost() {
        let store = Arc::new(LiveStatsStore::in_memory(false, None));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                thread::spawn(move || {
                    for _ in 0..1000 {
                        store.update_counters("h1", "s1", 3, 2, 1, 1);
                    }
                })
            })
            .collect();

        // reads interleave with writers and always see whole updates
        for _ in 0..100 {
            if let Some(stats) = store.link(&LinkKey::from("h1-s1")) {
                assert_eq!(stats.bytes_sent, stats.packets_sent * 3);
                assert_eq!(stats.bytes_recv, stats.packets_recv * 2);
            }
        }

        for handle in handles {
            handle.join().unwrap();
        }

        let stats = store.link(&LinkKey::from("h1-s1")).unwrap();
        assert_eq!(stats.bytes_sent, 8 * 1000 * 3);
        assert_eq!(stats.bytes_recv, 8 * 1000 * 2);
        assert_eq!(stats.packets_sent, 8 * 1000);
    }

    #[test]
    fn persists_records() {
        let dir = tempfile::tempdir().unwrap();
        let config = MonitorConfig {
            output_directory: dir.path().to_path_buf(),
            ..Default::default()
        };
        let store = LiveStatsStore::new(&config).unwrap();
        store.update_counters("h1", "s1", 1500, 60, 1, 1);
        store.update_counters("h1", "s1", -1, 0, 0, 0);
        store.record_bandwidth("h1", "h3", 9.42);
        store.record_latency("h1", "h3", 10.5);

        let count = |file: &str| {
            std::fs::read_to_string(dir.path().join(file))
                .unwrap()
                .lines()
                .count()
        };
        assert_eq!(count(TRAFFIC_FILE), 2);
        assert_eq!(count(BANDWIDTH_FILE), 2);
        assert_eq!(count(LATENCY_FILE), 2);
        assert_eq!(store.persist_errors(), 0);
        assert_eq!(store.output_directory().unwrap(), dir.path());
    }
}

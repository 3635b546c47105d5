use log::debug;
use std::collections::HashMap;

use crate::models::interface::{CounterDelta, InterfaceCounterSnapshot};

/// Per-interface deltas between successive counter snapshots.
///
/// Only the previous snapshot of each interface is kept. The tracker is owned
/// by the sampling task alone and needs no locking.
#[derive(Debug, Default)]
pub struct CounterDeltaTracker {
    previous: HashMap<String, InterfaceCounterSnapshot>,
}

impl CounterDeltaTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delta from the stored baseline to `current`, then make `current` the baseline.
    ///
    /// The first snapshot of an interface yields a zero delta. A component
    /// that went backwards (counter reset or wraparound) yields zero.
    pub fn delta(&mut self, interface: &str, current: InterfaceCounterSnapshot) -> CounterDelta {
        let delta = match self.previous.get(interface) {
            Some(prev) => {
                let delta = CounterDelta {
                    rx_bytes: current.rx_bytes.saturating_sub(prev.rx_bytes),
                    tx_bytes: current.tx_bytes.saturating_sub(prev.tx_bytes),
                    rx_packets: current.rx_packets.saturating_sub(prev.rx_packets),
                    tx_packets: current.tx_packets.saturating_sub(prev.tx_packets),
                };
                if current.rx_bytes < prev.rx_bytes
                    || current.tx_bytes < prev.tx_bytes
                    || current.rx_packets < prev.rx_packets
                    || current.tx_packets < prev.tx_packets
                {
                    debug!("Counters of {} went backwards, clamping delta", interface);
                }
                delta
            }
            None => {
                debug!("First counter snapshot for {}, storing baseline", interface);
                CounterDelta::default()
            }
        };

        self.previous.insert(interface.to_string(), current);
        delta
    }

    /// Drop the baseline of an interface; its next snapshot starts over
    pub fn forget(&mut self, interface: &str) {
        self.previous.remove(interface);
    }

    /// Whether a baseline is stored for the interface
    pub fn has_baseline(&self, interface: &str) -> bool {
        self.previous.contains_key(interface)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bytes(rx: u64, tx: u64) -> InterfaceCounterSnapshot {
        InterfaceCounterSnapshot::new(rx, tx, 0, 0)
    }

    #[test]
    fn first_observation_is_zero() {
        let mut tracker = CounterDeltaTracker::new();
        assert!(tracker.delta("eth0", bytes(100, 200)).is_zero());
        assert!(tracker.has_baseline("eth0"));
    }

    #[test]
    fn computes_difference() {
        let mut tracker = CounterDeltaTracker::new();
        tracker.delta("eth0", bytes(100, 200));
        let delta = tracker.delta("eth0", bytes(150, 250));
        assert_eq!((delta.rx_bytes, delta.tx_bytes), (50, 50));
    }

    #[test]
    fn reset_clamps_and_rebases() {
        let mut tracker = CounterDeltaTracker::new();
        tracker.delta("eth0", bytes(100, 200));
        tracker.delta("eth0", bytes(150, 250));

        let delta = tracker.delta("eth0", bytes(120, 240));
        assert_eq!((delta.rx_bytes, delta.tx_bytes), (0, 0));

        let delta = tracker.delta("eth0", bytes(130, 260));
        assert_eq!((delta.rx_bytes, delta.tx_bytes), (10, 20));
    }

    #[test]
    fn partial_reset_only_clamps_affected_components() {
        let mut tracker = CounterDeltaTracker::new();
        tracker.delta("eth0", InterfaceCounterSnapshot::new(1000, 1000, 10, 10));
        let delta = tracker.delta("eth0", InterfaceCounterSnapshot::new(5, 1100, 1, 12));
        assert_eq!(
            delta,
            CounterDelta {
                rx_bytes: 0,
                tx_bytes: 100,
                rx_packets: 0,
                tx_packets: 2
            }
        );
    }

    #[test]
    fn interfaces_are_independent() {
        let mut tracker = CounterDeltaTracker::new();
        tracker.delta("eth0", bytes(100, 100));
        assert!(tracker.delta("eth1", bytes(500, 500)).is_zero());
        assert_eq!(tracker.delta("eth0", bytes(110, 100)).rx_bytes, 10);
    }

    #[test]
    fn forget_restarts_baseline() {
        let mut tracker = CounterDeltaTracker::new();
        tracker.delta("eth0", bytes(100, 100));
        tracker.forget("eth0");
        assert!(!tracker.has_baseline("eth0"));
        assert!(tracker.delta("eth0", bytes(5000, 5000)).is_zero());
    }
}

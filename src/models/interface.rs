use serde::{Deserialize, Serialize};

/// Cumulative counters of one interface read at a point in time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceCounterSnapshot {
    pub rx_bytes: u64,
    pub tx_bytes: u64,
    pub rx_packets: u64,
    pub tx_packets: u64,
}

impl InterfaceCounterSnapshot {
    pub fn new(rx_bytes: u64, tx_bytes: u64, rx_packets: u64, tx_packets: u64) -> Self {
        Self {
            rx_bytes,
            tx_bytes,
            rx_packets,
            tx_packets,
        }
    }
}

/// Non-negative difference between two successive snapshots
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterDelta {
    pub rx_bytes: u64,
    pub tx_bytes: u64,
    pub rx_packets: u64,
    pub tx_packets: u64,
}

impl CounterDelta {
    pub fn is_zero(&self) -> bool {
        *self == CounterDelta::default()
    }
}

/// An interface whose counters are sampled, and the link it belongs to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitoredInterface {
    /// Interface name used to read counters (e.g. `h1-eth0`)
    pub name: String,

    /// Endpoint owning the interface; its tx counts as sent
    pub node: String,

    /// Endpoint on the other side of the link
    pub peer: String,
}

impl MonitoredInterface {
    /// Create an interface on `node`, linked to `peer`
    pub fn new(name: impl Into<String>, node: impl Into<String>, peer: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            node: node.into(),
            peer: peer.into(),
        }
    }

    /// Create an interface whose peer is only known by the interface name
    pub fn local(name: impl Into<String>, node: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            peer: name.clone(),
            name,
            node: node.into(),
        }
    }
}

/// A pair of endpoints measured with active probes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbePair {
    /// Endpoint issuing the probe
    pub source: String,

    /// Endpoint running the responder
    pub target: String,
}

impl ProbePair {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }
}

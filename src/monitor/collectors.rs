use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::models::interface::{InterfaceCounterSnapshot, MonitoredInterface, ProbePair};
use crate::utils::error::{AppError, AppResult};

/// Reads cumulative counters of a network interface
pub trait CounterReader: Send + Sync {
    fn read(&self, interface: &str) -> AppResult<InterfaceCounterSnapshot>;
}

/// Runs active measurements between two endpoints.
///
/// Every call may block for as long as the measurement takes; implementations
/// are expected to enforce their own timeouts.
pub trait ProbeRunner: Send + Sync {
    /// Start the passive side of a bandwidth probe on `target`
    fn start_responder(&self, target: &str) -> AppResult<()>;

    /// Stop the passive side started by `start_responder`
    fn stop_responder(&self, target: &str) -> AppResult<()>;

    /// Throughput from `source` to `target` in Mbps
    fn measure_bandwidth(&self, source: &str, target: &str, duration: Duration) -> AppResult<f64>;

    /// Round-trip time from `source` to `target` in ms
    fn measure_latency(&self, source: &str, target: &str) -> AppResult<f64>;
}

/// Supplies what is monitored during a session
pub trait Topology: Send + Sync {
    fn interfaces(&self) -> Vec<MonitoredInterface>;
    fn probe_pairs(&self) -> Vec<ProbePair>;
}

/// Counter reader backed by `/sys/class/net/<interface>/statistics`
pub struct SysfsCounterReader {
    root: PathBuf,
}

impl SysfsCounterReader {
    pub fn new() -> Self {
        Self::with_root(PathBuf::from("/sys/class/net"))
    }

    /// Read from a different directory laid out like `/sys/class/net`
    pub fn with_root(root: PathBuf) -> Self {
        Self { root }
    }

    fn read_counter(&self, interface: &str, counter: &str) -> AppResult<u64> {
        let path = self.root.join(interface).join("statistics").join(counter);
        let raw = fs::read_to_string(&path).map_err(|e| {
            AppError::CounterError(format!("cannot read {}: {}", path.display(), e))
        })?;
        raw.trim().parse::<u64>().map_err(|e| {
            AppError::CounterError(format!(
                "bad value '{}' in {}: {}",
                raw.trim(),
                path.display(),
                e
            ))
        })
    }
}

impl Default for SysfsCounterReader {
    fn default() -> Self {
        Self::new()
    }
}

impl CounterReader for SysfsCounterReader {
    fn read(&self, interface: &str) -> AppResult<InterfaceCounterSnapshot> {
        let snapshot = InterfaceCounterSnapshot {
            rx_bytes: self.read_counter(interface, "rx_bytes")?,
            tx_bytes: self.read_counter(interface, "tx_bytes")?,
            rx_packets: self.read_counter(interface, "rx_packets")?,
            tx_packets: self.read_counter(interface, "tx_packets")?,
        };
        debug!(
            "Interface {} stats - RX: {} bytes, {} packets, TX: {} bytes, {} packets",
            interface,
            snapshot.rx_bytes,
            snapshot.rx_packets,
            snapshot.tx_bytes,
            snapshot.tx_packets
        );
        Ok(snapshot)
    }
}

/// Probe runner for sessions without an active measurement backend
pub struct DisabledProbeRunner;

impl ProbeRunner for DisabledProbeRunner {
    fn start_responder(&self, _target: &str) -> AppResult<()> {
        Ok(())
    }

    fn stop_responder(&self, _target: &str) -> AppResult<()> {
        Ok(())
    }

    fn measure_bandwidth(&self, source: &str, target: &str, _duration: Duration) -> AppResult<f64> {
        Err(AppError::ProbeError(format!(
            "no probe backend configured for {} -> {}",
            source, target
        )))
    }

    fn measure_latency(&self, source: &str, target: &str) -> AppResult<f64> {
        Err(AppError::ProbeError(format!(
            "no probe backend configured for {} -> {}",
            source, target
        )))
    }
}

/// Fixed topology, built from the command line or a JSON file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StaticTopology {
    pub interfaces: Vec<MonitoredInterface>,

    #[serde(default)]
    pub probe_pairs: Vec<ProbePair>,
}

impl StaticTopology {
    pub fn new(interfaces: Vec<MonitoredInterface>, probe_pairs: Vec<ProbePair>) -> Self {
        Self {
            interfaces,
            probe_pairs,
        }
    }

    /// Load a topology file of the form
    /// `{"interfaces": [{"name", "node", "peer"}], "probe_pairs": [{"source", "target"}]}`
    pub fn from_file(path: &Path) -> AppResult<Self> {
        let raw = fs::read_to_string(path)?;
        let topology: StaticTopology = serde_json::from_str(&raw)?;
        info!(
            "Loaded topology from {}: {} interfaces, {} probe pairs",
            path.display(),
            topology.interfaces.len(),
            topology.probe_pairs.len()
        );
        Ok(topology)
    }

    /// Every up, non-loopback interface of this machine, attributed to `node`
    pub fn discover(node: &str) -> Self {
        let interfaces: Vec<MonitoredInterface> = pnet_datalink::interfaces()
            .into_iter()
            .filter(|iface| iface.is_up() && !iface.is_loopback())
            .map(|iface| MonitoredInterface::local(iface.name, node))
            .collect();

        info!("Discovered {} monitorable interfaces", interfaces.len());
        Self::new(interfaces, Vec::new())
    }

    /// Build a topology from command line values.
    ///
    /// Each interface is either `name`, attributed to `node` with the interface
    /// name as its peer, or `name:node:peer`. Without interfaces the local ones
    /// are discovered. Probe pairs come from `probe_hosts`, see
    /// [`StaticTopology::alternating_pairs`].
    pub fn from_args(interfaces: &[String], node: &str, probe_hosts: &[String]) -> AppResult<Self> {
        let mut topology = if interfaces.is_empty() {
            Self::discover(node)
        } else {
            let parsed = interfaces
                .iter()
                .map(|arg| parse_interface(arg, node))
                .collect::<AppResult<Vec<_>>>()?;
            Self::new(parsed, Vec::new())
        };
        topology.probe_pairs = Self::alternating_pairs(probe_hosts);
        Ok(topology)
    }

    /// Pair every even-indexed endpoint with every odd-indexed one
    pub fn alternating_pairs(endpoints: &[String]) -> Vec<ProbePair> {
        let sources = endpoints.iter().step_by(2);
        let mut pairs = Vec::new();
        for source in sources {
            for target in endpoints.iter().skip(1).step_by(2) {
                if source != target {
                    pairs.push(ProbePair::new(source.clone(), target.clone()));
                }
            }
        }
        pairs
    }

    /// A session needs at least one interface, each with a name and endpoints
    pub fn validate(&self) -> AppResult<()> {
        if self.interfaces.is_empty() {
            return Err(AppError::ConfigError(
                "no interfaces to monitor".to_string(),
            ));
        }
        if let Some(bad) = self
            .interfaces
            .iter()
            .find(|i| i.name.is_empty() || i.node.is_empty() || i.peer.is_empty())
        {
            return Err(AppError::ConfigError(format!(
                "interface entry {:?} needs a name, node and peer",
                bad
            )));
        }
        if let Some(bad) = self
            .probe_pairs
            .iter()
            .find(|p| p.source.is_empty() || p.target.is_empty() || p.source == p.target)
        {
            return Err(AppError::ConfigError(format!(
                "probe pair {:?} needs two distinct endpoints",
                bad
            )));
        }
        Ok(())
    }
}

fn parse_interface(arg: &str, default_node: &str) -> AppResult<MonitoredInterface> {
    let parts: Vec<&str> = arg.split(':').collect();
    match parts.as_slice() {
        [name] if !name.is_empty() => Ok(MonitoredInterface::local(*name, default_node)),
        [name, node, peer] if !name.is_empty() && !node.is_empty() && !peer.is_empty() => {
            Ok(MonitoredInterface::new(*name, *node, *peer))
        }
        _ => Err(AppError::ConfigError(format!(
            "interface '{}' must be NAME or NAME:NODE:PEER",
            arg
        ))),
    }
}

impl Topology for StaticTopology {
    fn interfaces(&self) -> Vec<MonitoredInterface> {
        self.interfaces.clone()
    }

    fn probe_pairs(&self) -> Vec<ProbePair> {
        self.probe_pairs.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_counters(root: &Path, iface: &str, values: [u64; 4]) {
        let dir = root.join(iface).join("statistics");
        fs::create_dir_all(&dir).unwrap();
        let names = ["rx_bytes", "tx_bytes", "rx_packets", "tx_packets"];
        for (name, value) in names.iter().zip(values) {
            fs::write(dir.join(name), format!("{}\n", value)).unwrap();
        }
    }

    #[test]
    fn reads_sysfs_counters() {
        let root = tempfile::tempdir().unwrap();
        write_counters(root.path(), "h1-eth0", [1000, 2000, 10, 20]);

        let reader = SysfsCounterReader::with_root(root.path().to_path_buf());
        let snapshot = reader.read("h1-eth0").unwrap();
        assert_eq!(snapshot, InterfaceCounterSnapshot::new(1000, 2000, 10, 20));
    }

    #[test]
    fn missing_interface_is_a_counter_error() {
        let root = tempfile::tempdir().unwrap();
        let reader = SysfsCounterReader::with_root(root.path().to_path_buf());
        assert!(matches!(reader.read("gone0"), Err(AppError::CounterError(_))));
    }

    #[test]
    fn garbage_counter_is_a_counter_error() {
        let root = tempfile::tempdir().unwrap();
        write_counters(root.path(), "eth0", [1, 2, 3, 4]);
        fs::write(root.path().join("eth0/statistics/tx_bytes"), "n/a").unwrap();

        let reader = SysfsCounterReader::with_root(root.path().to_path_buf());
        assert!(matches!(reader.read("eth0"), Err(AppError::CounterError(_))));
    }

    #[test]
    fn alternating_pairs_sample_a_subset() {
        let hosts: Vec<String> = ["h1", "h2", "h3", "h4", "h5"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let pairs = StaticTopology::alternating_pairs(&hosts);
        let rendered: Vec<String> = pairs
            .iter()
            .map(|p| format!("{}>{}", p.source, p.target))
            .collect();
        assert_eq!(rendered, vec!["h1>h2", "h1>h4", "h3>h2", "h3>h4", "h5>h2", "h5>h4"]);
    }

    #[test]
    fn builds_topology_from_args() {
        let interfaces = vec!["eth0".to_string(), "h1-eth0:h1:s1".to_string()];
        let hosts = vec!["h1".to_string(), "h2".to_string()];
        let topology = StaticTopology::from_args(&interfaces, "box", &hosts).unwrap();

        assert_eq!(
            topology.interfaces(),
            vec![
                MonitoredInterface::new("eth0", "box", "eth0"),
                MonitoredInterface::new("h1-eth0", "h1", "s1"),
            ]
        );
        assert_eq!(topology.probe_pairs(), vec![ProbePair::new("h1", "h2")]);

        let bad = vec!["eth0:h1".to_string()];
        assert!(matches!(
            StaticTopology::from_args(&bad, "box", &[]),
            Err(AppError::ConfigError(_))
        ));
    }

    #[test]
    fn loads_topology_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("topo.json");
        fs::write(
            &path,
            r#"{"interfaces": [{"name": "h1-eth0", "node": "h1", "peer": "s1"}],
                "probe_pairs": [{"source": "h1", "target": "h2"}]}"#,
        )
        .unwrap();

        let topology = StaticTopology::from_file(&path).unwrap();
        assert_eq!(topology.interfaces(), vec![MonitoredInterface::new("h1-eth0", "h1", "s1")]);
        assert_eq!(topology.probe_pairs(), vec![ProbePair::new("h1", "h2")]);
        assert!(topology.validate().is_ok());
    }

    #[test]
    fn empty_topology_is_a_config_error() {
        let topology = StaticTopology::default();
        assert!(matches!(topology.validate(), Err(AppError::ConfigError(_))));

        let topology = StaticTopology::new(
            vec![MonitoredInterface::new("eth0", "h1", "s1")],
            vec![ProbePair::new("h1", "h1")],
        );
        assert!(topology.validate().is_err());
    }

    #[test]
    fn disabled_probes_fail_measurements() {
        let runner = DisabledProbeRunner;
        assert!(runner.start_responder("h2").is_ok());
        assert!(runner.measure_bandwidth("h1", "h2", Duration::from_secs(1)).is_err());
        assert!(runner.measure_latency("h1", "h2").is_err());
    }
}

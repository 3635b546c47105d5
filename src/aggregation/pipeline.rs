use log::{debug, info, warn};
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::aggregation::window::WindowAggregator;
use crate::capture::classifier::classify;
use crate::models::config::{AnalyzerConfig, Metric};
use crate::models::packet::{PacketDescriptor, ProtocolCategory};
use crate::utils::error::{AppError, AppResult};

/// Packets between two progress messages
const PROGRESS_EVERY: usize = 10_000;

/// Outcome of feeding packets through the pipeline
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProcessSummary {
    /// Packets classified and accumulated
    pub processed: usize,

    /// Packets dropped because they could not be read or had no usable timestamp
    pub skipped: usize,
}

impl std::ops::AddAssign for ProcessSummary {
    fn add_assign(&mut self, other: Self) {
        self.processed += other.processed;
        self.skipped += other.skipped;
    }
}

/// One exported window: a label plus a rate for every category
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BandwidthRow {
    /// Window start in seconds since the epoch
    pub window_start: f64,

    /// `YYYY-MM-DD HH:MM:SS` label of the window start
    pub timestamp: String,

    /// Per-second rates in `ProtocolCategory::ALL` order
    pub rates: [f64; 6],
}

impl BandwidthRow {
    pub fn rate(&self, category: ProtocolCategory) -> f64 {
        let idx = ProtocolCategory::ALL
            .iter()
            .position(|c| *c == category)
            .unwrap_or(ProtocolCategory::ALL.len() - 1);
        self.rates[idx]
    }
}

/// Classifies packets and accumulates them into time windows.
///
/// A single pipeline may be fed from several captures in turn; totals keep
/// accumulating until the pipeline is dropped.
pub struct PacketStatsPipeline {
    aggregator: WindowAggregator,
    metric: Metric,
    summary: ProcessSummary,
}

impl PacketStatsPipeline {
    /// Create a pipeline with the given window width and unit
    pub fn new(interval: f64, metric: Metric) -> AppResult<Self> {
        info!(
            "Initializing bandwidth analysis with {} second intervals ({:?})",
            interval, metric
        );
        Ok(Self {
            aggregator: WindowAggregator::new(interval)?,
            metric,
            summary: ProcessSummary::default(),
        })
    }

    /// Create a pipeline from the analyzer configuration
    pub fn from_config(config: &AnalyzerConfig) -> AppResult<Self> {
        config.validate()?;
        Self::new(config.interval, config.metric)
    }

    /// Consume one packet sequence.
    ///
    /// Failed items are logged and skipped; the rest of the sequence is still
    /// processed. Returns the counts for this call only.
    pub fn process<I>(&mut self, packets: I) -> ProcessSummary
    where
        I: IntoIterator<Item = AppResult<PacketDescriptor>>,
    {
        let mut summary = ProcessSummary::default();

        for (i, packet) in packets.into_iter().enumerate() {
            if i > 0 && i % PROGRESS_EVERY == 0 {
                info!("Processed {} packets...", i);
            }

            let result = packet.and_then(|p| self.process_packet(&p));
            match result {
                Ok(_) => summary.processed += 1,
                Err(e) => {
                    warn!("Error processing packet {}: {}", i, e);
                    summary.skipped += 1;
                }
            }
        }

        info!(
            "Finished processing {} packets ({} skipped)",
            summary.processed, summary.skipped
        );
        self.summary += summary;
        summary
    }

    /// Classify one packet and add it to its window
    pub fn process_packet(&mut self, packet: &PacketDescriptor) -> AppResult<ProtocolCategory> {
        if !packet.timestamp.is_finite() || packet.timestamp < 0.0 {
            return Err(AppError::PacketParsingError(format!(
                "invalid timestamp {}",
                packet.timestamp
            )));
        }

        let key = self.aggregator.window_key(packet.timestamp);
        let category = classify(packet);
        let weight = match self.metric {
            Metric::Bits => packet.size_bytes as u64 * 8,
            Metric::Packets => 1,
        };
        self.aggregator.add(key, category, weight);

        debug!(
            "Packet at {:.6} ({} bytes) -> {} in window {}",
            packet.timestamp, packet.size_bytes, category, key
        );
        Ok(category)
    }

    pub fn aggregator(&self) -> &WindowAggregator {
        &self.aggregator
    }

    pub fn metric(&self) -> Metric {
        self.metric
    }

    /// Counts accumulated over every `process` call
    pub fn summary(&self) -> ProcessSummary {
        self.summary
    }

    /// Rows for every non-empty window, ascending, zero-filled per category
    pub fn export(&self) -> Vec<BandwidthRow> {
        let interval = self.aggregator.interval();
        self.aggregator
            .buckets()
            .map(|bucket| {
                let mut rates = [0.0; 6];
                for (rate, category) in rates.iter_mut().zip(ProtocolCategory::ALL) {
                    *rate = bucket.total(category) as f64 / interval;
                }
                BandwidthRow {
                    window_start: bucket.window_start,
                    timestamp: bucket.label.clone(),
                    rates,
                }
            })
            .collect()
    }

    /// Column names of the exported table
    pub fn header(&self) -> Vec<String> {
        let suffix = self.metric.column_suffix();
        std::iter::once("Timestamp".to_string())
            .chain(
                ProtocolCategory::ALL
                    .iter()
                    .map(|c| format!("{}_{}", c.as_str(), suffix)),
            )
            .collect()
    }

    /// Write the exported table as CSV, returning the number of data rows
    pub fn write_csv<W: Write>(&self, writer: W) -> AppResult<usize> {
        let mut csv = csv::Writer::from_writer(writer);
        csv.write_record(self.header())?;

        let rows = self.export();
        for row in &rows {
            let mut record = Vec::with_capacity(1 + row.rates.len());
            record.push(row.timestamp.clone());
            record.extend(row.rates.iter().map(|r| r.to_string()));
            csv.write_record(&record)?;
        }
        csv.flush()?;

        Ok(rows.len())
    }

    /// Write the exported table to a file
    pub fn save(&self, path: &Path) -> AppResult<usize> {
        info!("Saving results to {}", path.display());
        let file = File::create(path)?;
        self.write_csv(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::parser::tests::{tcp_frame, udp_frame};
    use crate::capture::source::{tests::pcap_bytes, PcapFileSource};
    use crate::models::packet::HeaderSet;
    use std::io::Cursor;

    fn tcp(ts: f64, size: usize) -> AppResult<PacketDescriptor> {
        let headers = HeaderSet {
            ipv4: true,
            tcp: true,
            ..Default::default()
        };
        Ok(PacketDescriptor::new(ts, size, headers))
    }

    fn udp(ts: f64, size: usize) -> AppResult<PacketDescriptor> {
        let headers = HeaderSet {
            ipv4: true,
            udp: true,
            ..Default::default()
        };
        Ok(PacketDescriptor::new(ts, size, headers))
    }

    #[test]
    fn three_packets_two_windows() {
        let mut pipeline = PacketStatsPipeline::new(0.1, Metric::Bits).unwrap();
        let summary = pipeline.process(vec![tcp(0.02, 100), tcp(0.05, 200), udp(0.15, 50)]);
        assert_eq!(summary, ProcessSummary { processed: 3, skipped: 0 });

        let rows = pipeline.export();
        assert_eq!(rows.len(), 2);

        assert_eq!(rows[0].window_start, 0.0);
        assert!((rows[0].rate(ProtocolCategory::Tcp) - 24000.0).abs() < 1e-6);
        assert!((rows[1].window_start - 0.1).abs() < 1e-12);
        assert!((rows[1].rate(ProtocolCategory::Udp) - 4000.0).abs() < 1e-6);

        for category in [
            ProtocolCategory::Icmp,
            ProtocolCategory::Icmpv6,
            ProtocolCategory::Arp,
            ProtocolCategory::Other,
        ] {
            assert_eq!(rows[0].rate(category), 0.0);
            assert_eq!(rows[1].rate(category), 0.0);
        }
        assert_eq!(rows[0].rate(ProtocolCategory::Udp), 0.0);
        assert_eq!(rows[1].rate(ProtocolCategory::Tcp), 0.0);
    }

    #[test]
    fn bits_are_conserved() {
        let mut pipeline = PacketStatsPipeline::new(0.1, Metric::Bits).unwrap();
        let sizes = [60usize, 1514, 42, 98, 1200, 64];
        let packets: Vec<_> = sizes
            .iter()
            .enumerate()
            .map(|(i, size)| {
                let headers = match i % 3 {
                    0 => HeaderSet { tcp: true, ..Default::default() },
                    1 => HeaderSet { arp: true, ..Default::default() },
                    _ => HeaderSet::default(),
                };
                Ok(PacketDescriptor::new(i as f64 * 0.37, *size, headers))
            })
            .collect();
        pipeline.process(packets);

        let accumulated: u64 = ProtocolCategory::ALL
            .iter()
            .map(|c| pipeline.aggregator().total(*c))
            .sum();
        let expected: u64 = sizes.iter().map(|s| *s as u64 * 8).sum();
        assert_eq!(accumulated, expected);
    }

    #[test]
    fn failed_packets_are_skipped_without_aborting() {
        let mut pipeline = PacketStatsPipeline::new(1.0, Metric::Bits).unwrap();
        let packets = vec![
            tcp(1.0, 10),
            Err(AppError::PacketParsingError("unreadable record".to_string())),
            tcp(f64::NAN, 10),
            udp(1.5, 10),
        ];
        let summary = pipeline.process(packets);

        assert_eq!(summary, ProcessSummary { processed: 2, skipped: 2 });
        assert_eq!(pipeline.aggregator().total(ProtocolCategory::Tcp), 80);
        assert_eq!(pipeline.aggregator().total(ProtocolCategory::Udp), 80);
    }

    #[test]
    fn statistics_accumulate_across_files() {
        let mut pipeline = PacketStatsPipeline::new(1.0, Metric::Bits).unwrap();
        pipeline.process(vec![tcp(5.5, 100)]);
        // second file starts earlier than the first one ended
        pipeline.process(vec![tcp(2.0, 100), tcp(5.9, 100)]);

        let rows = pipeline.export();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].window_start, 2.0);
        assert_eq!(rows[1].window_start, 5.0);
        assert_eq!(rows[1].rate(ProtocolCategory::Tcp), 1600.0);
        assert_eq!(pipeline.summary().processed, 3);
    }

    #[test]
    fn packet_metric_counts_packets() {
        let mut pipeline = PacketStatsPipeline::new(0.5, Metric::Packets).unwrap();
        pipeline.process(vec![tcp(0.1, 1500), tcp(0.2, 60), udp(0.3, 60)]);

        let rows = pipeline.export();
        assert_eq!(rows[0].rate(ProtocolCategory::Tcp), 4.0);
        assert_eq!(rows[0].rate(ProtocolCategory::Udp), 2.0);
        assert_eq!(pipeline.header()[1], "TCP_pps");
    }

    #[test]
    fn writes_bandwidth_table() {
        let mut pipeline = PacketStatsPipeline::new(0.1, Metric::Bits).unwrap();
        pipeline.process(vec![tcp(0.02, 100), tcp(0.05, 200), udp(0.15, 50)]);

        let mut out = Vec::new();
        let rows = pipeline.write_csv(&mut out).unwrap();
        assert_eq!(rows, 2);

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Timestamp,TCP_bps,UDP_bps,ICMP_bps,ICMPv6_bps,ARP_bps,Other_bps");
        assert!(lines[1].ends_with(",24000,0,0,0,0,0"));
        assert!(lines[2].ends_with(",0,4000,0,0,0,0"));
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn processes_capture_source() {
        let bytes = pcap_bytes(&[
            (100.01, tcp_frame()),
            (100.02, udp_frame()),
            (100.31, tcp_frame()),
        ]);
        let source = PcapFileSource::from_reader(Cursor::new(bytes), "mem".to_string()).unwrap();

        let mut pipeline = PacketStatsPipeline::new(0.1, Metric::Bits).unwrap();
        let summary = pipeline.process(source);
        assert_eq!(summary.processed, 3);
        assert_eq!(pipeline.export().len(), 2);
        assert_eq!(
            pipeline.aggregator().total(ProtocolCategory::Tcp),
            2 * tcp_frame().len() as u64 * 8
        );
    }
}

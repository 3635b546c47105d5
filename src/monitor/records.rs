use chrono::{DateTime, Utc};
use csv::{Writer, WriterBuilder};
use log::info;
use serde::Serialize;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use crate::models::stats::LinkKey;
use crate::utils::error::AppResult;
use crate::utils::time::iso_timestamp;

pub const TRAFFIC_FILE: &str = "traffic_stats.csv";
pub const BANDWIDTH_FILE: &str = "bandwidth.csv";
pub const LATENCY_FILE: &str = "latency.csv";

const TRAFFIC_HEADER: [&str; 6] = [
    "timestamp",
    "link",
    "bytes_sent",
    "bytes_recv",
    "packets_sent",
    "packets_recv",
];
const BANDWIDTH_HEADER: [&str; 3] = ["timestamp", "link", "bandwidth_mbps"];
const LATENCY_HEADER: [&str; 3] = ["timestamp", "link", "latency_ms"];

#[derive(Serialize)]
struct TrafficRecord<'a> {
    timestamp: String,
    link: &'a str,
    bytes_sent: u64,
    bytes_recv: u64,
    packets_sent: u64,
    packets_recv: u64,
}

#[derive(Serialize)]
struct SampleRecord<'a> {
    timestamp: String,
    link: &'a str,
    value: f64,
}

/// Append-only CSV files for traffic, bandwidth and latency records.
///
/// Creating a writer truncates the three files and writes their header rows,
/// so every session starts with fresh files. Each record is flushed as soon
/// as it is written.
pub struct RecordWriter {
    directory: PathBuf,
    traffic: Writer<File>,
    bandwidth: Writer<File>,
    latency: Writer<File>,
}

impl RecordWriter {
    pub fn create(directory: &Path) -> AppResult<Self> {
        fs::create_dir_all(directory)?;

        let writer = Self {
            directory: directory.to_path_buf(),
            traffic: open_with_header(&directory.join(TRAFFIC_FILE), &TRAFFIC_HEADER)?,
            bandwidth: open_with_header(&directory.join(BANDWIDTH_FILE), &BANDWIDTH_HEADER)?,
            latency: open_with_header(&directory.join(LATENCY_FILE), &LATENCY_HEADER)?,
        };

        info!("Writing network statistics to {}", directory.display());
        Ok(writer)
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Record per-interval counter deltas of a link
    pub fn write_traffic(
        &mut self,
        timestamp: &DateTime<Utc>,
        link: &LinkKey,
        bytes_sent: u64,
        bytes_recv: u64,
        packets_sent: u64,
        packets_recv: u64,
    ) -> AppResult<()> {
        self.traffic.serialize(TrafficRecord {
            timestamp: iso_timestamp(timestamp),
            link: link.as_str(),
            bytes_sent,
            bytes_recv,
            packets_sent,
            packets_recv,
        })?;
        self.traffic.flush()?;
        Ok(())
    }

    pub fn write_bandwidth(
        &mut self,
        timestamp: &DateTime<Utc>,
        link: &LinkKey,
        mbps: f64,
    ) -> AppResult<()> {
        write_sample(&mut self.bandwidth, timestamp, link, mbps)
    }

    pub fn write_latency(
        &mut self,
        timestamp: &DateTime<Utc>,
        link: &LinkKey,
        ms: f64,
    ) -> AppResult<()> {
        write_sample(&mut self.latency, timestamp, link, ms)
    }
}

fn open_with_header(path: &Path, header: &[&str]) -> AppResult<Writer<File>> {
    let mut writer = WriterBuilder::new().has_headers(false).from_path(path)?;
    writer.write_record(header)?;
    writer.flush()?;
    Ok(writer)
}

fn write_sample(
    writer: &mut Writer<File>,
    timestamp: &DateTime<Utc>,
    link: &LinkKey,
    value: f64,
) -> AppResult<()> {
    writer.serialize(SampleRecord {
        timestamp: iso_timestamp(timestamp),
        link: link.as_str(),
        value,
    })?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_lines(path: &Path) -> Vec<String> {
        fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|l| l.to_string())
            .collect()
    }

    #[test]
    fn creates_files_with_headers() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("stats");
        RecordWriter::create(&out).unwrap();

        assert_eq!(
            read_lines(&out.join(TRAFFIC_FILE)),
            vec!["timestamp,link,bytes_sent,bytes_recv,packets_sent,packets_recv"]
        );
        assert_eq!(read_lines(&out.join(BANDWIDTH_FILE)), vec!["timestamp,link,bandwidth_mbps"]);
        assert_eq!(read_lines(&out.join(LATENCY_FILE)), vec!["timestamp,link,latency_ms"]);
    }

    #[test]
    fn appends_rows() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = RecordWriter::create(dir.path()).unwrap();
        let now = Utc::now();
        let link = LinkKey::from_pair("h1", "s1", false);

        writer.write_traffic(&now, &link, 10, 20, 1, 2).unwrap();
        writer.write_bandwidth(&now, &link, 9.5).unwrap();
        writer.write_latency(&now, &link, 10.25).unwrap();

        let traffic = read_lines(&dir.path().join(TRAFFIC_FILE));
        assert_eq!(traffic.len(), 2);
        assert!(traffic[1].ends_with(",h1-s1,10,20,1,2"));
        assert!(read_lines(&dir.path().join(BANDWIDTH_FILE))[1].ends_with(",h1-s1,9.5"));
        assert!(read_lines(&dir.path().join(LATENCY_FILE))[1].ends_with(",h1-s1,10.25"));
    }

    #[test]
    fn recreating_truncates_previous_session() {
        let dir = tempfile::tempdir().unwrap();
        let link = LinkKey::from("h1-h2");
        {
            let mut writer = RecordWriter::create(dir.path()).unwrap();
            writer.write_bandwidth(&Utc::now(), &link, 1.0).unwrap();
        }
        RecordWriter::create(dir.path()).unwrap();
        assert_eq!(read_lines(&dir.path().join(BANDWIDTH_FILE)).len(), 1);
    }
}

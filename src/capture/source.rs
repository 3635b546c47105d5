use log::{debug, error, info, warn};
use pcap_file::pcap::PcapReader;
use pcap_file::DataLink;
use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use crate::capture::parser::{LinkLayer, PacketParser};
use crate::models::packet::PacketDescriptor;
use crate::utils::error::{AppError, AppResult};

/// Read errors in a row after which the rest of a file is abandoned
const MAX_CONSECUTIVE_ERRORS: usize = 5;

/// Packet source over one classic libpcap capture file.
///
/// Yields one item per record. A record that cannot be read is yielded as an
/// error and iteration continues with the next one, unless the file keeps
/// failing, in which case the remainder of the file is skipped.
pub struct PcapFileSource<R: Read> {
    reader: PcapReader<R>,
    link: LinkLayer,
    parser: PacketParser,
    name: String,
    consecutive_errors: usize,
    finished: bool,
}

impl PcapFileSource<BufReader<File>> {
    /// Open a capture file from disk
    pub fn open(path: &Path) -> AppResult<Self> {
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file), path.display().to_string())
    }
}

impl<R: Read> PcapFileSource<R> {
    /// Wrap any reader producing pcap data
    pub fn from_reader(reader: R, name: String) -> AppResult<Self> {
        let reader = PcapReader::new(reader)?;
        let datalink = reader.header().datalink;
        let link = link_layer(datalink).ok_or_else(|| {
            AppError::PacketParsingError(format!(
                "{}: unsupported link type {:?}",
                name, datalink
            ))
        })?;

        info!("Opened capture {} (link type {:?})", name, datalink);

        Ok(Self {
            reader,
            link,
            parser: PacketParser::new(),
            name,
            consecutive_errors: 0,
            finished: false,
        })
    }

    /// Name used in log messages
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<R: Read> Iterator for PcapFileSource<R> {
    type Item = AppResult<PacketDescriptor>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        match self.reader.next_packet() {
            Some(Ok(packet)) => {
                self.consecutive_errors = 0;
                let timestamp = packet.timestamp.as_secs_f64();
                Some(Ok(self.parser.parse_packet(&packet.data, self.link, timestamp)))
            }
            Some(Err(e)) => {
                self.consecutive_errors += 1;
                if self.consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
                    error!(
                        "Too many consecutive read errors ({}) in {}, skipping rest of file",
                        self.consecutive_errors, self.name
                    );
                    self.finished = true;
                }
                Some(Err(AppError::PcapError(e)))
            }
            None => {
                debug!("Reached end of capture {}", self.name);
                self.finished = true;
                None
            }
        }
    }
}

/// Map a capture link type onto the framings the parser understands
fn link_layer(datalink: DataLink) -> Option<LinkLayer> {
    match datalink {
        DataLink::ETHERNET => Some(LinkLayer::Ethernet),
        DataLink::RAW => Some(LinkLayer::RawIp),
        DataLink::IPV4 => Some(LinkLayer::Ipv4),
        DataLink::IPV6 => Some(LinkLayer::Ipv6),
        DataLink::LINUX_SLL => Some(LinkLayer::LinuxSll),
        _ => None,
    }
}

/// List the `.pcap` files of a directory, sorted by file name
pub fn discover_captures(dir: &Path) -> AppResult<Vec<PathBuf>> {
    let mut captures = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Failed to read entry in {}: {}", dir.display(), e);
                continue;
            }
        };
        let path = entry.path();
        if path.is_file() && path.extension().map_or(false, |ext| ext == "pcap") {
            captures.push(path);
        }
    }
    captures.sort();

    info!("Found {} capture files in {}", captures.len(), dir.display());
    Ok(captures)
}

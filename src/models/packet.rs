use serde::{Deserialize, Serialize};
use std::fmt;

/// Headers found while decoding a packet.
///
/// Several flags can be set at once, e.g. `ipv4` and `tcp` for an ordinary
/// TCP segment. The classifier resolves the set to a single category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderSet {
    pub ipv4: bool,
    pub ipv6: bool,
    pub tcp: bool,
    pub udp: bool,
    pub icmp: bool,
    /// ICMPv6 echo request or echo reply
    pub icmpv6_echo: bool,
    /// ICMPv6 neighbour solicitation or advertisement
    pub icmpv6_nd: bool,
    pub arp: bool,
}

impl HeaderSet {
    /// True if no header beyond the link layer was recognised
    pub fn is_empty(&self) -> bool {
        *self == HeaderSet::default()
    }
}

/// One observed packet, as handed to the offline pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PacketDescriptor {
    /// Capture time in seconds since the UNIX epoch
    pub timestamp: f64,

    /// Captured length of the packet in bytes
    pub size_bytes: usize,

    /// Headers present in the packet
    pub headers: HeaderSet,
}

impl PacketDescriptor {
    pub fn new(timestamp: f64, size_bytes: usize, headers: HeaderSet) -> Self {
        Self {
            timestamp,
            size_bytes,
            headers,
        }
    }
}

/// Mutually exclusive protocol classes used for bandwidth accounting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ProtocolCategory {
    #[serde(rename = "TCP")]
    Tcp,
    #[serde(rename = "UDP")]
    Udp,
    #[serde(rename = "ICMP")]
    Icmp,
    #[serde(rename = "ICMPv6")]
    Icmpv6,
    #[serde(rename = "ARP")]
    Arp,
    Other,
}

impl ProtocolCategory {
    /// Every category, in export column order
    pub const ALL: [ProtocolCategory; 6] = [
        ProtocolCategory::Tcp,
        ProtocolCategory::Udp,
        ProtocolCategory::Icmp,
        ProtocolCategory::Icmpv6,
        ProtocolCategory::Arp,
        ProtocolCategory::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProtocolCategory::Tcp => "TCP",
            ProtocolCategory::Udp => "UDP",
            ProtocolCategory::Icmp => "ICMP",
            ProtocolCategory::Icmpv6 => "ICMPv6",
            ProtocolCategory::Arp => "ARP",
            ProtocolCategory::Other => "Other",
        }
    }
}

impl fmt::Display for ProtocolCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

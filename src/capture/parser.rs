use log::{log_enabled, trace, Level};
use pnet::packet::{
    arp::ArpPacket,
    ethernet::{EtherType, EtherTypes, EthernetPacket},
    icmp::IcmpPacket,
    icmpv6::{Icmpv6Packet, Icmpv6Types},
    ip::{IpNextHeaderProtocol, IpNextHeaderProtocols},
    ipv4::Ipv4Packet,
    ipv6::Ipv6Packet,
    tcp::TcpPacket,
    udp::UdpPacket,
    vlan::VlanPacket,
    Packet as PnetPacket,
};

use crate::models::packet::{HeaderSet, PacketDescriptor};

/// Length of a Linux cooked capture (SLL) header
const LINUX_SLL_HEADER_LEN: usize = 16;

/// Upper bound on stacked VLAN tags and IPv6 extension headers we walk
const MAX_NESTED_HEADERS: usize = 8;

/// Framing of the captured bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkLayer {
    /// Ethernet II, optionally with 802.1Q tags
    Ethernet,
    /// Bare IP datagram, version taken from the first nibble
    RawIp,
    /// Bare IPv4 datagram
    Ipv4,
    /// Bare IPv6 datagram
    Ipv6,
    /// Linux cooked capture, as written by `tcpdump -i any`
    LinuxSll,
}

/// Decodes captured frames into packet descriptors.
///
/// Decoding never fails: whatever headers could be read are recorded and a
/// frame that cannot be read at all yields an empty header set, which the
/// classifier maps to `Other`.
pub struct PacketParser {}

impl PacketParser {
    /// Create a new packet parser
    pub fn new() -> Self {
        Self {}
    }

    /// Decode one captured frame
    pub fn parse_packet(&self, data: &[u8], link: LinkLayer, timestamp: f64) -> PacketDescriptor {
        let mut headers = HeaderSet::default();

        match link {
            LinkLayer::Ethernet => self.parse_ethernet(data, &mut headers),
            LinkLayer::RawIp => match data.first().map(|b| b >> 4) {
                Some(4) => self.parse_ipv4(data, &mut headers),
                Some(6) => self.parse_ipv6(data, &mut headers),
                _ => {}
            },
            LinkLayer::Ipv4 => self.parse_ipv4(data, &mut headers),
            LinkLayer::Ipv6 => self.parse_ipv6(data, &mut headers),
            LinkLayer::LinuxSll => {
                if data.len() >= LINUX_SLL_HEADER_LEN {
                    let ethertype = EtherType(u16::from_be_bytes([data[14], data[15]]));
                    self.parse_ethertype(ethertype, &data[LINUX_SLL_HEADER_LEN..], &mut headers, 0);
                }
            }
        }

        if log_enabled!(Level::Trace) {
            trace!("Decoded {} byte frame at {:.6}: {:?}", data.len(), timestamp, headers);
        }

        PacketDescriptor::new(timestamp, data.len(), headers)
    }

    fn parse_ethernet(&self, data: &[u8], headers: &mut HeaderSet) {
        if let Some(eth_packet) = EthernetPacket::new(data) {
            self.parse_ethertype(eth_packet.get_ethertype(), eth_packet.payload(), headers, 0);
        }
    }

    /// Dispatch on an EtherType, unwrapping 802.1Q tags
    fn parse_ethertype(
        &self,
        ethertype: EtherType,
        data: &[u8],
        headers: &mut HeaderSet,
        depth: usize,
    ) {
        match ethertype {
            EtherTypes::Ipv4 => self.parse_ipv4(data, headers),
            EtherTypes::Ipv6 => self.parse_ipv6(data, headers),
            EtherTypes::Arp => {
                if ArpPacket::new(data).is_some() {
                    headers.arp = true;
                }
            }
            EtherTypes::Vlan | EtherTypes::QinQ if depth < MAX_NESTED_HEADERS => {
                if let Some(vlan) = VlanPacket::new(data) {
                    self.parse_ethertype(vlan.get_ethertype(), vlan.payload(), headers, depth + 1);
                }
            }
            _ => {
                if log_enabled!(Level::Trace) {
                    trace!("Unhandled EtherType {:?}", ethertype);
                }
            }
        }
    }

    fn parse_ipv4(&self, data: &[u8], headers: &mut HeaderSet) {
        let ipv4_packet = match Ipv4Packet::new(data) {
            Some(packet) => packet,
            None => return,
        };

        // Reject header lengths that would make the payload bounds invalid
        let header_len = ipv4_packet.get_header_length() as usize * 4;
        if header_len < 20
            || header_len > data.len()
            || (ipv4_packet.get_total_length() as usize) < header_len
        {
            return;
        }

        headers.ipv4 = true;

        // Later fragments start mid-payload, past the transport header
        if ipv4_packet.get_fragment_offset() != 0 {
            return;
        }

        self.parse_transport(
            ipv4_packet.get_next_level_protocol(),
            ipv4_packet.payload(),
            headers,
            false,
        );
    }

    fn parse_ipv6(&self, data: &[u8], headers: &mut HeaderSet) {
        let ipv6_packet = match Ipv6Packet::new(data) {
            Some(packet) => packet,
            None => return,
        };
        headers.ipv6 = true;

        // Walk extension headers up to the upper-layer protocol
        let mut next = ipv6_packet.get_next_header();
        let mut payload = ipv6_packet.payload();
        for _ in 0..MAX_NESTED_HEADERS {
            match next {
                IpNextHeaderProtocols::Hopopt
                | IpNextHeaderProtocols::Ipv6Route
                | IpNextHeaderProtocols::Ipv6Opts => {
                    if payload.len() < 8 {
                        return;
                    }
                    let len = (payload[1] as usize + 1) * 8;
                    if payload.len() < len {
                        return;
                    }
                    next = IpNextHeaderProtocol(payload[0]);
                    payload = &payload[len..];
                }
                IpNextHeaderProtocols::Ipv6Frag => {
                    if payload.len() < 8 {
                        return;
                    }
                    // Only the first fragment carries the upper-layer header
                    let offset = u16::from_be_bytes([payload[2], payload[3]]) >> 3;
                    if offset != 0 {
                        return;
                    }
                    next = IpNextHeaderProtocol(payload[0]);
                    payload = &payload[8..];
                }
                _ => break,
            }
        }

        self.parse_transport(next, payload, headers, true);
    }

    /// Record the transport header carried by an IP datagram
    fn parse_transport(
        &self,
        proto: IpNextHeaderProtocol,
        data: &[u8],
        headers: &mut HeaderSet,
        over_ipv6: bool,
    ) {
        if log_enabled!(Level::Trace) {
            trace!("Transport protocol: {:?}, data length: {}", proto, data.len());
        }

        match proto {
            IpNextHeaderProtocols::Tcp => {
                if TcpPacket::new(data).is_some() {
                    headers.tcp = true;
                }
            }
            IpNextHeaderProtocols::Udp => {
                if UdpPacket::new(data).is_some() {
                    headers.udp = true;
                }
            }
            IpNextHeaderProtocols::Icmp => {
                if IcmpPacket::new(data).is_some() {
                    headers.icmp = true;
                }
            }
            IpNextHeaderProtocols::Icmpv6 if over_ipv6 => {
                if let Some(icmpv6_packet) = Icmpv6Packet::new(data) {
                    match icmpv6_packet.get_icmpv6_type() {
                        Icmpv6Types::EchoRequest | Icmpv6Types::EchoReply => {
                            headers.icmpv6_echo = true;
                        }
                        Icmpv6Types::NeighborSolicit | Icmpv6Types::NeighborAdvert => {
                            headers.icmpv6_nd = true;
                        }
                        _ => {}
                    }
                }
            }
            _ => {}
        }
    }
}

impl Default for PacketParser {
    fn default() -> Self {
        Self::new()
    }
}

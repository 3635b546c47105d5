use crate::models::packet::{PacketDescriptor, ProtocolCategory};

/// Assign a packet to exactly one protocol category.
///
/// First match wins: TCP, UDP, ICMP, ICMPv6 (IPv6 echo or neighbour
/// discovery only), ARP, then `Other` for everything else.
pub fn classify(packet: &PacketDescriptor) -> ProtocolCategory {
    let headers = &packet.headers;

    if headers.tcp {
        ProtocolCategory::Tcp
    } else if headers.udp {
        ProtocolCategory::Udp
    } else if headers.icmp {
        ProtocolCategory::Icmp
    } else if headers.ipv6 && (headers.icmpv6_echo || headers.icmpv6_nd) {
        ProtocolCategory::Icmpv6
    } else if headers.arp {
        ProtocolCategory::Arp
    } else {
        ProtocolCategory::Other
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::parser::{tests::tcp_frame, LinkLayer, PacketParser};
    use crate::models::packet::HeaderSet;

    fn packet(headers: HeaderSet) -> PacketDescriptor {
        PacketDescriptor::new(0.0, 64, headers)
    }

    #[test]
    fn tcp_wins_over_generic_ip() {
        let headers = HeaderSet {
            ipv4: true,
            tcp: true,
            ..Default::default()
        };
        assert_eq!(classify(&packet(headers)), ProtocolCategory::Tcp);

        let parsed = PacketParser::new().parse_packet(&tcp_frame(), LinkLayer::Ethernet, 0.0);
        assert_eq!(classify(&parsed), ProtocolCategory::Tcp);
    }

    #[test]
    fn ipv6_echo_request_is_icmpv6() {
        let headers = HeaderSet {
            ipv6: true,
            icmpv6_echo: true,
            ..Default::default()
        };
        assert_eq!(classify(&packet(headers)), ProtocolCategory::Icmpv6);
    }

    #[test]
    fn icmpv6_flags_without_ipv6_are_other() {
        let headers = HeaderSet {
            icmpv6_nd: true,
            ..Default::default()
        };
        assert_eq!(classify(&packet(headers)), ProtocolCategory::Other);
    }

    #[test]
    fn precedence_order() {
        let all = HeaderSet {
            ipv4: true,
            ipv6: true,
            tcp: true,
            udp: true,
            icmp: true,
            icmpv6_echo: true,
            icmpv6_nd: true,
            arp: true,
        };
        assert_eq!(classify(&packet(all)), ProtocolCategory::Tcp);
        assert_eq!(
            classify(&packet(HeaderSet { tcp: false, ..all })),
            ProtocolCategory::Udp
        );
        assert_eq!(
            classify(&packet(HeaderSet { tcp: false, udp: false, ..all })),
            ProtocolCategory::Icmp
        );
        assert_eq!(
            classify(&packet(HeaderSet { tcp: false, udp: false, icmp: false, ..all })),
            ProtocolCategory::Icmpv6
        );
        assert_eq!(
            classify(&packet(HeaderSet { arp: true, ..Default::default() })),
            ProtocolCategory::Arp
        );
    }

    #[test]
    fn ip_without_known_transport_is_other() {
        let headers = HeaderSet {
            ipv4: true,
            ..Default::default()
        };
        assert_eq!(classify(&packet(headers)), ProtocolCategory::Other);
        assert_eq!(classify(&packet(HeaderSet::default())), ProtocolCategory::Other);
    }
}

// SPDX-License-Identifier: Apache-2.0
// Copyright Natplane Contributors

//! Predicate evaluation. Pure: a predicate never touches the packet.

use crate::rule::Predicate;
use ipnet::Ipv4Net;
use net::buffer::PacketBufferMut;
use net::packet::Packet;
use std::net::Ipv4Addr;

#[inline]
fn in_network(addr: Ipv4Addr, network: Ipv4Net) -> bool {
    // A /0 matches everything, including on the wildcard mask path.
    network.contains(&addr)
}

/// Evaluate `pred` against `pkt`, leftmost-first with short-circuiting.
/// A packet without a parseable IPv4 header fails address predicates.
pub fn matches<Buf: PacketBufferMut>(pred: &Predicate, pkt: &Packet<Buf>) -> bool {
    match pred {
        Predicate::SrcInNet(network) => pkt
            .ipv4()
            .map(|ip| in_network(ip.src(), *network))
            .unwrap_or(false),
        Predicate::DstInNet(network) => pkt
            .ipv4()
            .map(|ip| in_network(ip.dst(), *network))
            .unwrap_or(false),
        Predicate::VlanIs(vlan) => pkt.vlan_id() == *vlan,
        Predicate::And(left, right) => matches(left, pkt) && matches(right, pkt),
        Predicate::Or(left, right) => matches(left, pkt) || matches(right, pkt),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod test {
    use super::*;
    use crate::rule::Predicate;
    use net::pktgen;

    fn probe(src: Ipv4Addr, dst: Ipv4Addr, vlan: u16) -> Packet<net::FrameBuffer> {
        let frame = pktgen::udp_frame(
            pktgen::SRC_MAC,
            pktgen::DST_MAC,
            src,
            dst,
            64,
            1111,
            2222,
            b"x",
        );
        Packet::with_vlan(frame, vlan)
    }

    fn network(s: &str) -> Ipv4Net {
        s.parse().unwrap()
    }

    #[test]
    fn network_membership() {
        let pkt = probe(
            Ipv4Addr::new(10, 1, 2, 3),
            Ipv4Addr::new(212, 47, 1, 1),
            0,
        );
        assert!(matches(&Predicate::SrcInNet(network("10.0.0.0/8")), &pkt));
        assert!(!matches(&Predicate::SrcInNet(network("11.0.0.0/8")), &pkt));
        assert!(matches(&Predicate::DstInNet(network("212.47.0.0/16")), &pkt));
        assert!(!matches(&Predicate::DstInNet(network("212.48.0.0/16")), &pkt));
        // A zero-length prefix always matches.
        assert!(matches(&Predicate::SrcInNet(network("0.0.0.0/0")), &pkt));
        // Host-precision prefix.
        assert!(matches(&Predicate::SrcInNet(network("10.1.2.3/32")), &pkt));
        assert!(!matches(&Predicate::SrcInNet(network("10.1.2.4/32")), &pkt));
    }

    #[test]
    fn vlan_compares_low_tci_bits() {
        let pkt = probe(Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(10, 0, 0, 2), 31);
        assert!(matches(&Predicate::VlanIs(31), &pkt));
        assert!(!matches(&Predicate::VlanIs(32), &pkt));

        // Priority bits above the 12-bit id are ignored.
        let pkt = probe(
            Ipv4Addr::new(10, 0, 0, 1),
            Ipv4Addr::new(10, 0, 0, 2),
            0xe000 | 31,
        );
        assert!(matches(&Predicate::VlanIs(31), &pkt));
    }

    #[test]
    fn boolean_composition() {
        let pkt = probe(Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(10, 0, 0, 2), 31);
        let yes = || Box::new(Predicate::VlanIs(31));
        let no = || Box::new(Predicate::VlanIs(99));
        assert!(matches(&Predicate::And(yes(), yes()), &pkt));
        assert!(!matches(&Predicate::And(yes(), no()), &pkt));
        assert!(!matches(&Predicate::And(no(), yes()), &pkt));
        assert!(matches(&Predicate::Or(no(), yes()), &pkt));
        assert!(matches(&Predicate::Or(yes(), no()), &pkt));
        assert!(!matches(&Predicate::Or(no(), no()), &pkt));
    }
}

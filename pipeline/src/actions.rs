// SPDX-License-Identifier: Apache-2.0
// Copyright Natplane Contributors

//! The action primitives: `drop`, `print` and `out`. The NAT rewrite
//! lives in its own module.

use crate::exec::RuleCtx;
use crate::rule::{Action, OutPort, Verdict};
use crate::sink::TxSink;
use net::buffer::PacketBufferMut;
use net::ipv4::proto;
use net::offload::TxOffload;
use net::packet::Packet;
use tracing::debug;

pub(crate) fn apply<Buf: PacketBufferMut, S: TxSink<Buf>>(
    action: &Action,
    pkt: Packet<Buf>,
    ctx: &mut RuleCtx<'_, Buf, S>,
) -> Verdict<Buf> {
    match action {
        Action::Drop => {
            ctx.stats.drop_nat_condition.bump();
            Verdict::Terminal
        }
        Action::Print => print(pkt, ctx),
        Action::NatRewrite(field) => crate::nat::rewrite(pkt, *field, ctx),
        Action::Out(out) => emit(pkt, out, ctx),
    }
}

/// Log a packet summary and continue. Never fails: unparseable layers are
/// simply not reported.
fn print<Buf: PacketBufferMut, S: TxSink<Buf>>(
    mut pkt: Packet<Buf>,
    ctx: &mut RuleCtx<'_, Buf, S>,
) -> Verdict<Buf> {
    let Ok(ip) = pkt.ipv4() else {
        debug!(
            "port {}: non-ipv4 packet of {} bytes on worker {}",
            ctx.rx_port,
            pkt.len(),
            ctx.worker_id
        );
        return Verdict::Continue(pkt);
    };
    let (src, dst, protocol) = (ip.src(), ip.dst(), ip.protocol());
    debug!(
        "port {}: packet on worker {} from {src} to {dst}",
        ctx.rx_port, ctx.worker_id
    );
    match protocol {
        proto::TCP => {
            if let Ok(tcp) = pkt.tcp_mut() {
                debug!(
                    ">>> TCP packet, src port: {}, dst port: {}, tcp flags: {:#x}",
                    tcp.src_port(),
                    tcp.dst_port(),
                    tcp.flags()
                );
            }
        }
        proto::UDP => {
            if let Ok(udp) = pkt.udp_mut() {
                debug!(
                    ">>> UDP packet, src port: {}, dst port: {}",
                    udp.src_port(),
                    udp.dst_port()
                );
            }
        }
        proto::ICMP => {
            if let Ok(icmp) = pkt.icmp() {
                debug!(
                    ">>> ICMP packet, type: {:#x}, code: {:#x}",
                    icmp.icmp_type(),
                    icmp.code()
                );
            }
        }
        other => debug!(">>> not TCP/UDP/ICMP - ipv4.protocol={other:#x}"),
    }
    Verdict::Continue(pkt)
}

/// Finish the Ethernet header, leave checksums to offload, tag the VLAN
/// and hand the packet to the egress batch. Always terminal.
fn emit<Buf: PacketBufferMut, S: TxSink<Buf>>(
    mut pkt: Packet<Buf>,
    out: &OutPort,
    ctx: &mut RuleCtx<'_, Buf, S>,
) -> Verdict<Buf> {
    let src_mac = ctx.sink.port_mac(out.port);
    let Ok(mut eth) = pkt.eth_mut() else {
        return Verdict::Terminal;
    };
    eth.set_src(src_mac);
    eth.set_dst(out.next_hop);

    let Ok(ip) = pkt.ipv4() else {
        return Verdict::Terminal;
    };
    let protocol = ip.protocol();
    let fragmented = ip.is_fragment();

    if let Ok(mut ip) = pkt.ipv4_mut() {
        ip.set_checksum(0);
    }
    pkt.request_offload(TxOffload::IP_CKSUM);

    // Fragment checksums were fixed up inline by the rewrite action; the
    // hardware cannot checksum a split payload.
    match protocol {
        proto::TCP if !fragmented => {
            let Ok(mut tcp) = pkt.tcp_mut() else {
                return Verdict::Terminal;
            };
            tcp.set_checksum(0);
            pkt.request_offload(TxOffload::TCP_CKSUM);
        }
        proto::UDP if !fragmented => {
            let Ok(mut udp) = pkt.udp_mut() else {
                return Verdict::Terminal;
            };
            udp.set_checksum(0);
            pkt.request_offload(TxOffload::UDP_CKSUM);
        }
        _ => {}
    }

    pkt.set_vlan_tci(out.vlan);
    if out.vlan != 0 {
        pkt.request_offload(TxOffload::VLAN_INSERT);
    }

    ctx.sink.transmit(out.port, pkt);
    Verdict::Terminal
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod test {
    use super::*;
    use crate::exec::test_support::TestSink;
    use crate::rule::OutPort;
    use net::eth::Mac;
    use net::pktgen;
    use std::net::Ipv4Addr;

    fn ctx_parts() -> (xlat::NatTable, stats::WorkerStats, TestSink) {
        (
            xlat::NatTable::new(),
            stats::WorkerStats::new(),
            TestSink::default(),
        )
    }

    #[tracing_test::traced_test]
    #[test]
    fn print_logs_a_summary_and_continues() {
        let (nat, stats, mut sink) = ctx_parts();
        let pkt = Packet::new(pktgen::udp_frame(
            pktgen::SRC_MAC,
            pktgen::DST_MAC,
            Ipv4Addr::new(10, 0, 0, 5),
            Ipv4Addr::new(8, 8, 8, 8),
            64,
            1111,
            2222,
            b"x",
        ));
        let mut ctx = RuleCtx::new(&nat, &stats, &mut sink, 0, 1);
        let verdict = print(pkt, &mut ctx);
        assert!(!verdict.is_terminal());
        assert!(logs_contain("from 10.0.0.5 to 8.8.8.8"));
        assert!(logs_contain("UDP packet"));
    }

    #[test]
    fn out_rewrites_ethernet_and_requests_offloads() {
        let (nat, stats, mut sink) = ctx_parts();
        let pkt = Packet::new(pktgen::udp_frame(
            pktgen::SRC_MAC,
            pktgen::DST_MAC,
            Ipv4Addr::new(10, 0, 0, 5),
            Ipv4Addr::new(8, 8, 8, 8),
            63,
            1111,
            2222,
            b"x",
        ));
        let next_hop = Mac([0x7c, 0x0e, 0xce, 0x25, 0xf3, 0x97]);
        let out = OutPort {
            port: 1,
            vlan: 0,
            next_hop,
        };
        let mut ctx = RuleCtx::new(&nat, &stats, &mut sink, 0, 1);
        let verdict = emit(pkt, &out, &mut ctx);
        assert!(verdict.is_terminal());

        let (port, sent) = &sink.sent[0];
        assert_eq!(*port, 1);
        let eth = sent.eth().unwrap();
        assert_eq!(eth.dst(), next_hop);
        assert_eq!(eth.src(), Mac([0x02, 0, 0, 0, 0x10, 1]));
        assert_eq!(sent.ipv4().unwrap().checksum(), 0);
        assert!(
            sent.offload()
                .contains(TxOffload::IP_CKSUM | TxOffload::UDP_CKSUM)
        );
        assert!(!sent.offload().contains(TxOffload::VLAN_INSERT));
    }

    #[test]
    fn out_tags_vlan_when_configured() {
        let (nat, stats, mut sink) = ctx_parts();
        let pkt = Packet::new(pktgen::udp_frame(
            pktgen::SRC_MAC,
            pktgen::DST_MAC,
            Ipv4Addr::new(10, 0, 0, 5),
            Ipv4Addr::new(8, 8, 8, 8),
            63,
            1111,
            2222,
            b"x",
        ));
        let out = OutPort {
            port: 0,
            vlan: 31,
            next_hop: Mac::BROADCAST,
        };
        let mut ctx = RuleCtx::new(&nat, &stats, &mut sink, 0, 1);
        emit(pkt, &out, &mut ctx);
        let (_, sent) = &sink.sent[0];
        assert_eq!(sent.vlan_tci(), 31);
        assert!(sent.offload().contains(TxOffload::VLAN_INSERT));
    }

    #[test]
    fn out_leaves_fragment_l4_checksum_alone() {
        let (nat, stats, mut sink) = ctx_parts();
        let mut frame = pktgen::udp_frame(
            pktgen::SRC_MAC,
            pktgen::DST_MAC,
            Ipv4Addr::new(10, 0, 0, 5),
            Ipv4Addr::new(8, 8, 8, 8),
            63,
            1111,
            2222,
            b"frag",
        );
        {
            let mut pkt = Packet::new(frame);
            pkt.ipv4_mut().unwrap().set_fragment(true, 0);
            frame = pkt.into_buffer();
        }
        pktgen::refresh_ipv4_checksum(&mut frame);
        let pkt = Packet::new(frame);
        let before = {
            let b = pkt.frame();
            u16::from_be_bytes([b[40], b[41]])
        };
        assert_ne!(before, 0);

        let out = OutPort {
            port: 0,
            vlan: 0,
            next_hop: Mac::BROADCAST,
        };
        let mut ctx = RuleCtx::new(&nat, &stats, &mut sink, 0, 1);
        emit(pkt, &out, &mut ctx);
        let (_, sent) = &sink.sent[0];
        let after = {
            let b = sent.frame();
            u16::from_be_bytes([b[40], b[41]])
        };
        assert_eq!(before, after);
        assert!(!sent.offload().contains(TxOffload::UDP_CKSUM));
        assert!(sent.offload().contains(TxOffload::IP_CKSUM));
    }
}

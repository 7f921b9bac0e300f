// SPDX-License-Identifier: Apache-2.0
// Copyright Natplane Contributors

//! IPv4 handling: padding fix, TTL, ICMP echo for our own addresses, and
//! handoff to the rule tree.

use crate::drivers::PortIo;
use crate::worker::WorkerTx;
use config::Configuration;
use net::FrameBuffer;
use net::checksum;
use net::eth::EthHdr;
use net::icmp4::kind;
use net::ipv4::proto;
use net::offload::TxOffload;
use net::packet::Packet;
use pipeline::{RuleCtx, TxSink, execute};
use tracing::debug;

/// Some switches (Nexus 9000 series) untag frames without zeroing the
/// bytes they leave behind the IPv4 payload, which invalidates the
/// Ethernet padding. Zero any trailing bytes beyond the declared IPv4
/// total length; a frame that was padded correctly is untouched.
fn fix_untag_padding(pkt: &mut Packet<FrameBuffer>) {
    let Ok(ip) = pkt.ipv4() else {
        return;
    };
    let declared = EthHdr::<&[u8]>::LEN + usize::from(ip.total_length());
    let frame_len = pkt.len();
    // The declared length is attacker-controlled 16-bit input; only a
    // strictly positive padding length may be zeroed.
    if frame_len > declared {
        pkt.frame_mut()[declared..].fill(0);
    }
}

pub(crate) fn handle<P: PortIo>(
    mut pkt: Packet<FrameBuffer>,
    port: u16,
    config: &Configuration,
    sink: &mut WorkerTx<'_, P>,
    worker_id: u32,
) {
    fix_untag_padding(&mut pkt);

    let Ok(ip) = pkt.ipv4() else {
        return;
    };
    // TTL exceeded: don't answer, just release. Generating a Time
    // Exceeded here is an explicit non-goal.
    if ip.ttl() <= 1 {
        return;
    }
    let (protocol, dst) = (ip.protocol(), ip.dst());
    if let Ok(mut ip) = pkt.ipv4_mut() {
        let ttl = ip.ttl();
        ip.set_ttl(ttl - 1);
    }

    if protocol == proto::ICMP && config.is_local_ip(dst, pkt.vlan_id()) {
        // Addressed to us: answered or dropped, never forwarded.
        icmp_answer(pkt, port, sink);
        return;
    }

    let stats = sink.stats();
    let mut ctx = RuleCtx::new(&config.nat, stats, sink, port, worker_id);
    // Terminal means emitted or released; Continue means the tree ran
    // out of rules and the packet is released right here.
    let _ = execute(config.rules.as_ref(), pkt, &mut ctx);
}

/// TTL of packets we originate, echo replies included.
const REPLY_TTL: u8 = 64;

/// Turn an echo request around in place. Other ICMP types addressed to
/// us are counted and dropped.
fn icmp_answer<P: PortIo>(mut pkt: Packet<FrameBuffer>, port: u16, sink: &mut WorkerTx<'_, P>) {
    let Ok(icmp) = pkt.icmp() else {
        sink.stats().drop_unknown_icmp.bump();
        return;
    };
    if icmp.icmp_type() != kind::ECHO_REQUEST {
        debug!("port {port}: icmp type {} for us, not answered", icmp.icmp_type());
        sink.stats().drop_unknown_icmp.bump();
        return;
    }

    if let Ok(mut eth) = pkt.eth_mut() {
        eth.swap_addresses();
    }
    if let Ok(mut ip) = pkt.ipv4_mut() {
        ip.swap_addresses();
        ip.set_ttl(REPLY_TTL);
    }
    if let Ok(mut icmp) = pkt.icmp_mut() {
        icmp.set_icmp_type(kind::ECHO_REPLY);
        icmp.set_checksum(0);
    }
    // ICMP has no hardware assist; compute over the payload now.
    let Ok(l4) = pkt.l4_slice_mut() else {
        return;
    };
    let csum = checksum::checksum(l4);
    if let Ok(mut icmp) = pkt.icmp_mut() {
        icmp.set_checksum(csum);
    }

    if let Ok(mut ip) = pkt.ipv4_mut() {
        ip.set_checksum(0);
    }
    pkt.request_offload(TxOffload::IP_CKSUM);
    if pkt.vlan_id() != 0 {
        pkt.request_offload(TxOffload::VLAN_INSERT);
    }
    sink.transmit(port, pkt);
}

// SPDX-License-Identifier: Apache-2.0
// Copyright Natplane Contributors

//! Ethernet demux and the L2/L3 handlers.

mod arp;
mod ipv4;

use crate::drivers::PortIo;
use crate::worker::WorkerTx;
use config::Configuration;
use net::FrameBuffer;
use net::eth::EtherType;
use net::packet::Packet;
use tracing::debug;

/// Dispatch one received packet to termination: reply, forward through
/// the rule tree, or drop. Ownership of the packet always ends here.
pub fn dispatch<P: PortIo>(
    pkt: Packet<FrameBuffer>,
    port: u16,
    config: &Configuration,
    sink: &mut WorkerTx<'_, P>,
    worker_id: u32,
) {
    let Ok(eth) = pkt.eth() else {
        // Too short to carry an Ethernet header.
        sink.stats().drop_unhandled_ethertype.bump();
        return;
    };
    // Compare the raw wire bytes against pre-swapped constants; no
    // per-packet byte swap on the demux path.
    let ether_type = eth.ether_type();
    if ether_type == EtherType::IPV4 {
        ipv4::handle(pkt, port, config, sink, worker_id);
    } else if ether_type == EtherType::ARP {
        arp::handle(pkt, port, config, sink);
    } else {
        debug!("unhandled proto {ether_type} on port {port}");
        sink.stats().drop_unhandled_ethertype.bump();
    }
}

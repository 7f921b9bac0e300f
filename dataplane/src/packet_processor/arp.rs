// SPDX-License-Identifier: Apache-2.0
// Copyright Natplane Contributors

//! ARP handling: answer requests for our own addresses, scoped to the
//! receiving port and the packet's VLAN. Everything else is dropped
//! silently; the device never learns foreign ARP state.

use crate::drivers::PortIo;
use crate::worker::WorkerTx;
use config::Configuration;
use net::FrameBuffer;
use net::arp::op;
use net::offload::TxOffload;
use net::packet::Packet;
use pipeline::TxSink;
use tracing::debug;

pub(crate) fn handle<P: PortIo>(
    mut pkt: Packet<FrameBuffer>,
    port: u16,
    config: &Configuration,
    sink: &mut WorkerTx<'_, P>,
) {
    let Ok(arp) = pkt.arp() else {
        return;
    };
    if arp.opcode() != op::REQUEST {
        debug!(
            "ARP packet received on port {port}/vlan {}, but not a request - skip",
            pkt.vlan_id()
        );
        return;
    }

    let sender_mac = arp.sender_mac();
    let sender_ip = arp.sender_ip();
    let target_ip = arp.target_ip();
    let vlan = pkt.vlan_id();
    debug!("port {port}: who has {target_ip}? asks {sender_ip} on vlan {vlan}");

    if !config.is_port_ip(target_ip, vlan, port) {
        debug!(
            "port {port}: {target_ip} is not my address on vlan {vlan}, ARP request ignored"
        );
        return;
    }

    let my_mac = sink.port_mac(port);

    // Request for us: forge the reply in place.
    if let Ok(mut eth) = pkt.eth_mut() {
        eth.set_dst(sender_mac);
        eth.set_src(my_mac);
    }
    let Ok(mut arp) = pkt.arp_mut() else {
        return;
    };
    arp.set_opcode(op::REPLY);
    arp.set_target_mac(sender_mac);
    arp.set_target_ip(sender_ip);
    arp.set_sender_mac(my_mac);
    arp.set_sender_ip(target_ip);

    debug!(
        "port {port}: ARP reply - {target_ip} is at {my_mac}, telling {sender_ip} on vlan {vlan}"
    );

    if vlan != 0 {
        pkt.request_offload(TxOffload::VLAN_INSERT);
    }
    sink.transmit(port, pkt);
}

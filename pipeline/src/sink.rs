// SPDX-License-Identifier: Apache-2.0
// Copyright Natplane Contributors

//! The seam between the rule engine and the I/O layer.

use net::buffer::PacketBufferMut;
use net::eth::Mac;
use net::packet::Packet;

/// Where terminal actions put packets.
///
/// The worker implements this over its per-port TX batches; tests
/// implement it with a plain vector. Transmission is best-effort: packets
/// the NIC refuses are counted and released by the implementation.
pub trait TxSink<Buf: PacketBufferMut> {
    /// Queue `pkt` for emission on `port`, taking ownership.
    fn transmit(&mut self, port: u16, pkt: Packet<Buf>);

    /// MAC address of `port`, installed as the Ethernet source on output.
    fn port_mac(&self, port: u16) -> Mac;
}

// SPDX-License-Identifier: Apache-2.0
// Copyright Natplane Contributors

//! Port drivers.
//!
//! The pipeline talks to NICs through the [`PortIo`] trait: burst
//! receive, burst transmit, per-port MAC and counters. Each worker owns
//! its own `PortIo` instance (its private queues); a shared
//! [`PortStatsSource`] handle serves the admin channel. Two drivers are
//! provided: an in-memory [`sim`] used by tests and development, and an
//! AF_PACKET [`kernel`] driver for running against real interfaces
//! without a kernel-bypass NIC.

pub mod kernel;
pub mod sim;

use arrayvec::ArrayVec;
use net::FrameBuffer;
use net::eth::Mac;
use net::packet::Packet;
use stats::PortStats;

/// Largest burst a worker reads from one RX queue per iteration.
pub const RX_BURST: usize = 32;
/// TX batch capacity per port; batches are flushed when full and at the
/// end of every loop iteration.
pub const TX_BURST: usize = 32;

/// A worker's private view of the NICs.
pub trait PortIo: Send + 'static {
    /// Number of ports this driver exposes.
    fn num_ports(&self) -> u16;

    /// MAC address of `port`.
    fn port_mac(&self, port: u16) -> Mac;

    /// Read up to [`RX_BURST`] packets from `port` into `out`; returns
    /// the number received.
    fn rx_burst(
        &mut self,
        port: u16,
        out: &mut ArrayVec<Packet<FrameBuffer>, RX_BURST>,
    ) -> usize;

    /// Write the batch to `port`. Accepted packets are drained from the
    /// front of `pkts`; whatever the NIC refused is left behind for the
    /// caller to count and release. Returns the number accepted.
    fn tx_burst(
        &mut self,
        port: u16,
        pkts: &mut ArrayVec<Packet<FrameBuffer>, TX_BURST>,
    ) -> usize;
}

/// Read-only, thread-safe access to per-port NIC counters for the admin
/// channel.
pub trait PortStatsSource: Send + Sync {
    /// Number of ports.
    fn num_ports(&self) -> u16;

    /// Aggregate counters of `port`.
    fn port_stats(&self, port: u16) -> PortStats;

    /// Extended counters of `port` as `(name, value)` pairs.
    fn port_xstats(&self, port: u16) -> Vec<(String, u64)>;

    /// Zero the counters on every port.
    fn reset(&self);
}

// SPDX-License-Identifier: Apache-2.0
// Copyright Natplane Contributors

//! In-memory port driver.
//!
//! A [`SimNet`] hub models the outside world: frames injected into a port
//! show up in worker RX bursts, and whatever the pipeline emits lands in
//! a per-port capture queue. The TX side finishes offload requests in
//! software, like a NIC would, so captured frames carry final checksums
//! and VLAN tags. A configurable per-burst TX acceptance limit exercises
//! the `drop_tx_notsent` path.

use super::{PortIo, PortStatsSource, RX_BURST, TX_BURST};
use arrayvec::ArrayVec;
use net::FrameBuffer;
use net::eth::Mac;
use net::packet::Packet;
use stats::PortStats;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tracing::warn;

struct SimPort {
    mac: Mac,
    inject: Mutex<VecDeque<Packet<FrameBuffer>>>,
    emitted: Mutex<VecDeque<Packet<FrameBuffer>>>,
    stats: Mutex<PortStats>,
}

/// The shared hub. Workers attach via [`SimNet::endpoint`].
pub struct SimNet {
    ports: Vec<SimPort>,
    tx_accept_limit: usize,
}

impl SimNet {
    /// A hub with `num_ports` ports and unlimited TX acceptance.
    pub fn new(num_ports: u16) -> Arc<Self> {
        Self::with_tx_limit(num_ports, usize::MAX)
    }

    /// A hub whose ports accept at most `tx_accept_limit` packets per
    /// burst, refusing the rest.
    pub fn with_tx_limit(num_ports: u16, tx_accept_limit: usize) -> Arc<Self> {
        let ports = (0..num_ports)
            .map(|p| SimPort {
                mac: Mac([0x02, 0x00, 0x00, 0x00, 0x10, u8::try_from(p).unwrap_or(0xff)]),
                inject: Mutex::new(VecDeque::new()),
                emitted: Mutex::new(VecDeque::new()),
                stats: Mutex::new(PortStats::default()),
            })
            .collect();
        Arc::new(SimNet {
            ports,
            tx_accept_limit,
        })
    }

    /// Push a wire frame into `port`'s receive path. Tagged frames are
    /// VLAN-stripped the way hardware offload would.
    pub fn inject(&self, port: u16, frame: FrameBuffer) {
        let pkt = Packet::from_wire(frame);
        self.ports[usize::from(port)]
            .inject
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push_back(pkt);
    }

    /// Pop the next frame the device emitted on `port`, if any.
    pub fn emitted(&self, port: u16) -> Option<Packet<FrameBuffer>> {
        self.ports[usize::from(port)]
            .emitted
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .pop_front()
    }

    /// Number of frames captured on `port` so far.
    pub fn emitted_len(&self, port: u16) -> usize {
        self.ports[usize::from(port)]
            .emitted
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    /// MAC address of `port`.
    pub fn port_mac(&self, port: u16) -> Mac {
        self.ports[usize::from(port)].mac
    }

    /// A worker-private endpoint onto this hub.
    pub fn endpoint(self: &Arc<Self>) -> SimPortIo {
        SimPortIo {
            hub: Arc::clone(self),
        }
    }

    fn with_stats<R>(&self, port: u16, f: impl FnOnce(&mut PortStats) -> R) -> R {
        let mut guard = self.ports[usize::from(port)]
            .stats
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        f(&mut guard)
    }
}

impl PortStatsSource for SimNet {
    fn num_ports(&self) -> u16 {
        u16::try_from(self.ports.len()).unwrap_or(u16::MAX)
    }

    fn port_stats(&self, port: u16) -> PortStats {
        self.with_stats(port, |stats| *stats)
    }

    fn port_xstats(&self, port: u16) -> Vec<(String, u64)> {
        let stats = self.port_stats(port);
        vec![
            ("rx_good_packets".to_string(), stats.ipackets),
            ("tx_good_packets".to_string(), stats.opackets),
            ("rx_good_bytes".to_string(), stats.ibytes),
            ("tx_good_bytes".to_string(), stats.obytes),
            ("tx_errors".to_string(), stats.oerrors),
        ]
    }

    fn reset(&self) {
        for port in 0..self.num_ports() {
            self.with_stats(port, |stats| *stats = PortStats::default());
        }
    }
}

/// One worker's queues on a [`SimNet`].
pub struct SimPortIo {
    hub: Arc<SimNet>,
}

impl PortIo for SimPortIo {
    fn num_ports(&self) -> u16 {
        self.hub.num_ports()
    }

    fn port_mac(&self, port: u16) -> Mac {
        self.hub.ports[usize::from(port)].mac
    }

    fn rx_burst(
        &mut self,
        port: u16,
        out: &mut ArrayVec<Packet<FrameBuffer>, RX_BURST>,
    ) -> usize {
        let mut queue = self.hub.ports[usize::from(port)]
            .inject
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut received = 0usize;
        while !out.is_full() {
            let Some(pkt) = queue.pop_front() else {
                break;
            };
            self.hub.with_stats(port, |stats| {
                stats.ipackets += 1;
                stats.ibytes += pkt.len() as u64;
            });
            out.push(pkt);
            received += 1;
        }
        received
    }

    fn tx_burst(
        &mut self,
        port: u16,
        pkts: &mut ArrayVec<Packet<FrameBuffer>, TX_BURST>,
    ) -> usize {
        let accept = pkts.len().min(self.hub.tx_accept_limit);
        let mut sent = 0usize;
        for mut pkt in pkts.drain(..accept) {
            // The "hardware" finishes checksums and the VLAN tag here.
            if let Err(e) = pkt.resolve_tx_offloads() {
                warn!("sim port {port}: dropping unfinishable frame: {e}");
                self.hub.with_stats(port, |stats| stats.oerrors += 1);
                continue;
            }
            self.hub.with_stats(port, |stats| {
                stats.opackets += 1;
                stats.obytes += pkt.len() as u64;
            });
            self.hub.ports[usize::from(port)]
                .emitted
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .push_back(pkt);
            sent += 1;
        }
        sent
    }
}

// SPDX-License-Identifier: Apache-2.0
// Copyright Natplane Contributors

//! AF_PACKET port driver.
//!
//! Binds one raw packet socket per interface per worker. This runs the
//! pipeline against ordinary kernel interfaces for functional bring-up;
//! without PACKET_FANOUT every worker sees every frame, so run a single
//! worker when using this driver for anything beyond liveness testing.
//! Offload requests are finished in software before the frame is written.

use super::{PortIo, PortStatsSource, RX_BURST, TX_BURST};
use afpacket::sync::RawPacketStream;
use arrayvec::ArrayVec;
use net::FrameBuffer;
use net::buffer::MAX_FRAME_LEN;
use net::eth::Mac;
use net::packet::Packet;
use stats::PortStats;
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, error, warn};

struct SharedCounters {
    ports: Vec<Mutex<PortStats>>,
    names: Vec<String>,
}

impl SharedCounters {
    fn with<R>(&self, port: u16, f: impl FnOnce(&mut PortStats) -> R) -> R {
        let mut guard = self.ports[usize::from(port)]
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }
}

impl PortStatsSource for SharedCounters {
    fn num_ports(&self) -> u16 {
        u16::try_from(self.ports.len()).unwrap_or(u16::MAX)
    }

    fn port_stats(&self, port: u16) -> PortStats {
        self.with(port, |stats| *stats)
    }

    fn port_xstats(&self, port: u16) -> Vec<(String, u64)> {
        let stats = self.port_stats(port);
        vec![
            (
                format!("{}_rx_packets", self.names[usize::from(port)]),
                stats.ipackets,
            ),
            (
                format!("{}_tx_packets", self.names[usize::from(port)]),
                stats.opackets,
            ),
            (
                format!("{}_rx_errors", self.names[usize::from(port)]),
                stats.ierrors,
            ),
            (
                format!("{}_tx_errors", self.names[usize::from(port)]),
                stats.oerrors,
            ),
        ]
    }

    fn reset(&self) {
        for port in 0..self.num_ports() {
            self.with(port, |stats| *stats = PortStats::default());
        }
    }
}

/// Factory for per-worker [`KernelIo`] endpoints on a fixed interface set.
pub struct KernelDriver {
    interfaces: Vec<String>,
    macs: Vec<Mac>,
    counters: Arc<SharedCounters>,
}

impl KernelDriver {
    /// Resolve `interfaces` and prepare the shared counter block. Ports
    /// are numbered in argument order.
    pub fn open(interfaces: &[String]) -> io::Result<Self> {
        if interfaces.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "kernel driver needs at least one --interface",
            ));
        }
        let known = netdev::get_interfaces();
        let mut macs = Vec::with_capacity(interfaces.len());
        for name in interfaces {
            let mac = known
                .iter()
                .find(|iface| &iface.name == name)
                .and_then(|iface| iface.mac_addr.as_ref())
                .map(|mac| Mac(mac.octets()));
            let Some(mac) = mac else {
                return Err(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("interface {name} not found or has no MAC"),
                ));
            };
            debug!("kernel driver: port {} is {name} ({mac})", macs.len());
            macs.push(mac);
        }
        Ok(KernelDriver {
            interfaces: interfaces.to_vec(),
            macs,
            counters: Arc::new(SharedCounters {
                ports: interfaces.iter().map(|_| Mutex::default()).collect(),
                names: interfaces.to_vec(),
            }),
        })
    }

    /// Number of ports.
    pub fn num_ports(&self) -> u16 {
        u16::try_from(self.interfaces.len()).unwrap_or(u16::MAX)
    }

    /// Shared read-side counters for the admin channel.
    pub fn stats_source(&self) -> Arc<dyn PortStatsSource> {
        Arc::clone(&self.counters) as Arc<dyn PortStatsSource>
    }

    /// Open this worker's sockets, one per interface.
    pub fn endpoint(&self) -> io::Result<KernelIo> {
        let mut ports = Vec::with_capacity(self.interfaces.len());
        for (name, mac) in self.interfaces.iter().zip(&self.macs) {
            let mut stream = RawPacketStream::new().map_err(|e| {
                error!("failed to open raw socket for interface {name}: {e}");
                e
            })?;
            stream.set_non_blocking();
            stream.bind(name).inspect_err(|e| {
                error!("failed to bind raw socket to interface {name}: {e}");
            })?;
            ports.push(KernelPort {
                stream,
                mac: *mac,
            });
        }
        Ok(KernelIo {
            ports,
            counters: Arc::clone(&self.counters),
        })
    }
}

struct KernelPort {
    stream: RawPacketStream,
    mac: Mac,
}

/// One worker's packet sockets.
pub struct KernelIo {
    ports: Vec<KernelPort>,
    counters: Arc<SharedCounters>,
}

impl PortIo for KernelIo {
    fn num_ports(&self) -> u16 {
        u16::try_from(self.ports.len()).unwrap_or(u16::MAX)
    }

    fn port_mac(&self, port: u16) -> Mac {
        self.ports[usize::from(port)].mac
    }

    fn rx_burst(
        &mut self,
        port: u16,
        out: &mut ArrayVec<Packet<FrameBuffer>, RX_BURST>,
    ) -> usize {
        let kport = &mut self.ports[usize::from(port)];
        let mut buf = [0u8; MAX_FRAME_LEN];
        let mut received = 0usize;
        while !out.is_full() {
            match kport.stream.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    self.counters.with(port, |stats| {
                        stats.ipackets += 1;
                        stats.ibytes += n as u64;
                    });
                    out.push(Packet::from_wire(FrameBuffer::from_frame(&buf[..n])));
                    received += 1;
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    warn!("port {port}: receive error: {e}");
                    self.counters.with(port, |stats| stats.ierrors += 1);
                    break;
                }
            }
        }
        received
    }

    fn tx_burst(
        &mut self,
        port: u16,
        pkts: &mut ArrayVec<Packet<FrameBuffer>, TX_BURST>,
    ) -> usize {
        let kport = &mut self.ports[usize::from(port)];
        let mut sent = 0usize;
        while !pkts.is_empty() {
            let mut pkt = pkts.remove(0);
            if let Err(e) = pkt.resolve_tx_offloads() {
                warn!("port {port}: dropping unfinishable frame: {e}");
                self.counters.with(port, |stats| stats.oerrors += 1);
                continue;
            }
            match kport.stream.write(pkt.frame()) {
                Ok(_) => {
                    self.counters.with(port, |stats| {
                        stats.opackets += 1;
                        stats.obytes += pkt.len() as u64;
                    });
                    sent += 1;
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    // Queue full: put the frame back for the caller.
                    pkts.insert(0, pkt);
                    break;
                }
                Err(e) => {
                    warn!("port {port}: transmit error: {e}");
                    self.counters.with(port, |stats| stats.oerrors += 1);
                }
            }
        }
        sent
    }
}

// SPDX-License-Identifier: Apache-2.0
// Copyright Natplane Contributors

//! The per-core pipeline loop.
//!
//! Run-to-completion: each worker burst-reads its RX queues, dispatches
//! every packet to termination, flushes its TX batches, then polls its
//! configuration slot. No locks, no allocation, no blocking between
//! those steps; the loop only ends when the stop flag is raised at an
//! iteration boundary.

use crate::drivers::{PortIo, RX_BURST, TX_BURST};
use crate::packet_processor;
use arrayvec::ArrayVec;
use config::{ConfigSlot, Configuration};
use net::FrameBuffer;
use net::eth::Mac;
use net::packet::Packet;
use pipeline::TxSink;
use stats::WorkerStats;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

/// Issue a best-effort cache prefetch for the start of `data`.
#[inline]
pub(crate) fn prefetch(data: &[u8]) {
    #[cfg(target_arch = "x86_64")]
    // Prefetching is a hint; any address is safe.
    #[allow(unsafe_code)]
    unsafe {
        core::arch::x86_64::_mm_prefetch::<{ core::arch::x86_64::_MM_HINT_T0 }>(
            data.as_ptr().cast::<i8>(),
        );
    }
    #[cfg(not(target_arch = "x86_64"))]
    let _ = data;
}

/// The egress side a worker hands to the packet processors: per-port TX
/// batches backed by the worker's own queues. Batches drain when full and
/// at the end of every loop iteration.
pub struct WorkerTx<'a, P: PortIo> {
    io: &'a mut P,
    batches: &'a mut [ArrayVec<Packet<FrameBuffer>, TX_BURST>],
    stats: &'a WorkerStats,
}

impl<'a, P: PortIo> WorkerTx<'a, P> {
    pub(crate) fn new(
        io: &'a mut P,
        batches: &'a mut [ArrayVec<Packet<FrameBuffer>, TX_BURST>],
        stats: &'a WorkerStats,
    ) -> Self {
        WorkerTx { io, batches, stats }
    }

    /// Worker stats block, shared with the packet processors.
    pub(crate) fn stats(&self) -> &'a WorkerStats {
        self.stats
    }

    fn flush(&mut self, port: u16) {
        flush_port(self.io, &mut self.batches[usize::from(port)], port, self.stats);
    }
}

impl<P: PortIo> TxSink<FrameBuffer> for WorkerTx<'_, P> {
    fn transmit(&mut self, port: u16, pkt: Packet<FrameBuffer>) {
        let batch = &mut self.batches[usize::from(port)];
        batch.push(pkt);
        if batch.is_full() {
            self.flush(port);
        }
    }

    fn port_mac(&self, port: u16) -> Mac {
        self.io.port_mac(port)
    }
}

fn flush_port<P: PortIo>(
    io: &mut P,
    batch: &mut ArrayVec<Packet<FrameBuffer>, TX_BURST>,
    port: u16,
    stats: &WorkerStats,
) {
    if batch.is_empty() {
        return;
    }
    io.tx_burst(port, batch);
    // Whatever the NIC refused is dropped here, not retried.
    if !batch.is_empty() {
        stats.drop_tx_notsent.add(batch.len() as u64);
        batch.clear();
    }
}

/// One pinned data-path thread and its private queues.
pub struct Worker<P: PortIo> {
    id: u32,
    io: P,
    batches: Vec<ArrayVec<Packet<FrameBuffer>, TX_BURST>>,
    config: Arc<Configuration>,
    slot: Arc<ConfigSlot>,
    stats: Arc<WorkerStats>,
    stop: Arc<AtomicBool>,
}

impl<P: PortIo> Worker<P> {
    /// Assemble a worker around its I/O endpoint and initial
    /// configuration.
    pub fn new(
        id: u32,
        io: P,
        config: Arc<Configuration>,
        slot: Arc<ConfigSlot>,
        stats: Arc<WorkerStats>,
        stop: Arc<AtomicBool>,
    ) -> Self {
        let num_ports = usize::from(io.num_ports());
        Worker {
            id,
            io,
            batches: (0..num_ports).map(|_| ArrayVec::new()).collect(),
            config,
            slot,
            stats,
            stop,
        }
    }

    /// The active configuration (test hook).
    pub fn config(&self) -> &Arc<Configuration> {
        &self.config
    }

    /// Run until the stop flag is raised.
    pub fn run(&mut self) {
        info!("worker {} entering the forwarding loop", self.id);
        while !self.stop.load(Ordering::Relaxed) {
            self.iterate();
        }
        // Drain anything batched before the thread ends.
        let num_ports = self.io.num_ports();
        for port in 0..num_ports {
            flush_port(
                &mut self.io,
                &mut self.batches[usize::from(port)],
                port,
                &self.stats,
            );
        }
        info!("worker {} stopped", self.id);
    }

    /// One full loop iteration: publish the `used` handshake, RX burst
    /// and dispatch per port, flush per port, pick up a pending
    /// configuration.
    pub fn iterate(&mut self) {
        // Release-store: the coordinator may now reclaim the predecessor.
        self.config.mark_used();

        let num_ports = self.io.num_ports();
        for port in 0..num_ports {
            self.handle_port(port);
        }
        for port in 0..num_ports {
            flush_port(
                &mut self.io,
                &mut self.batches[usize::from(port)],
                port,
                &self.stats,
            );
        }

        if let Some(next) = self.slot.take() {
            debug!("worker {} switching to a new configuration", self.id);
            self.config = next;
        }
    }

    fn handle_port(&mut self, port: u16) {
        let mut pkts: ArrayVec<Packet<FrameBuffer>, RX_BURST> = ArrayVec::new();
        if self.io.rx_burst(port, &mut pkts) == 0 {
            return;
        }

        let config = Arc::clone(&self.config);
        let mut sink = WorkerTx::new(&mut self.io, &mut self.batches, &self.stats);
        let mut iter = pkts.into_iter().peekable();
        while let Some(pkt) = iter.next() {
            if let Some(next) = iter.peek() {
                prefetch(next.frame());
            }
            packet_processor::dispatch(pkt, port, &config, &mut sink, self.id);
        }
    }
}

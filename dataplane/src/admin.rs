// SPDX-License-Identifier: Apache-2.0
// Copyright Natplane Contributors

//! Admin backend: wires the admin channel to the workers, the reload
//! slots and the driver counters.

use crate::drivers::PortStatsSource;
use config::ConfigSlot;
use mgmt::{AdminBackend, AdminError, ReloadError, reload_workers};
use stats::{AppStatsSnapshot, PortStats, WorkerStats};
use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use tracing::info;

pub struct Backend {
    /// Path the `reload` command re-reads.
    pub config_path: PathBuf,
    /// Port count the configuration is validated against.
    pub num_ports: u16,
    /// Per-worker reload slots, worker order.
    pub slots: Vec<Arc<ConfigSlot>>,
    /// Per-worker counter blocks, worker order.
    pub worker_stats: Vec<Arc<WorkerStats>>,
    /// Worker thread handles, for liveness checks and shutdown join.
    pub workers: Vec<JoinHandle<()>>,
    /// NIC counter access shared with the drivers.
    pub port_counters: Arc<dyn PortStatsSource>,
    /// The global stop flag workers poll.
    pub stop: Arc<AtomicBool>,
}

impl AdminBackend for Backend {
    fn version(&self) -> String {
        format!("natplane {}", env!("CARGO_PKG_VERSION"))
    }

    fn reload(&mut self) -> Result<usize, AdminError> {
        let doc = config::load_document(&self.config_path).map_err(ReloadError::Config)?;
        let report = reload_workers(&doc, self.num_ports, &self.slots, |w| {
            self.workers.get(w).is_some_and(|h| !h.is_finished())
        })?;
        info!(
            "configuration reloaded: {} nat rules on {} workers",
            report.nat_rules, report.workers
        );
        Ok(report.nat_rules)
    }

    fn app_stats(&self) -> Vec<(u8, AppStatsSnapshot)> {
        self.worker_stats
            .iter()
            .enumerate()
            .map(|(id, stats)| (u8::try_from(id).unwrap_or(u8::MAX), stats.snapshot()))
            .collect()
    }

    fn port_stats(&self) -> Vec<PortStats> {
        (0..self.num_ports)
            .map(|port| self.port_counters.port_stats(port))
            .collect()
    }

    fn port_xstats(&self) -> String {
        let mut out = String::new();
        for port in 0..self.num_ports {
            let _ = write!(out, "port {port}: ");
            let xstats = self.port_counters.port_xstats(port);
            let mut first = true;
            for (name, value) in xstats {
                if value != 0 || first {
                    if !first {
                        let _ = write!(out, ",");
                    }
                    let _ = write!(out, "{name}={value}");
                    first = false;
                }
            }
            let _ = writeln!(out);
        }
        out
    }

    fn reset_port_stats(&mut self) -> Result<(), AdminError> {
        self.port_counters.reset();
        Ok(())
    }

    fn workers_alive(&self) -> usize {
        self.workers.iter().filter(|h| !h.is_finished()).count()
    }

    fn request_shutdown(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

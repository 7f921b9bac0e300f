// SPDX-License-Identifier: Apache-2.0
// Copyright Natplane Contributors

//! The live-reload coordinator.
//!
//! A reload builds one fresh [`Configuration`] per worker off the
//! critical path, then walks the workers in fixed order: publish into the
//! worker's slot, spin (yielding) until the worker's release-store of the
//! `used` flag proves it installed the bundle and ran an iteration with
//! it, then move on. Reclamation of the predecessor is the `Arc` drop in
//! the worker's swap; the coordinator never frees a configuration a
//! worker still references.
//!
//! All candidate configurations are built before anything is published,
//! so a parse, validation or allocation failure aborts with every worker
//! still on its old bundle.

use config::{ConfigDoc, ConfigError, ConfigSlot, Configuration, build};
use std::sync::Arc;
use tracing::{debug, info};

/// Errors surfaced by a reload attempt.
#[derive(Debug, thiserror::Error)]
pub enum ReloadError {
    /// The candidate configuration did not load; nothing was published.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// A worker died while the coordinator waited for its handshake.
    #[error("worker {worker} died during reload")]
    WorkerDead {
        /// Index of the dead worker.
        worker: usize,
    },
}

/// Outcome of a successful reload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReloadReport {
    /// NAT rules in the new configuration.
    pub nat_rules: usize,
    /// Workers that adopted it.
    pub workers: usize,
}

/// Build per-worker configurations from `doc` and hand them to the
/// workers behind `slots`. `worker_alive` lets the spin-wait detect a
/// dead worker instead of hanging the control thread forever.
pub fn reload_workers<F>(
    doc: &ConfigDoc,
    num_ports: u16,
    slots: &[Arc<ConfigSlot>],
    worker_alive: F,
) -> Result<ReloadReport, ReloadError>
where
    F: Fn(usize) -> bool,
{
    let fresh = slots
        .iter()
        .map(|_| build(doc, num_ports).map(Arc::new))
        .collect::<Result<Vec<Arc<Configuration>>, ConfigError>>()?;
    let nat_rules = fresh.first().map_or(0, |cfg| cfg.nat.rule_count());

    for (worker, (slot, cfg)) in slots.iter().zip(fresh).enumerate() {
        slot.publish(Arc::clone(&cfg));
        debug!("reload: configuration published to worker {worker}");
        while !cfg.is_used() {
            if !worker_alive(worker) {
                return Err(ReloadError::WorkerDead { worker });
            }
            std::thread::yield_now();
        }
        debug!("reload: worker {worker} adopted the new configuration");
    }

    info!(
        "reload complete: {} workers, {} nat rules",
        slots.len(),
        nat_rules
    );
    Ok(ReloadReport {
        nat_rules,
        workers: slots.len(),
    })
}

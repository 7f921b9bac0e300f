// SPDX-License-Identifier: Apache-2.0
// Copyright Natplane Contributors

//! The seam between the admin server and the process it controls.

use crate::reload::ReloadError;
use stats::{AppStatsSnapshot, PortStats};

/// Errors an [`AdminBackend`] operation can surface to the admin client.
#[derive(Debug, thiserror::Error)]
pub enum AdminError {
    /// Reload failed; the running configuration is untouched.
    #[error(transparent)]
    Reload(#[from] ReloadError),
    /// An I/O layer operation failed.
    #[error("driver error: {0}")]
    Driver(String),
}

/// Operations the admin channel can invoke. Implemented by the binary,
/// which wires the drivers, workers and reload slots together.
pub trait AdminBackend {
    /// Version string for the `version` command.
    fn version(&self) -> String;

    /// Run a full reload cycle; returns the number of NAT rules in the
    /// new configuration.
    fn reload(&mut self) -> Result<usize, AdminError>;

    /// Per-worker application counters, `(worker_id, counters)`.
    fn app_stats(&self) -> Vec<(u8, AppStatsSnapshot)>;

    /// Per-port NIC counters, indexed by port.
    fn port_stats(&self) -> Vec<PortStats>;

    /// Extended NIC counters, rendered as `name=value` text.
    fn port_xstats(&self) -> String;

    /// Zero the NIC counters on every port.
    fn reset_port_stats(&mut self) -> Result<(), AdminError>;

    /// Number of worker threads still running. Zero makes the admin
    /// server exit; a shrinking count is logged loudly.
    fn workers_alive(&self) -> usize;

    /// Ask the data path to stop at the next iteration boundary.
    fn request_shutdown(&mut self);
}

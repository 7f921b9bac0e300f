// SPDX-License-Identifier: Apache-2.0
// Copyright Natplane Contributors

#![deny(clippy::all, clippy::pedantic, clippy::unwrap_used, clippy::expect_used)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]

//! The control plane: admin command channel and reload coordination.
//!
//! The admin server owns the process's only blocking I/O: a loopback TCP
//! socket polled with a one-second timeout so worker liveness is checked
//! even when no client talks. Commands are dispatched to an
//! [`AdminBackend`] implemented by the binary; `reload` runs the
//! coordinator that hands fresh configurations to each worker and waits
//! for the adoption handshake.

mod backend;
pub mod proto;
mod reload;
mod server;

pub use backend::{AdminBackend, AdminError};
pub use reload::{ReloadError, ReloadReport, reload_workers};
pub use server::run_admin_server;

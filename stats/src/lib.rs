// SPDX-License-Identifier: Apache-2.0
// Copyright Natplane Contributors

#![deny(clippy::all, clippy::pedantic)]
#![allow(clippy::must_use_candidate)]

//! Per-worker and per-port counters.
//!
//! Each worker owns one [`WorkerStats`] block in its own cache line and is
//! its only writer; counters are relaxed atomics so any thread may read a
//! best-effort snapshot without synchronisation. Per-port NIC counters are
//! produced by the I/O layer and aggregated here.

mod app;
mod port;

pub use app::{AppStatsSnapshot, Counter, WorkerStats};
pub use port::PortStats;

// SPDX-License-Identifier: Apache-2.0
// Copyright Natplane Contributors

#![deny(clippy::all, clippy::pedantic, clippy::unwrap_used, clippy::expect_used)]
#![allow(clippy::must_use_candidate)]

//! The per-packet rule engine.
//!
//! A [`Rule`] tree expresses conditional chains of match/action per packet;
//! [`execute`] walks it leftmost-first with short-circuit evaluation, and
//! every action resolves to a [`Verdict`]: either the packet continues to
//! the next node or processing terminates because the packet was emitted or
//! dropped. Packet buffers are moved, never leaked: a `Terminal` verdict
//! means the packet was handed to a [`TxSink`] or released.

mod actions;
mod conds;
mod exec;
mod nat;
mod rule;
mod sink;

pub use exec::{RuleCtx, execute};
pub use rule::{Action, NatField, OutPort, Predicate, Rule, Verdict};
pub use sink::TxSink;

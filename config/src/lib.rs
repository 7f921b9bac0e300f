// SPDX-License-Identifier: Apache-2.0
// Copyright Natplane Contributors

#![deny(clippy::all, clippy::pedantic, clippy::unwrap_used, clippy::expect_used)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]

//! Configuration for the NAT data-plane.
//!
//! The on-disk document is a declarative serde model (the parse tree
//! produced by the external format layer); [`loader`] validates it and
//! builds the immutable runtime [`Configuration`] bundle — ports table,
//! NAT table, rule tree — that workers execute. A fresh `Configuration`
//! is built per worker so the `used` handshake of the reload protocol is
//! exact: the coordinator knows *this* worker ran an iteration on *this*
//! instance before the previous one is released.

pub mod doc;
pub mod loader;
pub mod runtime;
pub mod slot;

pub use doc::ConfigDoc;
pub use loader::{ConfigError, build, load_document};
pub use runtime::{Configuration, IpVlan, PortConfig};
pub use slot::ConfigSlot;

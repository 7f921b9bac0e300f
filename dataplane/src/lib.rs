// SPDX-License-Identifier: Apache-2.0
// Copyright Natplane Contributors

#![deny(clippy::all)]

//! Data-path assembly of the natplane NAT: port drivers, the per-core
//! worker loop, the L2/L3 packet processors, and the admin backend glue.
//! The `natplane` binary wires these together; integration tests drive
//! the same pieces against the sim driver.

pub mod admin;
pub mod drivers;
pub mod packet_processor;
pub mod worker;

// SPDX-License-Identifier: Apache-2.0
// Copyright Natplane Contributors

#![deny(clippy::all, clippy::pedantic)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]

//! The 1:1 address translation table.
//!
//! A [`NatTable`] maps IPv4 addresses to IPv4 addresses in both
//! directions: installing the pair `(A, B)` makes `lookup(A) = B` and
//! `lookup(B) = A`. Lookup is three dependent loads with no hashing and no
//! locking; the table is built off the hot path and immutable once
//! published to workers.

mod table;

pub use table::{NatTable, NatTableError};

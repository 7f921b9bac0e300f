// SPDX-License-Identifier: Apache-2.0
// Copyright Natplane Contributors

//! Application drop/error counters, one block per worker.

use std::fmt::Display;
use std::sync::atomic::{AtomicU64, Ordering};

/// A single-writer, multi-reader event counter.
#[derive(Debug, Default)]
#[repr(transparent)]
pub struct Counter(AtomicU64);

impl Counter {
    /// Increment by one.
    #[inline]
    pub fn bump(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment by `n`.
    #[inline]
    pub fn add(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    /// Best-effort read.
    #[inline]
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// The per-worker block of drop/error event counters. Aligned to a
/// cache line so neighbouring workers never false-share.
#[derive(Debug, Default)]
#[repr(align(64))]
pub struct WorkerStats {
    /// NAT rewrite found no translation for the address.
    pub drop_no_rule: Counter,
    /// Packet dropped by the rule language's `drop` action.
    pub drop_nat_condition: Counter,
    /// NIC reported a bad IPv4 header checksum on receive.
    pub drop_bad_l3_cksum: Counter,
    /// NIC reported a bad L4 checksum on receive.
    pub rx_bad_l4_cksum: Counter,
    /// ICMP addressed to us with a type we do not answer.
    pub drop_unknown_icmp: Counter,
    /// Ethertype other than IPv4/ARP.
    pub drop_unhandled_ethertype: Counter,
    /// NIC accepted fewer packets than the TX flush offered.
    pub drop_tx_notsent: Counter,
}

impl WorkerStats {
    /// A zeroed block.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy the counters into a plain struct. Tearing across counters is
    /// acceptable; each individual read is atomic.
    pub fn snapshot(&self) -> AppStatsSnapshot {
        AppStatsSnapshot {
            drop_no_rule: self.drop_no_rule.get(),
            drop_nat_condition: self.drop_nat_condition.get(),
            drop_bad_l3_cksum: self.drop_bad_l3_cksum.get(),
            rx_bad_l4_cksum: self.rx_bad_l4_cksum.get(),
            drop_unknown_icmp: self.drop_unknown_icmp.get(),
            drop_unhandled_ethertype: self.drop_unhandled_ethertype.get(),
            drop_tx_notsent: self.drop_tx_notsent.get(),
        }
    }
}

/// A point-in-time copy of one worker's counters, also used as the
/// accumulator for cross-worker sums.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AppStatsSnapshot {
    /// See [`WorkerStats::drop_no_rule`].
    pub drop_no_rule: u64,
    /// See [`WorkerStats::drop_nat_condition`].
    pub drop_nat_condition: u64,
    /// See [`WorkerStats::drop_bad_l3_cksum`].
    pub drop_bad_l3_cksum: u64,
    /// See [`WorkerStats::rx_bad_l4_cksum`].
    pub rx_bad_l4_cksum: u64,
    /// See [`WorkerStats::drop_unknown_icmp`].
    pub drop_unknown_icmp: u64,
    /// See [`WorkerStats::drop_unhandled_ethertype`].
    pub drop_unhandled_ethertype: u64,
    /// See [`WorkerStats::drop_tx_notsent`].
    pub drop_tx_notsent: u64,
}

impl AppStatsSnapshot {
    /// Number of `u64` fields in the wire encoding.
    pub const FIELDS: usize = 7;
    /// Size of the wire encoding in bytes.
    pub const WIRE_LEN: usize = Self::FIELDS * 8;

    /// Add `other` into `self`, field by field.
    pub fn merge(&mut self, other: &AppStatsSnapshot) {
        self.drop_no_rule += other.drop_no_rule;
        self.drop_nat_condition += other.drop_nat_condition;
        self.drop_bad_l3_cksum += other.drop_bad_l3_cksum;
        self.rx_bad_l4_cksum += other.rx_bad_l4_cksum;
        self.drop_unknown_icmp += other.drop_unknown_icmp;
        self.drop_unhandled_ethertype += other.drop_unhandled_ethertype;
        self.drop_tx_notsent += other.drop_tx_notsent;
    }

    /// Big-endian wire encoding, field order as declared.
    pub fn to_be_bytes(&self) -> [u8; Self::WIRE_LEN] {
        let mut out = [0u8; Self::WIRE_LEN];
        for (i, value) in [
            self.drop_no_rule,
            self.drop_nat_condition,
            self.drop_bad_l3_cksum,
            self.rx_bad_l4_cksum,
            self.drop_unknown_icmp,
            self.drop_unhandled_ethertype,
            self.drop_tx_notsent,
        ]
        .into_iter()
        .enumerate()
        {
            out[i * 8..(i + 1) * 8].copy_from_slice(&value.to_be_bytes());
        }
        out
    }
}

impl Display for AppStatsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "drop_no_rule={}, drop_nat_condition={}, drop_tx_notsent={}, \
             drop_bad_l3_cksum={}, rx_bad_l4_cksum={}, drop_unhandled_ethertype={}, \
             drop_unknown_icmp={}",
            self.drop_no_rule,
            self.drop_nat_condition,
            self.drop_tx_notsent,
            self.drop_bad_l3_cksum,
            self.rx_bad_l4_cksum,
            self.drop_unhandled_ethertype,
            self.drop_unknown_icmp
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn bump_and_snapshot() {
        let stats = WorkerStats::new();
        stats.drop_no_rule.bump();
        stats.drop_no_rule.bump();
        stats.drop_tx_notsent.add(3);
        let snap = stats.snapshot();
        assert_eq!(snap.drop_no_rule, 2);
        assert_eq!(snap.drop_tx_notsent, 3);
        assert_eq!(snap.drop_unknown_icmp, 0);
    }

    #[test]
    fn merge_sums_fields() {
        let mut total = AppStatsSnapshot::default();
        let one = AppStatsSnapshot {
            drop_no_rule: 1,
            drop_nat_condition: 2,
            ..Default::default()
        };
        total.merge(&one);
        total.merge(&one);
        assert_eq!(total.drop_no_rule, 2);
        assert_eq!(total.drop_nat_condition, 4);
    }

    #[test]
    fn wire_encoding_is_big_endian() {
        let snap = AppStatsSnapshot {
            drop_no_rule: 0x0102_0304_0506_0708,
            ..Default::default()
        };
        let bytes = snap.to_be_bytes();
        assert_eq!(bytes.len(), AppStatsSnapshot::WIRE_LEN);
        assert_eq!(&bytes[..8], &[1, 2, 3, 4, 5, 6, 7, 8]);
        assert!(bytes[8..].iter().all(|&b| b == 0));
    }

    #[test]
    fn block_is_cache_line_aligned() {
        assert!(align_of::<WorkerStats>() >= 64);
    }
}

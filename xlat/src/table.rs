// SPDX-License-Identifier: Apache-2.0
// Copyright Natplane Contributors

//! Three-level direct-indexed translation table.
//!
//! An address `a.b.c.d` is resolved as `root[a] -> mid[b] -> leaf[c<<8|d]`.
//! Levels are allocated lazily on insert and zero-filled; the zero word
//! means "no entry", which is why 0.0.0.0 is rejected as a translation
//! endpoint. Worst-case memory for a fully populated table is 64 MiB of
//! leaves, sparse in practice because only touched rows exist.

use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicU64, Ordering};

const L1_SIZE: usize = 256;
const L2_SIZE: usize = 256;
const L3_SIZE: usize = 1 << 16;

/// Errors raised while building a [`NatTable`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NatTableError {
    /// 0.0.0.0 encodes "no entry" and cannot appear in a pair.
    #[error("0.0.0.0 is reserved and cannot be used in a NAT pair")]
    ReservedAddress,
}

struct Leaf {
    // 0 = absent. Stored host-endian; conversion happens at the edges.
    targets: Box<[u32]>,
    bytes: Option<Box<[AtomicU64]>>,
}

impl Leaf {
    fn new(accounting: bool) -> Self {
        Leaf {
            targets: vec![0u32; L3_SIZE].into_boxed_slice(),
            bytes: accounting.then(|| {
                (0..L3_SIZE)
                    .map(|_| AtomicU64::new(0))
                    .collect::<Vec<_>>()
                    .into_boxed_slice()
            }),
        }
    }
}

struct Mid {
    leaves: Vec<Option<Box<Leaf>>>,
}

impl Mid {
    fn new() -> Self {
        let mut leaves = Vec::with_capacity(L2_SIZE);
        leaves.resize_with(L2_SIZE, || None);
        Mid { leaves }
    }
}

/// The bidirectional 1:1 IPv4 translation table.
pub struct NatTable {
    roots: Vec<Option<Box<Mid>>>,
    entries: usize,
    accounting: bool,
}

#[inline]
fn split(addr: u32) -> (usize, usize, usize) {
    // The low index is (addr & 0xff00) | (addr & 0xff), i.e. the last two
    // bytes verbatim.
    (
        (addr >> 24) as usize,
        ((addr >> 16) & 0xff) as usize,
        (addr & 0xffff) as usize,
    )
}

impl NatTable {
    /// An empty table without per-entry traffic accounting.
    pub fn new() -> Self {
        Self::with_accounting(false)
    }

    /// An empty table; `accounting` enables the 64-bit byte counter kept
    /// per directional entry.
    pub fn with_accounting(accounting: bool) -> Self {
        let mut roots = Vec::with_capacity(L1_SIZE);
        roots.resize_with(L1_SIZE, || None);
        NatTable {
            roots,
            entries: 0,
            accounting,
        }
    }

    /// Pure O(1) lookup: three dependent loads.
    #[inline]
    pub fn lookup(&self, addr: Ipv4Addr) -> Option<Ipv4Addr> {
        let (a, b, low) = split(u32::from(addr));
        let leaf = self.roots[a].as_ref()?.leaves[b].as_ref()?;
        match leaf.targets[low] {
            0 => None,
            target => Some(Ipv4Addr::from(target)),
        }
    }

    /// Lookup plus traffic accounting: on a hit, `bytes` is added to the
    /// entry's byte counter (when accounting is enabled).
    #[inline]
    pub fn translate(&self, addr: Ipv4Addr, bytes: u64) -> Option<Ipv4Addr> {
        let (a, b, low) = split(u32::from(addr));
        let leaf = self.roots[a].as_ref()?.leaves[b].as_ref()?;
        match leaf.targets[low] {
            0 => None,
            target => {
                if let Some(counters) = &leaf.bytes {
                    counters[low].fetch_add(bytes, Ordering::Relaxed);
                }
                Some(Ipv4Addr::from(target))
            }
        }
    }

    /// Bytes accounted against `addr`'s entry so far, if the entry exists
    /// and accounting is enabled.
    pub fn bytes_for(&self, addr: Ipv4Addr) -> Option<u64> {
        let (a, b, low) = split(u32::from(addr));
        let leaf = self.roots[a].as_ref()?.leaves[b].as_ref()?;
        if leaf.targets[low] == 0 {
            return None;
        }
        leaf.bytes
            .as_ref()
            .map(|counters| counters[low].load(Ordering::Relaxed))
    }

    fn insert(&mut self, key: u32, value: u32) {
        let (a, b, low) = split(key);
        let accounting = self.accounting;
        let mid = self.roots[a].get_or_insert_with(|| Box::new(Mid::new()));
        let leaf = mid.leaves[b].get_or_insert_with(|| Box::new(Leaf::new(accounting)));
        if leaf.targets[low] == 0 {
            self.entries += 1;
        }
        leaf.targets[low] = value;
    }

    /// Install both directions of the pair `(a, b)`, allocating rows on
    /// demand. Re-inserting an existing key overwrites its target.
    pub fn insert_pair(&mut self, a: Ipv4Addr, b: Ipv4Addr) -> Result<(), NatTableError> {
        let (a, b) = (u32::from(a), u32::from(b));
        if a == 0 || b == 0 {
            return Err(NatTableError::ReservedAddress);
        }
        self.insert(a, b);
        self.insert(b, a);
        Ok(())
    }

    /// Number of directional entries. Each configured pair accounts for
    /// two.
    pub fn entry_count(&self) -> usize {
        self.entries
    }

    /// Number of configured pairs.
    pub fn rule_count(&self) -> usize {
        self.entries / 2
    }

    /// True iff no pair is installed.
    pub fn is_empty(&self) -> bool {
        self.entries == 0
    }

    /// Visit every directional entry. A pair `(A, B)` is yielded twice,
    /// once per direction.
    pub fn iter(&self) -> impl Iterator<Item = (Ipv4Addr, Ipv4Addr)> + '_ {
        self.roots
            .iter()
            .enumerate()
            .filter_map(|(a, mid)| mid.as_ref().map(|mid| (a, mid)))
            .flat_map(|(a, mid)| {
                mid.leaves
                    .iter()
                    .enumerate()
                    .filter_map(|(b, leaf)| leaf.as_ref().map(|leaf| (b, leaf)))
                    .flat_map(move |(b, leaf)| {
                        leaf.targets
                            .iter()
                            .enumerate()
                            .filter(|&(_, &target)| target != 0)
                            .map(move |(low, &target)| {
                                #[allow(clippy::cast_possible_truncation)]
                                let from = ((a as u32) << 24) | ((b as u32) << 16) | low as u32;
                                (Ipv4Addr::from(from), Ipv4Addr::from(target))
                            })
                    })
            })
    }

    /// Render the table as `from -> to` lines, one per directional entry.
    pub fn dump(&self) -> String {
        use std::fmt::Write;
        let mut out = String::new();
        for (from, to) in self.iter() {
            let _ = writeln!(out, "{from} -> {to}");
        }
        out
    }

    /// Drop every row, returning the memory. The table is reusable.
    pub fn reset(&mut self) {
        for mid in &mut self.roots {
            *mid = None;
        }
        self.entries = 0;
    }
}

impl Default for NatTable {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for NatTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NatTable")
            .field("entries", &self.entries)
            .field("accounting", &self.accounting)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod test {
    use super::*;

    #[test]
    fn pair_closure() {
        let mut table = NatTable::new();
        let a = Ipv4Addr::new(10, 0, 0, 5);
        let b = Ipv4Addr::new(212, 47, 0, 5);
        table.insert_pair(a, b).unwrap();
        assert_eq!(table.lookup(a), Some(b));
        assert_eq!(table.lookup(b), Some(a));
        assert_eq!(table.rule_count(), 1);
        assert_eq!(table.entry_count(), 2);
    }

    #[test]
    fn pair_closure_holds_for_arbitrary_pairs() {
        bolero::check!()
            .with_type()
            .for_each(|pairs: &Vec<(u32, u32)>| {
                let mut table = NatTable::new();
                let mut installed = Vec::new();
                for &(a, b) in pairs {
                    if a == 0 || b == 0 {
                        continue;
                    }
                    let (a, b) = (Ipv4Addr::from(a), Ipv4Addr::from(b));
                    table.insert_pair(a, b).unwrap();
                    installed.push((a, b));
                }
                // Later inserts may overwrite earlier keys; the law holds
                // for the final write of each key.
                for &(a, b) in installed.iter().rev() {
                    if table.lookup(a) == Some(b) {
                        assert_eq!(table.lookup(b), Some(a));
                    }
                }
            });
    }

    #[test]
    fn miss_returns_none() {
        let mut table = NatTable::new();
        table
            .insert_pair(Ipv4Addr::new(10, 0, 0, 5), Ipv4Addr::new(212, 47, 0, 5))
            .unwrap();
        assert_eq!(table.lookup(Ipv4Addr::new(9, 9, 9, 9)), None);
        // Same leaf row, different low bytes.
        assert_eq!(table.lookup(Ipv4Addr::new(10, 0, 0, 6)), None);
        assert_eq!(table.lookup(Ipv4Addr::new(0, 0, 0, 0)), None);
    }

    #[test]
    fn reserved_address_rejected() {
        let mut table = NatTable::new();
        let zero = Ipv4Addr::new(0, 0, 0, 0);
        let ok = Ipv4Addr::new(10, 0, 0, 1);
        assert_eq!(
            table.insert_pair(zero, ok),
            Err(NatTableError::ReservedAddress)
        );
        assert_eq!(
            table.insert_pair(ok, zero),
            Err(NatTableError::ReservedAddress)
        );
        assert!(table.is_empty());
    }

    #[test]
    fn iterate_visits_both_directions() {
        let mut table = NatTable::new();
        table
            .insert_pair(Ipv4Addr::new(10, 0, 0, 5), Ipv4Addr::new(212, 47, 0, 5))
            .unwrap();
        table
            .insert_pair(Ipv4Addr::new(10, 0, 0, 6), Ipv4Addr::new(212, 47, 0, 6))
            .unwrap();
        let mut entries: Vec<_> = table.iter().collect();
        entries.sort();
        assert_eq!(entries.len(), 4);
        assert!(entries.contains(&(Ipv4Addr::new(10, 0, 0, 5), Ipv4Addr::new(212, 47, 0, 5))));
        assert!(entries.contains(&(Ipv4Addr::new(212, 47, 0, 5), Ipv4Addr::new(10, 0, 0, 5))));
        assert_eq!(table.dump().lines().count(), 4);
    }

    #[test]
    fn reinsert_overwrites_without_double_count() {
        let mut table = NatTable::new();
        let a = Ipv4Addr::new(10, 0, 0, 5);
        table.insert_pair(a, Ipv4Addr::new(212, 47, 0, 5)).unwrap();
        table.insert_pair(a, Ipv4Addr::new(212, 47, 0, 9)).unwrap();
        assert_eq!(table.lookup(a), Some(Ipv4Addr::new(212, 47, 0, 9)));
        // 10.0.0.5, 212.47.0.5 and 212.47.0.9 are populated keys.
        assert_eq!(table.entry_count(), 3);
    }

    #[test]
    fn reset_frees_rows() {
        let mut table = NatTable::new();
        table
            .insert_pair(Ipv4Addr::new(10, 0, 0, 5), Ipv4Addr::new(212, 47, 0, 5))
            .unwrap();
        table.reset();
        assert!(table.is_empty());
        assert_eq!(table.lookup(Ipv4Addr::new(10, 0, 0, 5)), None);
        assert_eq!(table.iter().count(), 0);
        // The table stays usable after a reset.
        table
            .insert_pair(Ipv4Addr::new(10, 0, 0, 7), Ipv4Addr::new(212, 47, 0, 7))
            .unwrap();
        assert_eq!(table.entry_count(), 2);
    }

    #[test]
    fn accounting_accumulates_per_direction() {
        let mut table = NatTable::with_accounting(true);
        let a = Ipv4Addr::new(10, 0, 0, 5);
        let b = Ipv4Addr::new(212, 47, 0, 5);
        table.insert_pair(a, b).unwrap();
        assert_eq!(table.translate(a, 100), Some(b));
        assert_eq!(table.translate(a, 28), Some(b));
        assert_eq!(table.translate(b, 1000), Some(a));
        assert_eq!(table.bytes_for(a), Some(128));
        assert_eq!(table.bytes_for(b), Some(1000));
        assert_eq!(table.bytes_for(Ipv4Addr::new(9, 9, 9, 9)), None);
    }

    #[test]
    fn accounting_disabled_reads_none() {
        let mut table = NatTable::new();
        let a = Ipv4Addr::new(10, 0, 0, 5);
        table.insert_pair(a, Ipv4Addr::new(212, 47, 0, 5)).unwrap();
        assert_eq!(table.translate(a, 100), Some(Ipv4Addr::new(212, 47, 0, 5)));
        assert_eq!(table.bytes_for(a), None);
    }
}

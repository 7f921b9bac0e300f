// SPDX-License-Identifier: Apache-2.0
// Copyright Natplane Contributors

//! Per-port NIC counters as reported by the I/O layer.

use std::fmt::Display;

/// Basic receive/transmit counters for one port. Field order matches the
/// admin wire encoding.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PortStats {
    /// Successfully received packets.
    pub ipackets: u64,
    /// Successfully transmitted packets.
    pub opackets: u64,
    /// Successfully received bytes.
    pub ibytes: u64,
    /// Successfully transmitted bytes.
    pub obytes: u64,
    /// RX packets dropped by the hardware (queues full).
    pub imissed: u64,
    /// Erroneous received packets.
    pub ierrors: u64,
    /// Failed transmissions.
    pub oerrors: u64,
    /// RX buffer allocation failures.
    pub rx_nombuf: u64,
}

impl PortStats {
    /// Number of `u64` fields in the wire encoding.
    pub const FIELDS: usize = 8;
    /// Size of the wire encoding in bytes.
    pub const WIRE_LEN: usize = Self::FIELDS * 8;

    /// Add `other` into `self`, field by field. Used to aggregate the
    /// per-queue counters of one port across workers.
    pub fn merge(&mut self, other: &PortStats) {
        self.ipackets += other.ipackets;
        self.opackets += other.opackets;
        self.ibytes += other.ibytes;
        self.obytes += other.obytes;
        self.imissed += other.imissed;
        self.ierrors += other.ierrors;
        self.oerrors += other.oerrors;
        self.rx_nombuf += other.rx_nombuf;
    }

    /// Big-endian wire encoding, field order as declared.
    pub fn to_be_bytes(&self) -> [u8; Self::WIRE_LEN] {
        let mut out = [0u8; Self::WIRE_LEN];
        for (i, value) in [
            self.ipackets,
            self.opackets,
            self.ibytes,
            self.obytes,
            self.imissed,
            self.ierrors,
            self.oerrors,
            self.rx_nombuf,
        ]
        .into_iter()
        .enumerate()
        {
            out[i * 8..(i + 1) * 8].copy_from_slice(&value.to_be_bytes());
        }
        out
    }
}

impl Display for PortStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "ipackets={},opackets={},ibytes={},obytes={},ierrors={},oerrors={},\
             imissed={},rx_nombuf={}",
            self.ipackets,
            self.opackets,
            self.ibytes,
            self.obytes,
            self.ierrors,
            self.oerrors,
            self.imissed,
            self.rx_nombuf
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn merge_and_encode() {
        let mut total = PortStats::default();
        total.merge(&PortStats {
            ipackets: 10,
            ibytes: 1000,
            ..Default::default()
        });
        total.merge(&PortStats {
            ipackets: 5,
            oerrors: 1,
            ..Default::default()
        });
        assert_eq!(total.ipackets, 15);
        assert_eq!(total.ibytes, 1000);
        assert_eq!(total.oerrors, 1);

        let bytes = total.to_be_bytes();
        assert_eq!(&bytes[..8], &15u64.to_be_bytes());
        assert_eq!(&bytes[48..56], &1u64.to_be_bytes());
    }
}

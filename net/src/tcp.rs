// SPDX-License-Identifier: Apache-2.0
// Copyright Natplane Contributors

//! TCP header view. Only the fields the NAT path touches are exposed.

use crate::Truncated;

/// View over a TCP header.
pub struct TcpHdr<T> {
    bytes: T,
}

impl<T: AsRef<[u8]>> TcpHdr<T> {
    /// Minimum header length.
    pub const MIN_LEN: usize = 20;

    /// Build a view over `bytes`, which must start at the TCP header.
    pub fn new(bytes: T) -> Result<Self, Truncated> {
        let have = bytes.as_ref().len();
        if have < Self::MIN_LEN {
            return Err(Truncated {
                header: "tcp",
                need: Self::MIN_LEN,
                have,
            });
        }
        Ok(TcpHdr { bytes })
    }

    /// Source port.
    pub fn src_port(&self) -> u16 {
        let b = self.bytes.as_ref();
        u16::from_be_bytes([b[0], b[1]])
    }

    /// Destination port.
    pub fn dst_port(&self) -> u16 {
        let b = self.bytes.as_ref();
        u16::from_be_bytes([b[2], b[3]])
    }

    /// Flag bits (CWR..FIN).
    pub fn flags(&self) -> u8 {
        self.bytes.as_ref()[13]
    }

    /// Checksum, host byte order.
    pub fn checksum(&self) -> u16 {
        let b = self.bytes.as_ref();
        u16::from_be_bytes([b[16], b[17]])
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> TcpHdr<T> {
    /// Set the checksum (host byte order).
    pub fn set_checksum(&mut self, csum: u16) {
        self.bytes.as_mut()[16..18].copy_from_slice(&csum.to_be_bytes());
    }
}

// SPDX-License-Identifier: Apache-2.0
// Copyright Natplane Contributors

//! ARP header view (Ethernet / IPv4 only).

use crate::Truncated;
use crate::eth::Mac;
use std::net::Ipv4Addr;

/// ARP opcodes.
pub mod op {
    /// ARP request.
    pub const REQUEST: u16 = 1;
    /// ARP reply.
    pub const REPLY: u16 = 2;
}

/// View over an Ethernet/IPv4 ARP packet (fixed 28 bytes).
pub struct ArpHdr<T> {
    bytes: T,
}

impl<T: AsRef<[u8]>> ArpHdr<T> {
    /// Length of an Ethernet/IPv4 ARP packet.
    pub const LEN: usize = 28;

    /// Build a view over `bytes`, which must start at the ARP header.
    pub fn new(bytes: T) -> Result<Self, Truncated> {
        let have = bytes.as_ref().len();
        if have < Self::LEN {
            return Err(Truncated {
                header: "arp",
                need: Self::LEN,
                have,
            });
        }
        Ok(ArpHdr { bytes })
    }

    /// Operation code, host byte order.
    pub fn opcode(&self) -> u16 {
        let b = self.bytes.as_ref();
        u16::from_be_bytes([b[6], b[7]])
    }

    /// Sender hardware address.
    pub fn sender_mac(&self) -> Mac {
        let b = self.bytes.as_ref();
        Mac([b[8], b[9], b[10], b[11], b[12], b[13]])
    }

    /// Sender protocol address.
    pub fn sender_ip(&self) -> Ipv4Addr {
        let b = self.bytes.as_ref();
        Ipv4Addr::new(b[14], b[15], b[16], b[17])
    }

    /// Target hardware address.
    pub fn target_mac(&self) -> Mac {
        let b = self.bytes.as_ref();
        Mac([b[18], b[19], b[20], b[21], b[22], b[23]])
    }

    /// Target protocol address.
    pub fn target_ip(&self) -> Ipv4Addr {
        let b = self.bytes.as_ref();
        Ipv4Addr::new(b[24], b[25], b[26], b[27])
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> ArpHdr<T> {
    /// Set the operation code.
    pub fn set_opcode(&mut self, op: u16) {
        self.bytes.as_mut()[6..8].copy_from_slice(&op.to_be_bytes());
    }

    /// Set the sender hardware address.
    pub fn set_sender_mac(&mut self, mac: Mac) {
        self.bytes.as_mut()[8..14].copy_from_slice(&mac.0);
    }

    /// Set the sender protocol address.
    pub fn set_sender_ip(&mut self, ip: Ipv4Addr) {
        self.bytes.as_mut()[14..18].copy_from_slice(&ip.octets());
    }

    /// Set the target hardware address.
    pub fn set_target_mac(&mut self, mac: Mac) {
        self.bytes.as_mut()[18..24].copy_from_slice(&mac.0);
    }

    /// Set the target protocol address.
    pub fn set_target_ip(&mut self, ip: Ipv4Addr) {
        self.bytes.as_mut()[24..28].copy_from_slice(&ip.octets());
    }
}

// SPDX-License-Identifier: Apache-2.0
// Copyright Natplane Contributors

//! TX offload request flags.
//!
//! The pipeline marks work it wants the NIC to finish (checksums, VLAN tag
//! insertion); drivers without the corresponding hardware capability
//! resolve the flags in software at transmit time.

use bitflags::bitflags;

bitflags! {
    /// Offload work requested on a packet queued for transmission.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct TxOffload: u8 {
        /// Compute the IPv4 header checksum.
        const IP_CKSUM = 1;
        /// Compute the TCP checksum over the pseudo-header and payload.
        const TCP_CKSUM = 1 << 1;
        /// Compute the UDP checksum over the pseudo-header and payload.
        const UDP_CKSUM = 1 << 2;
        /// Insert an 802.1Q tag carrying the packet's VLAN TCI.
        const VLAN_INSERT = 1 << 3;
    }
}

// SPDX-License-Identifier: Apache-2.0
// Copyright Natplane Contributors

//! The [`Packet`] wrapper: a borrowed frame buffer plus the per-packet
//! metadata that travels with it through one pipeline iteration.

use crate::buffer::{BufferFull, PacketBufferMut};
use crate::checksum;
use crate::eth::EthHdr;
use crate::icmp4::IcmpHdr;
use crate::ipv4::{Ipv4Hdr, proto};
use crate::offload::TxOffload;
use crate::tcp::TcpHdr;
use crate::udp::UdpHdr;
use crate::{Truncated, arp::ArpHdr};

/// Errors raised while resolving TX offload requests in software.
#[derive(Debug, thiserror::Error)]
pub enum OffloadError {
    /// The frame is shorter than the headers the offload needs.
    #[error(transparent)]
    Truncated(#[from] Truncated),
    /// The declared IPv4 lengths do not fit the frame.
    #[error("ipv4 lengths inconsistent with frame of {frame_len} bytes")]
    BadLength {
        /// Actual frame length.
        frame_len: usize,
    },
    /// No room to insert the VLAN tag.
    #[error(transparent)]
    BufferFull(#[from] BufferFull),
}

/// A packet in flight through the pipeline.
///
/// The VLAN tag is stripped by the I/O layer on receive and carried here
/// as the raw TCI (`0` = untagged), mirroring hardware VLAN offload. The
/// [`TxOffload`] flags accumulate work left for the transmit side.
#[derive(Debug)]
pub struct Packet<Buf: PacketBufferMut> {
    buf: Buf,
    vlan_tci: u16,
    offload: TxOffload,
}

impl<Buf: PacketBufferMut> Packet<Buf> {
    /// Wrap a received, untagged frame.
    pub fn new(buf: Buf) -> Self {
        Packet {
            buf,
            vlan_tci: 0,
            offload: TxOffload::empty(),
        }
    }

    /// Wrap a received frame whose VLAN tag was stripped to `tci`.
    pub fn with_vlan(buf: Buf, tci: u16) -> Self {
        Packet {
            buf,
            vlan_tci: tci,
            offload: TxOffload::empty(),
        }
    }

    /// Wrap a frame as it came off the wire, stripping one 802.1Q tag
    /// into the TCI metadata if present. This is the software analogue of
    /// hardware VLAN RX offload; the pipeline always sees untagged frames.
    pub fn from_wire(mut buf: Buf) -> Self {
        let frame = buf.as_mut();
        let len = frame.len();
        if len >= EthHdr::<&[u8]>::LEN + 4
            && frame[12..14] == crate::eth::EtherType::VLAN.to_wire()
        {
            let tci = u16::from_be_bytes([frame[14], frame[15]]);
            frame.copy_within(16..len, 12);
            buf.truncate(len - 4);
            return Packet::with_vlan(buf, tci);
        }
        Packet::new(buf)
    }

    /// Frame length in bytes.
    pub fn len(&self) -> usize {
        self.buf.as_ref().len()
    }

    /// True iff the frame is empty.
    pub fn is_empty(&self) -> bool {
        self.buf.as_ref().is_empty()
    }

    /// The raw frame bytes.
    pub fn frame(&self) -> &[u8] {
        self.buf.as_ref()
    }

    /// The raw frame bytes, mutably.
    pub fn frame_mut(&mut self) -> &mut [u8] {
        self.buf.as_mut()
    }

    /// The stripped VLAN TCI (0 when untagged).
    pub fn vlan_tci(&self) -> u16 {
        self.vlan_tci
    }

    /// The VLAN id: low 12 bits of the TCI.
    pub fn vlan_id(&self) -> u16 {
        self.vlan_tci & 0xfff
    }

    /// Set the VLAN TCI for the transmit side.
    pub fn set_vlan_tci(&mut self, tci: u16) {
        self.vlan_tci = tci;
    }

    /// Offload flags currently requested.
    pub fn offload(&self) -> TxOffload {
        self.offload
    }

    /// Request additional offload work.
    pub fn request_offload(&mut self, flags: TxOffload) {
        self.offload |= flags;
    }

    /// Withdraw previously requested offload work.
    pub fn clear_offload(&mut self, flags: TxOffload) {
        self.offload &= !flags;
    }

    /// Ethernet header view.
    pub fn eth(&self) -> Result<EthHdr<&[u8]>, Truncated> {
        EthHdr::new(self.buf.as_ref())
    }

    /// Ethernet header view, mutable.
    pub fn eth_mut(&mut self) -> Result<EthHdr<&mut [u8]>, Truncated> {
        EthHdr::new(self.buf.as_mut())
    }

    /// Offset of the L3 header. VLAN tags are stripped on receive, so this
    /// is constant.
    pub fn l3_offset(&self) -> usize {
        EthHdr::<&[u8]>::LEN
    }

    /// ARP header view.
    pub fn arp(&self) -> Result<ArpHdr<&[u8]>, Truncated> {
        ArpHdr::new(&self.buf.as_ref()[self.l3_offset()..])
    }

    /// ARP header view, mutable.
    pub fn arp_mut(&mut self) -> Result<ArpHdr<&mut [u8]>, Truncated> {
        let off = self.l3_offset();
        ArpHdr::new(&mut self.buf.as_mut()[off..])
    }

    /// IPv4 header view.
    pub fn ipv4(&self) -> Result<Ipv4Hdr<&[u8]>, Truncated> {
        Ipv4Hdr::new(&self.buf.as_ref()[self.l3_offset()..])
    }

    /// IPv4 header view, mutable.
    pub fn ipv4_mut(&mut self) -> Result<Ipv4Hdr<&mut [u8]>, Truncated> {
        let off = self.l3_offset();
        Ipv4Hdr::new(&mut self.buf.as_mut()[off..])
    }

    /// Offset of the L4 header, honouring the IHL field.
    pub fn l4_offset(&self) -> Result<usize, Truncated> {
        let hl = self.ipv4()?.header_len();
        if hl < Ipv4Hdr::<&[u8]>::MIN_LEN {
            return Err(Truncated {
                header: "ipv4",
                need: Ipv4Hdr::<&[u8]>::MIN_LEN,
                have: hl,
            });
        }
        Ok(self.l3_offset() + hl)
    }

    /// ICMP header view.
    pub fn icmp(&self) -> Result<IcmpHdr<&[u8]>, Truncated> {
        IcmpHdr::new(&self.buf.as_ref()[self.l4_offset()?..])
    }

    /// ICMP header view, mutable.
    pub fn icmp_mut(&mut self) -> Result<IcmpHdr<&mut [u8]>, Truncated> {
        let off = self.l4_offset()?;
        IcmpHdr::new(&mut self.buf.as_mut()[off..])
    }

    /// TCP header view, mutable.
    pub fn tcp_mut(&mut self) -> Result<TcpHdr<&mut [u8]>, Truncated> {
        let off = self.l4_offset()?;
        TcpHdr::new(&mut self.buf.as_mut()[off..])
    }

    /// UDP header view, mutable.
    pub fn udp_mut(&mut self) -> Result<UdpHdr<&mut [u8]>, Truncated> {
        let off = self.l4_offset()?;
        UdpHdr::new(&mut self.buf.as_mut()[off..])
    }

    /// The L4 slice: from the end of the IPv4 header to the end of the
    /// IPv4 payload as declared by total-length, bounded by the frame.
    pub fn l4_slice_mut(&mut self) -> Result<&mut [u8], Truncated> {
        let l3 = self.l3_offset();
        let total = usize::from(self.ipv4()?.total_length());
        let start = self.l4_offset()?;
        let end = (l3 + total).min(self.buf.as_ref().len());
        if end < start {
            return Err(Truncated {
                header: "l4",
                need: start,
                have: end,
            });
        }
        Ok(&mut self.buf.as_mut()[start..end])
    }

    /// Consume the packet and hand the buffer back to the I/O layer.
    pub fn into_buffer(self) -> Buf {
        self.buf
    }

    /// Resolve any pending offload requests in software. Drivers without
    /// hardware assistance call this immediately before emitting the frame;
    /// the flags are cleared on success.
    ///
    /// Checksums are computed before VLAN insertion so header offsets stay
    /// stable.
    pub fn resolve_tx_offloads(&mut self) -> Result<(), OffloadError> {
        if self
            .offload
            .intersects(TxOffload::TCP_CKSUM | TxOffload::UDP_CKSUM)
        {
            self.software_l4_checksum()?;
        }
        if self.offload.contains(TxOffload::IP_CKSUM) {
            self.software_ipv4_checksum()?;
        }
        if self.offload.contains(TxOffload::VLAN_INSERT) && self.vlan_id() != 0 {
            self.insert_vlan_tag()?;
        }
        self.offload = TxOffload::empty();
        Ok(())
    }

    fn software_ipv4_checksum(&mut self) -> Result<(), OffloadError> {
        let l3 = self.l3_offset();
        let hl = self.ipv4()?.header_len();
        if l3 + hl > self.buf.as_ref().len() {
            return Err(OffloadError::BadLength {
                frame_len: self.buf.as_ref().len(),
            });
        }
        self.ipv4_mut()?.set_checksum(0);
        let csum = checksum::checksum(&self.buf.as_ref()[l3..l3 + hl]);
        self.ipv4_mut()?.set_checksum(csum);
        Ok(())
    }

    fn software_l4_checksum(&mut self) -> Result<(), OffloadError> {
        let ip = self.ipv4()?;
        let (src, dst, protocol) = (ip.src(), ip.dst(), ip.protocol());
        let cksum_off = match protocol {
            proto::TCP => 16,
            proto::UDP | proto::UDPLITE => 6,
            _ => return Ok(()),
        };
        let l4 = self.l4_slice_mut()?;
        if l4.len() < cksum_off + 2 {
            return Err(Truncated {
                header: "l4",
                need: cksum_off + 2,
                have: l4.len(),
            }
            .into());
        }
        l4[cksum_off..cksum_off + 2].fill(0);
        let mut csum = checksum::l4_checksum(src, dst, protocol, l4);
        if protocol != proto::TCP && csum == 0 {
            // UDP transmits an all-ones checksum instead of zero.
            csum = 0xffff;
        }
        l4[cksum_off..cksum_off + 2].copy_from_slice(&csum.to_be_bytes());
        Ok(())
    }

    fn insert_vlan_tag(&mut self) -> Result<(), OffloadError> {
        let old_len = self.buf.as_ref().len();
        let frame = self.buf.grow(4)?;
        frame.copy_within(12..old_len, 16);
        frame[12..14].copy_from_slice(&crate::eth::EtherType::VLAN.to_wire());
        frame[14..16].copy_from_slice(&self.vlan_tci.to_be_bytes());
        Ok(())
    }
}

// SPDX-License-Identifier: Apache-2.0
// Copyright Natplane Contributors

//! Frame builders for tests and traffic injection.
//!
//! Every builder emits a complete, checksum-valid Ethernet frame in a
//! [`FrameBuffer`], so tests can recompute checksums from scratch and
//! compare against what the pipeline left behind.

use crate::buffer::FrameBuffer;
use crate::checksum;
use crate::eth::{EtherType, Mac};
use crate::ipv4::proto;
use std::net::Ipv4Addr;

/// Source MAC used by generated frames unless overridden.
pub const SRC_MAC: Mac = Mac([0x02, 0x00, 0x00, 0x00, 0x00, 0x01]);
/// Destination MAC used by generated frames unless overridden.
pub const DST_MAC: Mac = Mac([0x02, 0x00, 0x00, 0x00, 0x00, 0x02]);

fn eth_header(dst: Mac, src: Mac, ethertype: EtherType) -> Vec<u8> {
    let mut frame = Vec::with_capacity(64);
    frame.extend_from_slice(&dst.0);
    frame.extend_from_slice(&src.0);
    frame.extend_from_slice(&ethertype.to_wire());
    frame
}

fn ipv4_header(src: Ipv4Addr, dst: Ipv4Addr, ttl: u8, protocol: u8, payload_len: usize) -> Vec<u8> {
    let mut hdr = vec![0u8; 20];
    hdr[0] = 0x45;
    let total = u16::try_from(20 + payload_len).unwrap_or(u16::MAX);
    hdr[2..4].copy_from_slice(&total.to_be_bytes());
    hdr[8] = ttl;
    hdr[9] = protocol;
    hdr[12..16].copy_from_slice(&src.octets());
    hdr[16..20].copy_from_slice(&dst.octets());
    let csum = checksum::checksum(&hdr);
    hdr[10..12].copy_from_slice(&csum.to_be_bytes());
    hdr
}

/// An Ethernet/IPv4 frame around an arbitrary, already-built L4 payload.
pub fn ipv4_frame(
    src_mac: Mac,
    dst_mac: Mac,
    src: Ipv4Addr,
    dst: Ipv4Addr,
    ttl: u8,
    protocol: u8,
    l4: &[u8],
) -> FrameBuffer {
    let mut frame = eth_header(dst_mac, src_mac, EtherType::IPV4);
    frame.extend_from_slice(&ipv4_header(src, dst, ttl, protocol, l4.len()));
    frame.extend_from_slice(l4);
    FrameBuffer::from_frame(&frame)
}

/// A UDP datagram with a valid transport checksum.
#[allow(clippy::too_many_arguments)]
pub fn udp_frame(
    src_mac: Mac,
    dst_mac: Mac,
    src: Ipv4Addr,
    dst: Ipv4Addr,
    ttl: u8,
    src_port: u16,
    dst_port: u16,
    payload: &[u8],
) -> FrameBuffer {
    let len = u16::try_from(8 + payload.len()).unwrap_or(u16::MAX);
    let mut l4 = Vec::with_capacity(usize::from(len));
    l4.extend_from_slice(&src_port.to_be_bytes());
    l4.extend_from_slice(&dst_port.to_be_bytes());
    l4.extend_from_slice(&len.to_be_bytes());
    l4.extend_from_slice(&[0, 0]);
    l4.extend_from_slice(payload);
    let mut csum = checksum::l4_checksum(src, dst, proto::UDP, &l4);
    if csum == 0 {
        csum = 0xffff;
    }
    l4[6..8].copy_from_slice(&csum.to_be_bytes());
    ipv4_frame(src_mac, dst_mac, src, dst, ttl, proto::UDP, &l4)
}

/// A minimal TCP segment (no options) with a valid transport checksum.
#[allow(clippy::too_many_arguments)]
pub fn tcp_frame(
    src_mac: Mac,
    dst_mac: Mac,
    src: Ipv4Addr,
    dst: Ipv4Addr,
    ttl: u8,
    src_port: u16,
    dst_port: u16,
    payload: &[u8],
) -> FrameBuffer {
    let mut l4 = vec![0u8; 20];
    l4[0..2].copy_from_slice(&src_port.to_be_bytes());
    l4[2..4].copy_from_slice(&dst_port.to_be_bytes());
    l4[12] = 5 << 4; // data offset
    l4[13] = 0x10; // ACK
    l4.extend_from_slice(payload);
    let csum = checksum::l4_checksum(src, dst, proto::TCP, &l4);
    l4[16..18].copy_from_slice(&csum.to_be_bytes());
    ipv4_frame(src_mac, dst_mac, src, dst, ttl, proto::TCP, &l4)
}

/// An ICMP echo request with a valid ICMP checksum.
#[allow(clippy::too_many_arguments)]
pub fn icmp_echo_request(
    src_mac: Mac,
    dst_mac: Mac,
    src: Ipv4Addr,
    dst: Ipv4Addr,
    ttl: u8,
    id: u16,
    seq: u16,
    payload: &[u8],
) -> FrameBuffer {
    let mut l4 = vec![0u8; 8];
    l4[0] = crate::icmp4::kind::ECHO_REQUEST;
    l4[4..6].copy_from_slice(&id.to_be_bytes());
    l4[6..8].copy_from_slice(&seq.to_be_bytes());
    l4.extend_from_slice(payload);
    let csum = checksum::checksum(&l4);
    l4[2..4].copy_from_slice(&csum.to_be_bytes());
    ipv4_frame(src_mac, dst_mac, src, dst, ttl, proto::ICMP, &l4)
}

/// An ICMP error message (`icmp_type` should be one of the error types)
/// quoting the header of `inner_*` plus eight payload bytes, per RFC 792.
#[allow(clippy::too_many_arguments)]
pub fn icmp_error(
    src_mac: Mac,
    dst_mac: Mac,
    src: Ipv4Addr,
    dst: Ipv4Addr,
    ttl: u8,
    icmp_type: u8,
    inner_src: Ipv4Addr,
    inner_dst: Ipv4Addr,
    inner_protocol: u8,
) -> FrameBuffer {
    let mut l4 = vec![0u8; 8];
    l4[0] = icmp_type;
    let inner = ipv4_header(inner_src, inner_dst, 1, inner_protocol, 8);
    l4.extend_from_slice(&inner);
    l4.extend_from_slice(&[0u8; 8]);
    let csum = checksum::checksum(&l4);
    l4[2..4].copy_from_slice(&csum.to_be_bytes());
    ipv4_frame(src_mac, dst_mac, src, dst, ttl, proto::ICMP, &l4)
}

/// A broadcast ARP request asking for `target_ip`.
pub fn arp_request(sender_mac: Mac, sender_ip: Ipv4Addr, target_ip: Ipv4Addr) -> FrameBuffer {
    let mut frame = eth_header(Mac::BROADCAST, sender_mac, EtherType::ARP);
    frame.extend_from_slice(&1u16.to_be_bytes()); // hardware: ethernet
    frame.extend_from_slice(&EtherType::IPV4.to_wire());
    frame.push(6);
    frame.push(4);
    frame.extend_from_slice(&crate::arp::op::REQUEST.to_be_bytes());
    frame.extend_from_slice(&sender_mac.0);
    frame.extend_from_slice(&sender_ip.octets());
    frame.extend_from_slice(&Mac::ZERO.0);
    frame.extend_from_slice(&target_ip.octets());
    FrameBuffer::from_frame(&frame)
}

/// Recompute the IPv4 header checksum of a finished frame in place.
/// Useful after tests tweak header fields through the raw views.
pub fn refresh_ipv4_checksum(frame: &mut FrameBuffer) {
    let bytes = frame.as_mut();
    let hl = usize::from(bytes[14] & 0x0f) * 4;
    bytes[24..26].fill(0);
    let csum = checksum::checksum(&bytes[14..14 + hl]);
    bytes[24..26].copy_from_slice(&csum.to_be_bytes());
}

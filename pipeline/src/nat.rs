// SPDX-License-Identifier: Apache-2.0
// Copyright Natplane Contributors

//! The NAT rewrite action.
//!
//! Rewrites the chosen IPv4 address through the translation table, keeps
//! the IPv4 and transport checksums consistent with incremental updates,
//! and handles the ICMP-error case of RFC 5508: an error message quotes
//! the offending datagram, whose roles are swapped relative to the outer
//! packet, so rewriting the outer source entails rewriting the quoted
//! destination and vice versa.

use crate::exec::RuleCtx;
use crate::rule::{NatField, Verdict};
use crate::sink::TxSink;
use net::buffer::PacketBufferMut;
use net::checksum;
use net::icmp4::{self, IcmpHdr};
use net::ipv4::{Ipv4Hdr, proto};
use net::packet::Packet;

pub(crate) fn rewrite<Buf: PacketBufferMut, S: TxSink<Buf>>(
    mut pkt: Packet<Buf>,
    field: NatField,
    ctx: &mut RuleCtx<'_, Buf, S>,
) -> Verdict<Buf> {
    let Ok(ip) = pkt.ipv4() else {
        return Verdict::Terminal;
    };
    let old = match field {
        NatField::Src => ip.src(),
        NatField::Dst => ip.dst(),
    };
    let total_length = ip.total_length();
    let protocol = ip.protocol();
    // A nonzero fragment offset means no L4 header in this packet.
    let l4_header_present = !ip.is_later_fragment();

    let Some(new) = ctx.nat.translate(old, u64::from(total_length)) else {
        ctx.stats.drop_no_rule.bump();
        return Verdict::Terminal;
    };

    let (from, to) = (u32::from(old), u32::from(new));
    {
        let Ok(mut ip) = pkt.ipv4_mut() else {
            return Verdict::Terminal;
        };
        let csum = checksum::update32(ip.checksum(), from, to);
        match field {
            NatField::Src => ip.set_src(new),
            NatField::Dst => ip.set_dst(new),
        }
        ip.set_checksum(csum);
    }

    match protocol {
        proto::TCP if l4_header_present => {
            let Ok(mut tcp) = pkt.tcp_mut() else {
                return Verdict::Terminal;
            };
            let csum = checksum::update32(tcp.checksum(), from, to);
            tcp.set_checksum(csum);
        }
        proto::UDP | proto::UDPLITE if l4_header_present => {
            let Ok(mut udp) = pkt.udp_mut() else {
                return Verdict::Terminal;
            };
            let old_csum = udp.checksum();
            // Zero means the sender did not compute one; leave it absent.
            if old_csum != 0 {
                let mut csum = checksum::update32(old_csum, from, to);
                if csum == 0 {
                    csum = 0xffff;
                }
                udp.set_checksum(csum);
            }
        }
        proto::ICMP if l4_header_present => {
            return rewrite_icmp_inner(pkt, field, total_length, ctx);
        }
        _ => {}
    }

    Verdict::Continue(pkt)
}

/// Rewrite the quoted IPv4 header inside an ICMP error message. The inner
/// address field must lie within the outer datagram's declared length,
/// otherwise the packet is forged or truncated and gets dropped.
fn rewrite_icmp_inner<Buf: PacketBufferMut, S: TxSink<Buf>>(
    mut pkt: Packet<Buf>,
    field: NatField,
    outer_total_length: u16,
    ctx: &mut RuleCtx<'_, Buf, S>,
) -> Verdict<Buf> {
    let Ok(icmp) = pkt.icmp() else {
        return Verdict::Terminal;
    };
    if !icmp4::is_error(icmp.icmp_type()) {
        return Verdict::Continue(pkt);
    }

    let l3_offset = pkt.l3_offset();
    let Ok(l4_offset) = pkt.l4_offset() else {
        return Verdict::Terminal;
    };
    let inner_offset = l4_offset + IcmpHdr::<&[u8]>::LEN;
    let inner_end = inner_offset + Ipv4Hdr::<&[u8]>::MIN_LEN;
    let datagram_end = l3_offset + usize::from(outer_total_length);
    if datagram_end < inner_end || pkt.len() < inner_end {
        return Verdict::Terminal;
    }

    let inner_field = field.opposite();
    let (inner_old, inner_new, inner_old_csum, inner_new_csum) = {
        let frame = pkt.frame_mut();
        let Ok(mut inner) = Ipv4Hdr::new(&mut frame[inner_offset..inner_end]) else {
            return Verdict::Terminal;
        };
        let inner_old = match inner_field {
            NatField::Src => inner.src(),
            NatField::Dst => inner.dst(),
        };
        let Some(inner_new) = ctx.nat.lookup(inner_old) else {
            ctx.stats.drop_no_rule.bump();
            return Verdict::Terminal;
        };
        let inner_old_csum = inner.checksum();
        let inner_new_csum = checksum::update32(
            inner_old_csum,
            u32::from(inner_old),
            u32::from(inner_new),
        );
        match inner_field {
            NatField::Src => inner.set_src(inner_new),
            NatField::Dst => inner.set_dst(inner_new),
        }
        inner.set_checksum(inner_new_csum);
        (inner_old, inner_new, inner_old_csum, inner_new_csum)
    };

    // The ICMP checksum covers the quoted header, so it changed twice:
    // once through the inner checksum field, once through the address.
    let Ok(mut icmp) = pkt.icmp_mut() else {
        return Verdict::Terminal;
    };
    let mut csum = checksum::update16(icmp.checksum(), inner_old_csum, inner_new_csum);
    csum = checksum::update32(csum, u32::from(inner_old), u32::from(inner_new));
    icmp.set_checksum(csum);

    Verdict::Continue(pkt)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod test {
    use super::*;
    use crate::exec::test_support::TestSink;
    use net::FrameBuffer;
    use net::pktgen;
    use std::net::Ipv4Addr;
    use xlat::NatTable;

    const INSIDE: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 5);
    const OUTSIDE: Ipv4Addr = Ipv4Addr::new(212, 47, 0, 5);
    const PEER: Ipv4Addr = Ipv4Addr::new(8, 8, 8, 8);

    struct Harness {
        nat: NatTable,
        stats: stats::WorkerStats,
        sink: TestSink,
    }

    impl Harness {
        fn new() -> Self {
            let mut nat = NatTable::with_accounting(true);
            nat.insert_pair(INSIDE, OUTSIDE).unwrap();
            Harness {
                nat,
                stats: stats::WorkerStats::new(),
                sink: TestSink::default(),
            }
        }

        fn rewrite(
            &mut self,
            pkt: Packet<FrameBuffer>,
            field: NatField,
        ) -> Verdict<FrameBuffer> {
            let mut ctx = crate::exec::RuleCtx::new(&self.nat, &self.stats, &mut self.sink, 0, 1);
            rewrite(pkt, field, &mut ctx)
        }
    }

    fn ipv4_checksum_is_valid(pkt: &Packet<FrameBuffer>) {
        let l3 = pkt.l3_offset();
        let hl = pkt.ipv4().unwrap().header_len();
        assert_eq!(
            checksum::fold(checksum::sum_bytes(&pkt.frame()[l3..l3 + hl])),
            0xffff,
            "ipv4 header checksum invalid after rewrite"
        );
    }

    fn l4_checksum_is_valid(pkt: &mut Packet<FrameBuffer>) {
        let ip = pkt.ipv4().unwrap();
        let (src, dst, protocol) = (ip.src(), ip.dst(), ip.protocol());
        let l4 = pkt.l4_slice_mut().unwrap().to_vec();
        let len = u16::try_from(l4.len()).unwrap();
        assert_eq!(
            checksum::fold(
                checksum::pseudo_header_sum(src, dst, protocol, len) + checksum::sum_bytes(&l4)
            ),
            0xffff,
            "l4 checksum invalid after rewrite"
        );
    }

    #[test]
    fn src_rewrite_updates_addresses_and_checksums() {
        let mut h = Harness::new();
        let pkt = Packet::new(pktgen::udp_frame(
            pktgen::SRC_MAC,
            pktgen::DST_MAC,
            INSIDE,
            PEER,
            64,
            40000,
            53,
            b"query",
        ));
        let Verdict::Continue(mut pkt) = h.rewrite(pkt, NatField::Src) else {
            panic!("rewrite dropped a translatable packet");
        };
        let ip = pkt.ipv4().unwrap();
        assert_eq!(ip.src(), OUTSIDE);
        assert_eq!(ip.dst(), PEER);
        ipv4_checksum_is_valid(&pkt);
        l4_checksum_is_valid(&mut pkt);
    }

    #[test]
    fn dst_rewrite_is_the_inverse() {
        let mut h = Harness::new();
        let pkt = Packet::new(pktgen::tcp_frame(
            pktgen::SRC_MAC,
            pktgen::DST_MAC,
            PEER,
            OUTSIDE,
            64,
            443,
            40000,
            b"stream bytes",
        ));
        let Verdict::Continue(mut pkt) = h.rewrite(pkt, NatField::Dst) else {
            panic!("rewrite dropped a translatable packet");
        };
        let ip = pkt.ipv4().unwrap();
        assert_eq!(ip.dst(), INSIDE);
        ipv4_checksum_is_valid(&pkt);
        l4_checksum_is_valid(&mut pkt);
    }

    #[test]
    fn round_trip_restores_original() {
        let mut h = Harness::new();
        let original = pktgen::udp_frame(
            pktgen::SRC_MAC,
            pktgen::DST_MAC,
            INSIDE,
            PEER,
            64,
            1234,
            5678,
            b"round trip",
        );
        let reference = original.clone();

        let Verdict::Continue(pkt) = h.rewrite(Packet::new(original), NatField::Src) else {
            panic!("first rewrite dropped");
        };
        let Verdict::Continue(pkt) = h.rewrite(pkt, NatField::Src) else {
            panic!("second rewrite dropped");
        };
        assert_eq!(pkt.into_buffer(), reference);
    }

    #[test]
    fn miss_drops_and_counts() {
        let mut h = Harness::new();
        let pkt = Packet::new(pktgen::udp_frame(
            pktgen::SRC_MAC,
            pktgen::DST_MAC,
            Ipv4Addr::new(9, 9, 9, 9),
            PEER,
            64,
            1,
            2,
            b"",
        ));
        assert!(h.rewrite(pkt, NatField::Src).is_terminal());
        assert_eq!(h.stats.snapshot().drop_no_rule, 1);
        assert!(h.sink.sent.is_empty());
    }

    #[test]
    fn later_fragment_keeps_l4_bytes_untouched() {
        let mut h = Harness::new();
        let mut frame = pktgen::udp_frame(
            pktgen::SRC_MAC,
            pktgen::DST_MAC,
            INSIDE,
            PEER,
            64,
            1234,
            5678,
            b"fragment payload",
        );
        {
            let mut pkt = Packet::new(frame);
            pkt.ipv4_mut().unwrap().set_fragment(true, 24);
            frame = pkt.into_buffer();
        }
        pktgen::refresh_ipv4_checksum(&mut frame);
        let l4_before = frame.as_ref()[34..].to_vec();

        let Verdict::Continue(pkt) = h.rewrite(Packet::new(frame), NatField::Src) else {
            panic!("rewrite dropped a translatable fragment");
        };
        assert_eq!(pkt.ipv4().unwrap().src(), OUTSIDE);
        ipv4_checksum_is_valid(&pkt);
        assert_eq!(&pkt.frame()[34..], &l4_before[..]);
    }

    #[test]
    fn first_fragment_gets_incremental_l4_update() {
        let mut h = Harness::new();
        let mut frame = pktgen::udp_frame(
            pktgen::SRC_MAC,
            pktgen::DST_MAC,
            INSIDE,
            PEER,
            64,
            1234,
            5678,
            b"first fragment",
        );
        {
            let mut pkt = Packet::new(frame);
            pkt.ipv4_mut().unwrap().set_fragment(true, 0);
            frame = pkt.into_buffer();
        }
        pktgen::refresh_ipv4_checksum(&mut frame);

        let Verdict::Continue(mut pkt) = h.rewrite(Packet::new(frame), NatField::Src) else {
            panic!("rewrite dropped a translatable fragment");
        };
        ipv4_checksum_is_valid(&pkt);
        // The incremental update compensates the pseudo-header change, so
        // the checksum is still valid for the rewritten addresses.
        l4_checksum_is_valid(&mut pkt);
    }

    #[test]
    fn absent_udp_checksum_stays_absent() {
        let mut h = Harness::new();
        let mut frame = pktgen::udp_frame(
            pktgen::SRC_MAC,
            pktgen::DST_MAC,
            INSIDE,
            PEER,
            64,
            1234,
            5678,
            b"no checksum",
        );
        frame.as_mut()[40..42].fill(0);

        let Verdict::Continue(pkt) = h.rewrite(Packet::new(frame), NatField::Src) else {
            panic!("rewrite dropped");
        };
        assert_eq!(&pkt.frame()[40..42], &[0, 0]);
    }

    #[test]
    fn icmp_echo_passes_without_inner_rewrite() {
        let mut h = Harness::new();
        let pkt = Packet::new(pktgen::icmp_echo_request(
            pktgen::SRC_MAC,
            pktgen::DST_MAC,
            INSIDE,
            PEER,
            64,
            1,
            1,
            b"ping",
        ));
        let Verdict::Continue(pkt) = h.rewrite(pkt, NatField::Src) else {
            panic!("rewrite dropped an echo request");
        };
        assert_eq!(pkt.ipv4().unwrap().src(), OUTSIDE);
        ipv4_checksum_is_valid(&pkt);
    }

    #[test]
    fn icmp_error_rewrites_opposite_inner_address() {
        let mut h = Harness::new();
        // Time-exceeded from an intermediate hop toward our public side,
        // quoting the datagram 10.0.0.5 -> 8.8.8.8 that caused it.
        let pkt = Packet::new(pktgen::icmp_error(
            pktgen::SRC_MAC,
            pktgen::DST_MAC,
            Ipv4Addr::new(1, 1, 1, 1),
            OUTSIDE,
            64,
            net::icmp4::kind::TIME_EXCEEDED,
            INSIDE,
            PEER,
            proto::UDP,
        ));
        let Verdict::Continue(mut pkt) = h.rewrite(pkt, NatField::Dst) else {
            panic!("rewrite dropped an icmp error");
        };

        let ip = pkt.ipv4().unwrap();
        assert_eq!(ip.dst(), INSIDE);
        ipv4_checksum_is_valid(&pkt);

        // Outer dst was rewritten, so the inner src must have followed.
        let inner_offset = pkt.l4_offset().unwrap() + 8;
        let inner = Ipv4Hdr::new(&pkt.frame()[inner_offset..inner_offset + 20]).unwrap();
        assert_eq!(inner.src(), OUTSIDE);
        assert_eq!(inner.dst(), PEER);

        // Inner header checksum still verifies.
        let inner_bytes = &pkt.frame()[inner_offset..inner_offset + 20];
        assert_eq!(checksum::fold(checksum::sum_bytes(inner_bytes)), 0xffff);

        // And so does the ICMP checksum over the whole ICMP payload.
        let l4 = pkt.l4_slice_mut().unwrap();
        assert_eq!(checksum::fold(checksum::sum_bytes(l4)), 0xffff);
    }

    #[test]
    fn icmp_error_with_untranslatable_inner_drops() {
        let mut h = Harness::new();
        let pkt = Packet::new(pktgen::icmp_error(
            pktgen::SRC_MAC,
            pktgen::DST_MAC,
            Ipv4Addr::new(1, 1, 1, 1),
            OUTSIDE,
            64,
            net::icmp4::kind::DEST_UNREACH,
            Ipv4Addr::new(172, 16, 0, 1),
            PEER,
            proto::UDP,
        ));
        assert!(h.rewrite(pkt, NatField::Dst).is_terminal());
        assert_eq!(h.stats.snapshot().drop_no_rule, 1);
    }

    #[test]
    fn icmp_error_with_truncated_inner_drops() {
        let mut h = Harness::new();
        let mut frame = pktgen::icmp_error(
            pktgen::SRC_MAC,
            pktgen::DST_MAC,
            Ipv4Addr::new(1, 1, 1, 1),
            OUTSIDE,
            64,
            net::icmp4::kind::TIME_EXCEEDED,
            INSIDE,
            PEER,
            proto::UDP,
        );
        // Shrink the declared outer length so the quoted header no longer
        // fits, the way a forged error would look.
        {
            let bytes = frame.as_mut();
            bytes[16..18].copy_from_slice(&30u16.to_be_bytes());
        }
        pktgen::refresh_ipv4_checksum(&mut frame);
        assert!(h.rewrite(Packet::new(frame), NatField::Dst).is_terminal());
        // Not a lookup failure: no counter for forged packets.
        assert_eq!(h.stats.snapshot().drop_no_rule, 0);
    }

    #[test]
    fn byte_counters_account_outer_total_length() {
        let mut h = Harness::new();
        let pkt = Packet::new(pktgen::udp_frame(
            pktgen::SRC_MAC,
            pktgen::DST_MAC,
            INSIDE,
            PEER,
            64,
            1,
            2,
            b"1234567890",
        ));
        let total = u64::from(pkt.ipv4().unwrap().total_length());
        let Verdict::Continue(_) = h.rewrite(pkt, NatField::Src) else {
            panic!("rewrite dropped");
        };
        assert_eq!(h.nat.bytes_for(INSIDE), Some(total));
        assert_eq!(h.nat.bytes_for(OUTSIDE), Some(0));
    }
}

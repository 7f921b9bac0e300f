// SPDX-License-Identifier: Apache-2.0
// Copyright Natplane Contributors

//! The rule-tree walker.

use crate::rule::{Rule, Verdict};
use crate::sink::TxSink;
use crate::{actions, conds};
use net::buffer::PacketBufferMut;
use net::packet::Packet;
use stats::WorkerStats;
use xlat::NatTable;

/// Everything an action may touch, passed explicitly instead of through
/// per-core globals.
pub struct RuleCtx<'a, Buf: PacketBufferMut, S: TxSink<Buf>> {
    /// The translation table of the active configuration.
    pub nat: &'a NatTable,
    /// The calling worker's counter block.
    pub stats: &'a WorkerStats,
    /// Egress path.
    pub sink: &'a mut S,
    /// Port the packet arrived on.
    pub rx_port: u16,
    /// Id of the calling worker, for log lines.
    pub worker_id: u32,
    pub(crate) _buf: std::marker::PhantomData<Buf>,
}

impl<'a, Buf: PacketBufferMut, S: TxSink<Buf>> RuleCtx<'a, Buf, S> {
    /// Assemble a context for one packet.
    pub fn new(
        nat: &'a NatTable,
        stats: &'a WorkerStats,
        sink: &'a mut S,
        rx_port: u16,
        worker_id: u32,
    ) -> Self {
        RuleCtx {
            nat,
            stats,
            sink,
            rx_port,
            worker_id,
            _buf: std::marker::PhantomData,
        }
    }
}

/// Run `pkt` through the rule tree. An empty tree is an implicit drop: the
/// buffer is released with no counter increment.
pub fn execute<Buf: PacketBufferMut, S: TxSink<Buf>>(
    rule: Option<&Rule>,
    pkt: Packet<Buf>,
    ctx: &mut RuleCtx<'_, Buf, S>,
) -> Verdict<Buf> {
    match rule {
        None => Verdict::Terminal,
        Some(rule) => run(rule, pkt, ctx),
    }
}

fn run<Buf: PacketBufferMut, S: TxSink<Buf>>(
    rule: &Rule,
    pkt: Packet<Buf>,
    ctx: &mut RuleCtx<'_, Buf, S>,
) -> Verdict<Buf> {
    match rule {
        Rule::Action(action) => actions::apply(action, pkt, ctx),
        Rule::Seq(left, right) => match run(left, pkt, ctx) {
            Verdict::Continue(pkt) => run(right, pkt, ctx),
            Verdict::Terminal => Verdict::Terminal,
        },
        Rule::If {
            when,
            then,
            otherwise,
        } => {
            if conds::matches(when, &pkt) {
                run(then, pkt, ctx)
            } else if let Some(otherwise) = otherwise {
                run(otherwise, pkt, ctx)
            } else {
                Verdict::Continue(pkt)
            }
        }
    }
}


#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use net::FrameBuffer;
    use net::eth::Mac;

    /// A sink collecting transmitted packets for inspection.
    #[derive(Default)]
    pub struct TestSink {
        pub sent: Vec<(u16, Packet<FrameBuffer>)>,
    }

    impl TxSink<FrameBuffer> for TestSink {
        fn transmit(&mut self, port: u16, pkt: Packet<FrameBuffer>) {
            self.sent.push((port, pkt));
        }

        fn port_mac(&self, port: u16) -> Mac {
            Mac([0x02, 0, 0, 0, 0x10, u8::try_from(port).unwrap_or(0xff)])
        }
    }
}

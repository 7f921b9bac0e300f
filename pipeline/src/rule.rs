// SPDX-License-Identifier: Apache-2.0
// Copyright Natplane Contributors

//! The rule AST: owned sum types walked by the executor.

use ipnet::Ipv4Net;
use net::buffer::PacketBufferMut;
use net::eth::Mac;
use net::packet::Packet;

/// Which IPv4 address a `nat` action rewrites.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NatField {
    /// Rewrite the source address.
    Src,
    /// Rewrite the destination address.
    Dst,
}

impl NatField {
    /// The opposite field. Rewriting the outer source of an ICMP error
    /// implies rewriting the quoted packet's destination, and vice versa.
    pub fn opposite(self) -> NatField {
        match self {
            NatField::Src => NatField::Dst,
            NatField::Dst => NatField::Src,
        }
    }
}

/// Parameters of the `out` action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutPort {
    /// Egress port.
    pub port: u16,
    /// VLAN TCI to tag the frame with; 0 emits untagged.
    pub vlan: u16,
    /// Next-hop MAC installed as the Ethernet destination.
    pub next_hop: Mac,
}

/// An action leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Release the packet unconditionally and stop.
    Drop,
    /// Log a summary of the packet and continue.
    Print,
    /// Translate the source or destination address through the NAT table.
    NatRewrite(NatField),
    /// Emit the packet on a port and stop.
    Out(OutPort),
}

/// A match predicate, composed with short-circuit boolean operators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    /// True iff the IPv4 source is inside the network.
    SrcInNet(Ipv4Net),
    /// True iff the IPv4 destination is inside the network.
    DstInNet(Ipv4Net),
    /// True iff the packet's VLAN id (low 12 TCI bits) equals the value.
    VlanIs(u16),
    /// Left and right, left first.
    And(Box<Predicate>, Box<Predicate>),
    /// Left or right, left first.
    Or(Box<Predicate>, Box<Predicate>),
}

/// A rule tree node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rule {
    /// Execute the action.
    Action(Action),
    /// Execute left; if it did not terminate, execute right.
    Seq(Box<Rule>, Box<Rule>),
    /// Execute `then` when the predicate holds, `otherwise` (if present)
    /// when it does not.
    If {
        /// Match predicate, evaluated without side effects.
        when: Predicate,
        /// Body executed on a match.
        then: Box<Rule>,
        /// Optional alternative executed on a mismatch.
        otherwise: Option<Box<Rule>>,
    },
}

impl Rule {
    /// Fold a list of rules into nested [`Rule::Seq`] nodes. Returns
    /// `None` for an empty list, which the executor treats as an implicit
    /// drop.
    pub fn sequence(rules: Vec<Rule>) -> Option<Rule> {
        let mut iter = rules.into_iter();
        let first = iter.next()?;
        Some(iter.fold(first, |acc, next| {
            Rule::Seq(Box::new(acc), Box::new(next))
        }))
    }
}

/// Outcome of running a rule node over a packet.
#[derive(Debug)]
pub enum Verdict<Buf: PacketBufferMut> {
    /// Keep walking: the packet is handed back to the caller.
    Continue(Packet<Buf>),
    /// Stop: the packet was transmitted or released.
    Terminal,
}

impl<Buf: PacketBufferMut> Verdict<Buf> {
    /// True iff the verdict is [`Verdict::Terminal`].
    pub fn is_terminal(&self) -> bool {
        matches!(self, Verdict::Terminal)
    }
}

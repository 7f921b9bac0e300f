// SPDX-License-Identifier: Apache-2.0
// Copyright Natplane Contributors

//! The declarative configuration document.
//!
//! This is the serde data model of the config file; it knows nothing
//! about runtime structures. A document describes ports with their
//! answered addresses, the NAT pair list, and the rule tree in a nested
//! `if`/action form.

use net::eth::Mac;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::net::Ipv4Addr;

/// Top-level configuration document.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigDoc {
    /// Per-port settings, one entry per physical port.
    #[serde(default)]
    pub ports: Vec<PortDoc>,
    /// NAT pairs; each entry installs both directions.
    #[serde(default)]
    pub nat: Vec<NatPairDoc>,
    /// The rule list, executed in order per packet.
    #[serde(default)]
    pub rules: Vec<RuleDoc>,
    /// Enable the per-NAT-entry byte counters.
    #[serde(default)]
    pub nat_accounting: bool,
}

/// One physical port.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PortDoc {
    /// Port index as seen by the I/O layer.
    pub port: u16,
    /// MTU in bytes.
    #[serde(default = "default_mtu")]
    pub mtu: u16,
    /// Addresses the device answers for on this port.
    pub addresses: Vec<AddressDoc>,
}

fn default_mtu() -> u16 {
    1500
}

/// An `(address, vlan)` binding. VLAN 0 means untagged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AddressDoc {
    /// The IPv4 address.
    pub ip: Ipv4Addr,
    /// VLAN id the address lives on; 0 for untagged traffic.
    #[serde(default)]
    pub vlan: u16,
}

/// A NAT pair `from <-> to`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NatPairDoc {
    /// One side of the mapping.
    pub from: Ipv4Addr,
    /// The other side.
    pub to: Ipv4Addr,
}

/// Which address a `nat_rewrite` rule touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldDoc {
    /// Source address.
    Src,
    /// Destination address.
    Dst,
}

/// Parameters of the `out` action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutDoc {
    /// Egress port.
    pub port: u16,
    /// VLAN TCI for the emitted frame; 0 emits untagged.
    #[serde(default)]
    pub vlan: u16,
    /// Next-hop MAC address, `aa:bb:cc:dd:ee:ff` notation.
    pub next_hop: MacDoc,
}

/// A match predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredicateDoc {
    /// IPv4 source inside the prefix.
    SrcInNet(ipnet::Ipv4Net),
    /// IPv4 destination inside the prefix.
    DstInNet(ipnet::Ipv4Net),
    /// VLAN id equals the value.
    Vlan(u16),
    /// Every listed predicate holds (short-circuit, in order).
    AllOf(Vec<PredicateDoc>),
    /// At least one listed predicate holds (short-circuit, in order).
    AnyOf(Vec<PredicateDoc>),
}

/// One rule node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleDoc {
    /// Conditional execution.
    If {
        /// The predicate.
        when: PredicateDoc,
        /// Rules executed on a match.
        then: Vec<RuleDoc>,
        /// Rules executed on a mismatch.
        #[serde(default)]
        otherwise: Vec<RuleDoc>,
    },
    /// Unconditional drop.
    Drop,
    /// Log a packet summary.
    Print,
    /// Translate an address through the NAT table.
    NatRewrite(FieldDoc),
    /// Emit the packet.
    Out(OutDoc),
}

/// A [`Mac`] that (de)serialises as the usual colon-separated string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MacDoc(pub Mac);

impl Serialize for MacDoc {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for MacDoc {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse::<Mac>()
            .map(MacDoc)
            .map_err(|e| D::Error::custom(e.to_string()))
    }
}

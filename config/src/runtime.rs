// SPDX-License-Identifier: Apache-2.0
// Copyright Natplane Contributors

//! The immutable runtime configuration bundle.

use pipeline::Rule;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, Ordering};
use xlat::NatTable;

/// An `(address, vlan)` pair a port answers for. VLAN 0 means untagged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpVlan {
    /// The IPv4 address.
    pub ip: Ipv4Addr,
    /// VLAN id, 0 for untagged.
    pub vlan: u16,
}

/// Runtime settings of one physical port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortConfig {
    /// Addresses the device answers for on this port.
    pub addresses: Vec<IpVlan>,
    /// MTU in bytes.
    pub mtu: u16,
}

/// The bundle a worker executes: ports, NAT table, rule tree.
///
/// Immutable once published. The `used` flag is the reload handshake:
/// the owning worker release-stores `true` at the top of each loop
/// iteration, and the coordinator acquire-loads it to learn that the
/// worker both installed this configuration and ran at least one
/// iteration with it, at which point the predecessor can be released.
#[derive(Debug)]
pub struct Configuration {
    /// Per-port settings, indexed by port id.
    pub ports: Vec<PortConfig>,
    /// The translation table.
    pub nat: NatTable,
    /// Root of the rule tree; `None` is an implicit drop-everything.
    pub rules: Option<Rule>,
    used: AtomicBool,
}

impl Configuration {
    /// Assemble a bundle with the `used` flag clear.
    pub fn new(ports: Vec<PortConfig>, nat: NatTable, rules: Option<Rule>) -> Self {
        Configuration {
            ports,
            nat,
            rules,
            used: AtomicBool::new(false),
        }
    }

    /// Record that the owning worker is executing iterations with this
    /// configuration (release: everything the worker did with the
    /// predecessor happens-before the coordinator observing the flag).
    #[inline]
    pub fn mark_used(&self) {
        self.used.store(true, Ordering::Release);
    }

    /// Has the owning worker picked this configuration up?
    #[inline]
    pub fn is_used(&self) -> bool {
        self.used.load(Ordering::Acquire)
    }

    /// True iff `ip` is bound on any port for `vlan`.
    #[inline]
    pub fn is_local_ip(&self, ip: Ipv4Addr, vlan: u16) -> bool {
        self.ports
            .iter()
            .any(|port| port.addresses.iter().any(|a| a.ip == ip && a.vlan == vlan))
    }

    /// True iff `ip` is bound on `port` for `vlan`.
    #[inline]
    pub fn is_port_ip(&self, ip: Ipv4Addr, vlan: u16, port: u16) -> bool {
        self.ports
            .get(usize::from(port))
            .is_some_and(|p| p.addresses.iter().any(|a| a.ip == ip && a.vlan == vlan))
    }
}

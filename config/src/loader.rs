// SPDX-License-Identifier: Apache-2.0
// Copyright Natplane Contributors

//! Document validation and construction of runtime configurations.
//!
//! Loading is two-phase: [`load_document`] parses the file into a
//! [`ConfigDoc`]; [`build`] validates it against the port count reported
//! by the I/O layer and produces one fresh [`Configuration`]. A failure in
//! either phase leaves nothing partially published.

use crate::doc::{ConfigDoc, FieldDoc, PredicateDoc, RuleDoc};
use crate::runtime::{Configuration, IpVlan, PortConfig};
use pipeline::{Action, NatField, OutPort, Predicate, Rule};
use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::path::Path;
use tracing::debug;
use xlat::{NatTable, NatTableError};

/// The smallest MTU IPv4 requires hosts to accept.
const MIN_MTU: u16 = 68;

/// Errors surfaced while loading or validating a configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("cannot read configuration: {0}")]
    Io(#[from] std::io::Error),
    /// The document does not match the expected grammar.
    #[error("cannot parse configuration: {0}")]
    Parse(#[from] serde_yaml_ng::Error),
    /// A port id is outside the range the I/O layer exposes.
    #[error("port {port} does not exist ({num_ports} ports available)")]
    UnknownPort {
        /// Offending port id.
        port: u16,
        /// Number of ports available.
        num_ports: u16,
    },
    /// The same port is configured twice.
    #[error("port {port} is configured more than once")]
    DuplicatePortConfig {
        /// Offending port id.
        port: u16,
    },
    /// A physical port has no configuration block.
    #[error("port {port} has no configuration")]
    MissingPortConfig {
        /// Offending port id.
        port: u16,
    },
    /// A port block lists no addresses.
    #[error("port {port} has no addresses")]
    NoAddresses {
        /// Offending port id.
        port: u16,
    },
    /// The same `(ip, vlan)` appears twice on one port.
    #[error("duplicate address {ip} on vlan {vlan} for port {port}")]
    DuplicateAddress {
        /// Offending port id.
        port: u16,
        /// Duplicated address.
        ip: Ipv4Addr,
        /// VLAN the address is bound to.
        vlan: u16,
    },
    /// The MTU is out of range.
    #[error("port {port}: mtu {mtu} out of range [{MIN_MTU}, 9000]")]
    BadMtu {
        /// Offending port id.
        port: u16,
        /// Configured MTU.
        mtu: u16,
    },
    /// A NAT pair is invalid.
    #[error("invalid nat pair: {0}")]
    Nat(#[from] NatTableError),
    /// A VLAN id does not fit 12 bits.
    #[error("vlan {vlan} out of range [0, 4095]")]
    BadVlan {
        /// Offending VLAN value.
        vlan: u16,
    },
    /// An `all_of`/`any_of` predicate with no members.
    #[error("empty predicate list")]
    EmptyPredicate,
    /// An `if` rule with no `then` body.
    #[error("if rule with an empty then body")]
    EmptyRuleBody,
}

/// Read and parse the configuration file.
pub fn load_document(path: &Path) -> Result<ConfigDoc, ConfigError> {
    let text = std::fs::read_to_string(path)?;
    let doc: ConfigDoc = serde_yaml_ng::from_str(&text)?;
    debug!(
        "parsed configuration: {} ports, {} nat pairs, {} rules",
        doc.ports.len(),
        doc.nat.len(),
        doc.rules.len()
    );
    Ok(doc)
}

/// Validate `doc` against the `num_ports` the I/O layer exposes and build
/// a fresh runtime configuration with its `used` flag clear.
pub fn build(doc: &ConfigDoc, num_ports: u16) -> Result<Configuration, ConfigError> {
    let ports = build_ports(doc, num_ports)?;
    let nat = build_nat(doc)?;
    let rules = build_rules(doc, num_ports)?;
    Ok(Configuration::new(ports, nat, rules))
}

fn build_ports(doc: &ConfigDoc, num_ports: u16) -> Result<Vec<PortConfig>, ConfigError> {
    let mut ports: Vec<Option<PortConfig>> = (0..num_ports).map(|_| None).collect();
    for port_doc in &doc.ports {
        let slot = ports
            .get_mut(usize::from(port_doc.port))
            .ok_or(ConfigError::UnknownPort {
                port: port_doc.port,
                num_ports,
            })?;
        if slot.is_some() {
            return Err(ConfigError::DuplicatePortConfig {
                port: port_doc.port,
            });
        }
        if port_doc.addresses.is_empty() {
            return Err(ConfigError::NoAddresses {
                port: port_doc.port,
            });
        }
        if port_doc.mtu < MIN_MTU || port_doc.mtu > 9000 {
            return Err(ConfigError::BadMtu {
                port: port_doc.port,
                mtu: port_doc.mtu,
            });
        }
        let mut seen = HashSet::new();
        let mut addresses = Vec::with_capacity(port_doc.addresses.len());
        for address in &port_doc.addresses {
            if address.vlan > 0xfff {
                return Err(ConfigError::BadVlan { vlan: address.vlan });
            }
            if !seen.insert((address.ip, address.vlan)) {
                return Err(ConfigError::DuplicateAddress {
                    port: port_doc.port,
                    ip: address.ip,
                    vlan: address.vlan,
                });
            }
            addresses.push(IpVlan {
                ip: address.ip,
                vlan: address.vlan,
            });
        }
        *slot = Some(PortConfig {
            addresses,
            mtu: port_doc.mtu,
        });
    }
    ports
        .into_iter()
        .enumerate()
        .map(|(port, slot)| {
            let port = u16::try_from(port).unwrap_or(u16::MAX);
            slot.ok_or(ConfigError::MissingPortConfig { port })
        })
        .collect()
}

fn build_nat(doc: &ConfigDoc) -> Result<NatTable, ConfigError> {
    let mut nat = NatTable::with_accounting(doc.nat_accounting);
    for pair in &doc.nat {
        nat.insert_pair(pair.from, pair.to)?;
    }
    Ok(nat)
}

fn build_rules(doc: &ConfigDoc, num_ports: u16) -> Result<Option<Rule>, ConfigError> {
    let rules = doc
        .rules
        .iter()
        .map(|rule| build_rule(rule, num_ports))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Rule::sequence(rules))
}

fn build_rule(rule: &RuleDoc, num_ports: u16) -> Result<Rule, ConfigError> {
    Ok(match rule {
        RuleDoc::Drop => Rule::Action(Action::Drop),
        RuleDoc::Print => Rule::Action(Action::Print),
        RuleDoc::NatRewrite(field) => Rule::Action(Action::NatRewrite(match field {
            FieldDoc::Src => NatField::Src,
            FieldDoc::Dst => NatField::Dst,
        })),
        RuleDoc::Out(out) => {
            if out.port >= num_ports {
                return Err(ConfigError::UnknownPort {
                    port: out.port,
                    num_ports,
                });
            }
            if out.vlan > 0xfff {
                return Err(ConfigError::BadVlan { vlan: out.vlan });
            }
            Rule::Action(Action::Out(OutPort {
                port: out.port,
                vlan: out.vlan,
                next_hop: out.next_hop.0,
            }))
        }
        RuleDoc::If {
            when,
            then,
            otherwise,
        } => {
            let when = build_predicate(when)?;
            let then = then
                .iter()
                .map(|r| build_rule(r, num_ports))
                .collect::<Result<Vec<_>, _>>()?;
            let Some(then) = Rule::sequence(then) else {
                return Err(ConfigError::EmptyRuleBody);
            };
            let otherwise = otherwise
                .iter()
                .map(|r| build_rule(r, num_ports))
                .collect::<Result<Vec<_>, _>>()?;
            Rule::If {
                when,
                then: Box::new(then),
                otherwise: Rule::sequence(otherwise).map(Box::new),
            }
        }
    })
}

fn build_predicate(pred: &PredicateDoc) -> Result<Predicate, ConfigError> {
    Ok(match pred {
        PredicateDoc::SrcInNet(net) => Predicate::SrcInNet(*net),
        PredicateDoc::DstInNet(net) => Predicate::DstInNet(*net),
        PredicateDoc::Vlan(vlan) => {
            if *vlan > 0xfff {
                return Err(ConfigError::BadVlan { vlan: *vlan });
            }
            Predicate::VlanIs(*vlan)
        }
        PredicateDoc::AllOf(list) => fold_predicates(list, Predicate::And)?,
        PredicateDoc::AnyOf(list) => fold_predicates(list, Predicate::Or)?,
    })
}

fn fold_predicates(
    list: &[PredicateDoc],
    combine: fn(Box<Predicate>, Box<Predicate>) -> Predicate,
) -> Result<Predicate, ConfigError> {
    let mut iter = list.iter();
    let first = iter.next().ok_or(ConfigError::EmptyPredicate)?;
    let mut acc = build_predicate(first)?;
    for next in iter {
        acc = combine(Box::new(acc), Box::new(build_predicate(next)?));
    }
    Ok(acc)
}

// SPDX-License-Identifier: Apache-2.0
// Copyright Natplane Contributors

//! Loading configurations from disk.

#![allow(clippy::unwrap_used)]

use natplane_config::{ConfigError, build, load_document};
use std::io::Write;
use std::path::PathBuf;

fn write_temp(name: &str, contents: &str) -> PathBuf {
    let mut path = std::env::temp_dir();
    path.push(format!("natplane-test-{}-{name}", std::process::id()));
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    path
}

#[test]
fn loads_and_builds_from_disk() {
    let path = write_temp(
        "valid.yaml",
        r"
ports:
  - port: 0
    addresses: [{ ip: 10.2.31.11 }]
  - port: 1
    addresses: [{ ip: 212.47.255.91 }]
nat:
  - { from: 10.0.0.5, to: 212.47.0.5 }
rules:
  - if:
      when: { src_in_net: 10.0.0.0/8 }
      then:
        - nat_rewrite: src
        - out: { port: 1, next_hop: '7c:0e:ce:25:f3:97' }
",
    );
    let doc = load_document(&path).unwrap();
    let cfg = build(&doc, 2).unwrap();
    assert_eq!(cfg.nat.rule_count(), 1);
    std::fs::remove_file(path).ok();
}

#[test]
fn missing_file_is_an_io_error() {
    let err = load_document(std::path::Path::new("/nonexistent/natplane.yaml")).unwrap_err();
    assert!(matches!(err, ConfigError::Io(_)));
}

#[test]
fn malformed_yaml_is_a_parse_error() {
    let path = write_temp("broken.yaml", "ports: [not a port");
    let err = load_document(&path).unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)));
    std::fs::remove_file(path).ok();
}

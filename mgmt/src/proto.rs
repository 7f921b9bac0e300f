// SPDX-License-Identifier: Apache-2.0
// Copyright Natplane Contributors

//! The admin wire protocol.
//!
//! A request is a single command byte. A reply is a fixed header — the
//! echoed command byte, a status byte, a big-endian payload length —
//! followed by the payload. Counter payloads are sequences of big-endian
//! `u64`s so the CLI client needs no struct layout knowledge.

use stats::{AppStatsSnapshot, PortStats};

/// Status byte for success.
pub const STATUS_OK: u8 = 0;
/// Status byte for a generic failure; the payload carries detail.
pub const STATUS_ERR: u8 = 1;

/// Command identifiers. Values are wire ABI; do not renumber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CmdType {
    /// Liveness probe.
    Status = 1,
    /// Graceful shutdown.
    Exit = 2,
    /// Reload the configuration from disk.
    Reload = 3,
    /// Zero the NIC counters on every port.
    ResetStats = 4,
    /// Per-port NIC counters.
    PortStats = 5,
    /// Extended NIC counters.
    PortXstats = 6,
    /// Per-worker application counters.
    AppStats = 7,
    /// Version string.
    Version = 8,
}

impl TryFrom<u8> for CmdType {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            1 => CmdType::Status,
            2 => CmdType::Exit,
            3 => CmdType::Reload,
            4 => CmdType::ResetStats,
            5 => CmdType::PortStats,
            6 => CmdType::PortXstats,
            7 => CmdType::AppStats,
            8 => CmdType::Version,
            other => return Err(other),
        })
    }
}

/// The fixed reply prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplyHeader {
    /// Echo of the command byte.
    pub cmd: u8,
    /// [`STATUS_OK`] or an error code.
    pub status: u8,
    /// Payload length in bytes.
    pub data_size: u16,
}

impl ReplyHeader {
    /// Encoded size.
    pub const LEN: usize = 4;

    /// Encode, data size big-endian.
    pub fn to_bytes(self) -> [u8; Self::LEN] {
        let size = self.data_size.to_be_bytes();
        [self.cmd, self.status, size[0], size[1]]
    }

    /// Decode a received header.
    pub fn from_bytes(bytes: [u8; Self::LEN]) -> Self {
        ReplyHeader {
            cmd: bytes[0],
            status: bytes[1],
            data_size: u16::from_be_bytes([bytes[2], bytes[3]]),
        }
    }
}

/// Assemble a full reply frame. Payloads beyond the 16-bit length field
/// are truncated; in practice they never get close.
pub fn encode_reply(cmd: u8, status: u8, payload: &[u8]) -> Vec<u8> {
    let payload = &payload[..payload.len().min(usize::from(u16::MAX))];
    #[allow(clippy::cast_possible_truncation)]
    let header = ReplyHeader {
        cmd,
        status,
        data_size: payload.len() as u16,
    };
    let mut frame = Vec::with_capacity(ReplyHeader::LEN + payload.len());
    frame.extend_from_slice(&header.to_bytes());
    frame.extend_from_slice(payload);
    frame
}

/// Encode the `app_stats` payload: one `{worker_id, counters}` record per
/// worker, in worker order.
pub fn encode_app_stats(records: &[(u8, AppStatsSnapshot)]) -> Vec<u8> {
    let mut out = Vec::with_capacity(records.len() * (1 + AppStatsSnapshot::WIRE_LEN));
    for (worker_id, snapshot) in records {
        out.push(*worker_id);
        out.extend_from_slice(&snapshot.to_be_bytes());
    }
    out
}

/// Encode the `stats` payload: one counter block per port, port order.
pub fn encode_port_stats(ports: &[PortStats]) -> Vec<u8> {
    let mut out = Vec::with_capacity(ports.len() * PortStats::WIRE_LEN);
    for port in ports {
        out.extend_from_slice(&port.to_be_bytes());
    }
    out
}

// SPDX-License-Identifier: Apache-2.0
// Copyright Natplane Contributors

//! End-to-end exercise of the admin channel over a real loopback socket.

#![allow(clippy::unwrap_used)]

use natplane_mgmt::proto::{CmdType, ReplyHeader, STATUS_ERR, STATUS_OK};
use natplane_mgmt::{AdminBackend, AdminError, ReloadError, run_admin_server};
use stats::{AppStatsSnapshot, PortStats};
use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Default)]
struct MockBackend {
    reloads: Arc<AtomicUsize>,
    resets: Arc<AtomicUsize>,
    fail_reload: bool,
    shutdown: Arc<AtomicBool>,
}

impl AdminBackend for MockBackend {
    fn version(&self) -> String {
        "natplane 0.1.0-test".to_string()
    }

    fn reload(&mut self) -> Result<usize, AdminError> {
        if self.fail_reload {
            return Err(AdminError::Reload(ReloadError::WorkerDead { worker: 0 }));
        }
        self.reloads.fetch_add(1, Ordering::SeqCst);
        Ok(42)
    }

    fn app_stats(&self) -> Vec<(u8, AppStatsSnapshot)> {
        vec![(
            1,
            AppStatsSnapshot {
                drop_no_rule: 5,
                ..Default::default()
            },
        )]
    }

    fn port_stats(&self) -> Vec<PortStats> {
        vec![
            PortStats {
                ipackets: 10,
                ..Default::default()
            },
            PortStats {
                opackets: 20,
                ..Default::default()
            },
        ]
    }

    fn port_xstats(&self) -> String {
        "port 0: rx_good_packets=10\n".to_string()
    }

    fn reset_port_stats(&mut self) -> Result<(), AdminError> {
        self.resets.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn workers_alive(&self) -> usize {
        1
    }

    fn request_shutdown(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }
}

struct Client {
    stream: TcpStream,
}

impl Client {
    fn command(&mut self, cmd: CmdType) -> (ReplyHeader, Vec<u8>) {
        self.stream.write_all(&[cmd as u8]).unwrap();
        let mut header = [0u8; ReplyHeader::LEN];
        self.stream.read_exact(&mut header).unwrap();
        let header = ReplyHeader::from_bytes(header);
        let mut payload = vec![0u8; usize::from(header.data_size)];
        self.stream.read_exact(&mut payload).unwrap();
        (header, payload)
    }
}

fn start_server(backend: MockBackend) -> (Client, Arc<AtomicBool>, std::thread::JoinHandle<()>) {
    // Bind on an ephemeral std listener first to learn a free port, then
    // hand that address to the server.
    let probe = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = probe.local_addr().unwrap();
    drop(probe);

    let stop = Arc::new(AtomicBool::new(false));
    let stop_server = Arc::clone(&stop);
    let handle = std::thread::spawn(move || {
        let mut backend = backend;
        let _ = run_admin_server(addr, &mut backend, &stop_server);
    });

    // The server needs a moment to bind.
    let stream = loop {
        match TcpStream::connect(addr) {
            Ok(stream) => break stream,
            Err(_) => std::thread::sleep(Duration::from_millis(10)),
        }
    };
    stream
        .set_read_timeout(Some(Duration::from_secs(10)))
        .unwrap();
    (Client { stream }, stop, handle)
}

#[test]
fn full_command_round_trip() {
    let reloads = Arc::new(AtomicUsize::new(0));
    let resets = Arc::new(AtomicUsize::new(0));
    let shutdown = Arc::new(AtomicBool::new(false));
    let backend = MockBackend {
        reloads: Arc::clone(&reloads),
        resets: Arc::clone(&resets),
        fail_reload: false,
        shutdown: Arc::clone(&shutdown),
    };
    let (mut client, _stop, handle) = start_server(backend);

    let (header, payload) = client.command(CmdType::Status);
    assert_eq!(header.cmd, CmdType::Status as u8);
    assert_eq!(header.status, STATUS_OK);
    assert!(payload.is_empty());

    let (header, payload) = client.command(CmdType::Version);
    assert_eq!(header.status, STATUS_OK);
    assert_eq!(payload, b"natplane 0.1.0-test");

    let (header, payload) = client.command(CmdType::Reload);
    assert_eq!(header.status, STATUS_OK);
    assert_eq!(payload, 42u32.to_be_bytes());
    assert_eq!(reloads.load(Ordering::SeqCst), 1);

    let (header, payload) = client.command(CmdType::PortStats);
    assert_eq!(header.status, STATUS_OK);
    assert_eq!(payload.len(), 2 * PortStats::WIRE_LEN);
    assert_eq!(&payload[..8], &10u64.to_be_bytes());

    let (header, payload) = client.command(CmdType::AppStats);
    assert_eq!(header.status, STATUS_OK);
    assert_eq!(payload.len(), 1 + AppStatsSnapshot::WIRE_LEN);
    assert_eq!(payload[0], 1);
    assert_eq!(&payload[1..9], &5u64.to_be_bytes());

    let (header, payload) = client.command(CmdType::PortXstats);
    assert_eq!(header.status, STATUS_OK);
    assert!(String::from_utf8(payload).unwrap().contains("rx_good_packets"));

    let (header, _) = client.command(CmdType::ResetStats);
    assert_eq!(header.status, STATUS_OK);
    assert_eq!(resets.load(Ordering::SeqCst), 1);

    let (header, _) = client.command(CmdType::Exit);
    assert_eq!(header.status, STATUS_OK);
    assert!(shutdown.load(Ordering::SeqCst));

    handle.join().unwrap();
}

#[test]
fn failed_reload_reports_error_and_keeps_serving() {
    let backend = MockBackend {
        fail_reload: true,
        ..Default::default()
    };
    let (mut client, stop, handle) = start_server(backend);

    let (header, payload) = client.command(CmdType::Reload);
    assert_eq!(header.status, STATUS_ERR);
    assert!(
        String::from_utf8(payload)
            .unwrap()
            .contains("died during reload")
    );

    // The channel survives a failed reload.
    let (header, _) = client.command(CmdType::Status);
    assert_eq!(header.status, STATUS_OK);

    stop.store(true, Ordering::SeqCst);
    handle.join().unwrap();
}

#[test]
fn unknown_command_disconnects_the_client() {
    let backend = MockBackend::default();
    let (mut client, stop, handle) = start_server(backend);

    client.stream.write_all(&[0xee]).unwrap();
    let mut buf = [0u8; 1];
    // Server closes the connection without a reply.
    assert_eq!(client.stream.read(&mut buf).unwrap(), 0);

    stop.store(true, Ordering::SeqCst);
    handle.join().unwrap();
}

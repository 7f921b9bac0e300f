// SPDX-License-Identifier: Apache-2.0
// Copyright Natplane Contributors

//! The admin server loop.
//!
//! Runs on the control thread, the only thread allowed to block. Sockets
//! are polled with a one-second timeout; every tick also checks that the
//! workers are still alive, so a wedged data path is noticed even with no
//! admin client connected.

use crate::backend::AdminBackend;
use crate::proto::{self, CmdType, STATUS_ERR, STATUS_OK};
use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token};
use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, error, info, warn};

const LISTENER: Token = Token(0);
const MAX_CLIENTS: usize = 16;

/// Run the admin server until an `exit` command arrives, `stop` is set
/// from outside (signal handler), or every worker died.
pub fn run_admin_server<B: AdminBackend>(
    addr: SocketAddr,
    backend: &mut B,
    stop: &Arc<AtomicBool>,
) -> io::Result<()> {
    let mut poll = Poll::new()?;
    let mut listener = TcpListener::bind(addr)?;
    poll.registry()
        .register(&mut listener, LISTENER, Interest::READABLE)?;
    info!("admin server listening on {addr}");

    let mut events = Events::with_capacity(64);
    let mut clients: HashMap<Token, TcpStream> = HashMap::new();
    let mut next_token = 1usize;
    let mut last_alive = backend.workers_alive();

    loop {
        if let Err(e) = poll.poll(&mut events, Some(Duration::from_secs(1)))
            && e.kind() != io::ErrorKind::Interrupted
        {
            return Err(e);
        }

        let alive = backend.workers_alive();
        if alive == 0 {
            error!("no worker running, admin server exiting");
            return Err(io::Error::other("all workers died"));
        }
        if alive < last_alive {
            error!("some workers stopped! only {alive} workers are running");
        }
        last_alive = alive;

        if stop.load(Ordering::Relaxed) {
            info!("shutdown requested, admin server exiting");
            return Ok(());
        }

        for event in &events {
            match event.token() {
                LISTENER => {
                    accept_clients(&mut listener, &poll, &mut clients, &mut next_token);
                }
                token => {
                    let Some(stream) = clients.get_mut(&token) else {
                        continue;
                    };
                    match serve_client(stream, backend, stop) {
                        ClientState::Keep => {}
                        ClientState::Close => {
                            if let Some(mut stream) = clients.remove(&token) {
                                let _ = poll.registry().deregister(&mut stream);
                            }
                        }
                    }
                }
            }
        }

        if stop.load(Ordering::Relaxed) {
            info!("exit command handled, admin server exiting");
            return Ok(());
        }
    }
}

fn accept_clients(
    listener: &mut TcpListener,
    poll: &Poll,
    clients: &mut HashMap<Token, TcpStream>,
    next_token: &mut usize,
) {
    loop {
        match listener.accept() {
            Ok((mut stream, peer)) => {
                if clients.len() >= MAX_CLIENTS {
                    warn!("admin server: rejecting {peer}, too many connections");
                    continue;
                }
                let token = Token(*next_token);
                *next_token += 1;
                if let Err(e) = poll.registry().register(
                    &mut stream,
                    token,
                    Interest::READABLE,
                ) {
                    warn!("admin server: cannot register client {peer}: {e}");
                    continue;
                }
                debug!("admin server: client {peer} connected");
                clients.insert(token, stream);
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
            Err(e) => {
                warn!("admin server: accept error: {e}");
                return;
            }
        }
    }
}

enum ClientState {
    Keep,
    Close,
}

fn serve_client<B: AdminBackend>(
    stream: &mut TcpStream,
    backend: &mut B,
    stop: &Arc<AtomicBool>,
) -> ClientState {
    // Drain the socket: the poll is edge-triggered, so commands that
    // arrived back to back must all be handled now.
    loop {
        let mut cmd = [0u8; 1];
        match stream.read(&mut cmd) {
            Ok(0) => return ClientState::Close,
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return ClientState::Keep,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                warn!("admin server: client read error: {e}");
                return ClientState::Close;
            }
        }

        let Ok(cmd) = CmdType::try_from(cmd[0]) else {
            warn!("admin server: unknown command {:#04x}", cmd[0]);
            return ClientState::Close;
        };
        let reply = dispatch(cmd, backend, stop);
        if let Err(e) = write_all_blocking(stream, &reply) {
            warn!("admin server: client write error: {e}");
            return ClientState::Close;
        }
    }
}

fn dispatch<B: AdminBackend>(cmd: CmdType, backend: &mut B, stop: &Arc<AtomicBool>) -> Vec<u8> {
    let cmd_byte = cmd as u8;
    match cmd {
        CmdType::Status => proto::encode_reply(cmd_byte, STATUS_OK, &[]),
        CmdType::Version => {
            proto::encode_reply(cmd_byte, STATUS_OK, backend.version().as_bytes())
        }
        CmdType::Reload => match backend.reload() {
            Ok(nat_rules) => {
                let count = u32::try_from(nat_rules).unwrap_or(u32::MAX);
                proto::encode_reply(cmd_byte, STATUS_OK, &count.to_be_bytes())
            }
            Err(e) => {
                error!("reload failed: {e}");
                proto::encode_reply(cmd_byte, STATUS_ERR, e.to_string().as_bytes())
            }
        },
        CmdType::ResetStats => match backend.reset_port_stats() {
            Ok(()) => proto::encode_reply(cmd_byte, STATUS_OK, &[]),
            Err(e) => proto::encode_reply(cmd_byte, STATUS_ERR, e.to_string().as_bytes()),
        },
        CmdType::PortStats => {
            let payload = proto::encode_port_stats(&backend.port_stats());
            proto::encode_reply(cmd_byte, STATUS_OK, &payload)
        }
        CmdType::PortXstats => {
            proto::encode_reply(cmd_byte, STATUS_OK, backend.port_xstats().as_bytes())
        }
        CmdType::AppStats => {
            let payload = proto::encode_app_stats(&backend.app_stats());
            proto::encode_reply(cmd_byte, STATUS_OK, &payload)
        }
        CmdType::Exit => {
            backend.request_shutdown();
            stop.store(true, Ordering::Relaxed);
            proto::encode_reply(cmd_byte, STATUS_OK, &[])
        }
    }
}

/// Write a whole reply on a non-blocking socket. Replies are tiny; a
/// short nap on `WouldBlock` is acceptable on the control thread.
fn write_all_blocking(stream: &mut TcpStream, mut data: &[u8]) -> io::Result<()> {
    while !data.is_empty() {
        match stream.write(data) {
            Ok(0) => return Err(io::Error::new(io::ErrorKind::WriteZero, "write zero")),
            Ok(n) => data = &data[n..],
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(1));
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

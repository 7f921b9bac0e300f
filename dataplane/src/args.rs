// SPDX-License-Identifier: Apache-2.0
// Copyright Natplane Contributors

pub(crate) use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "natplane")]
#[command(version)]
#[command(about = "User-space stateless 1:1 IPv4 NAT data-plane", long_about = None)]
pub(crate) struct CmdArgs {
    /// Configuration file.
    #[arg(short = 'f', long = "config", value_name = "PATH")]
    pub config: PathBuf,

    /// Packet driver to use: kernel or sim.
    #[arg(long, default_value = "kernel", value_name = "DRIVER")]
    pub driver: String,

    /// Kernel driver: interface names, in port order.
    #[arg(long, value_name = "IFNAME")]
    pub interface: Vec<String>,

    /// Sim driver: number of ports to model.
    #[arg(long, default_value_t = 2, value_name = "N")]
    pub sim_ports: u16,

    /// Number of worker threads.
    #[arg(
        long,
        value_name = "N",
        default_value_t = 1,
        value_parser = clap::value_parser!(u16).range(1..=64)
    )]
    pub num_workers: u16,

    /// CPUs to pin workers to, in worker order (e.g. --worker-cores 2,3).
    /// Workers beyond the list run unpinned.
    #[arg(long, value_delimiter = ',', value_name = "CPU")]
    pub worker_cores: Vec<usize>,

    /// Admin channel listen address.
    #[arg(long, default_value = "127.0.0.1:4242", value_name = "ADDR")]
    pub admin_address: SocketAddr,
}

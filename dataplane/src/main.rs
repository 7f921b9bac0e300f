// SPDX-License-Identifier: Apache-2.0
// Copyright Natplane Contributors

#![deny(clippy::all)]

//! The natplane binary: a user-space stateless 1:1 IPv4 NAT data-plane.
//!
//! One control thread owns the admin channel and reload orchestration;
//! N worker threads, each pinned to its own CPU, run the forwarding loop
//! over their private NIC queues.

mod args;

use crate::args::{CmdArgs, Parser};
use config::{ConfigDoc, ConfigSlot};
use mgmt::run_admin_server;
use natplane::admin::Backend;
use natplane::drivers::kernel::KernelDriver;
use natplane::drivers::sim::SimNet;
use natplane::drivers::{PortIo, PortStatsSource};
use natplane::worker::Worker;
use stats::WorkerStats;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn init_logging() {
    tracing_subscriber::fmt()
        .with_target(true)
        .with_thread_names(true)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}

fn pin_to_core(worker: u32, core: usize) {
    use nix::sched::{CpuSet, sched_setaffinity};
    use nix::unistd::Pid;

    let mut set = CpuSet::new();
    if let Err(e) = set.set(core) {
        warn!("worker {worker}: cpu {core} out of range: {e}");
        return;
    }
    match sched_setaffinity(Pid::from_raw(0), &set) {
        Ok(()) => info!("worker {worker} pinned to cpu {core}"),
        Err(e) => warn!("worker {worker}: cannot pin to cpu {core}: {e}"),
    }
}

struct WorkerSet {
    slots: Vec<Arc<ConfigSlot>>,
    stats: Vec<Arc<WorkerStats>>,
    handles: Vec<JoinHandle<()>>,
}

fn launch_workers<P: PortIo>(
    endpoints: Vec<P>,
    doc: &ConfigDoc,
    num_ports: u16,
    cores: &[usize],
    stop: &Arc<AtomicBool>,
) -> Result<WorkerSet, Box<dyn std::error::Error>> {
    let mut set = WorkerSet {
        slots: Vec::new(),
        stats: Vec::new(),
        handles: Vec::new(),
    };
    for (id, io) in endpoints.into_iter().enumerate() {
        let cfg = Arc::new(config::build(doc, num_ports)?);
        let slot = Arc::new(ConfigSlot::new());
        let stats = Arc::new(WorkerStats::new());
        let core = cores.get(id).copied();
        let worker_id = u32::try_from(id).unwrap_or(u32::MAX);
        let mut worker = Worker::new(
            worker_id,
            io,
            cfg,
            Arc::clone(&slot),
            Arc::clone(&stats),
            Arc::clone(stop),
        );
        let handle = std::thread::Builder::new()
            .name(format!("worker{id}"))
            .spawn(move || {
                if let Some(core) = core {
                    pin_to_core(worker_id, core);
                }
                worker.run();
            })?;
        set.slots.push(slot);
        set.stats.push(stats);
        set.handles.push(handle);
    }
    Ok(set)
}

fn run(args: &CmdArgs) -> Result<(), Box<dyn std::error::Error>> {
    let stop = Arc::new(AtomicBool::new(false));
    let stop_signal = Arc::clone(&stop);
    ctrlc::set_handler(move || stop_signal.store(true, Ordering::Relaxed))?;

    let doc = config::load_document(&args.config)?;

    let (set, port_counters): (WorkerSet, Arc<dyn PortStatsSource>) = match args.driver.as_str() {
        "sim" => {
            info!("using sim driver with {} ports", args.sim_ports);
            let hub = SimNet::new(args.sim_ports);
            let endpoints = (0..args.num_workers).map(|_| hub.endpoint()).collect();
            let set = launch_workers(
                endpoints,
                &doc,
                args.sim_ports,
                &args.worker_cores,
                &stop,
            )?;
            (set, hub as Arc<dyn PortStatsSource>)
        }
        "kernel" => {
            info!("using kernel driver on {:?}", args.interface);
            let driver = KernelDriver::open(&args.interface)?;
            let num_ports = driver.num_ports();
            let endpoints = (0..args.num_workers)
                .map(|_| driver.endpoint())
                .collect::<Result<Vec<_>, _>>()?;
            let set = launch_workers(endpoints, &doc, num_ports, &args.worker_cores, &stop)?;
            (set, driver.stats_source())
        }
        other => {
            return Err(format!("unknown driver '{other}' (expected kernel or sim)").into());
        }
    };

    let num_ports = port_counters.num_ports();
    let mut backend = Backend {
        config_path: args.config.clone(),
        num_ports,
        slots: set.slots,
        worker_stats: set.stats,
        workers: set.handles,
        port_counters,
        stop: Arc::clone(&stop),
    };

    let served = run_admin_server(args.admin_address, &mut backend, &stop);

    info!("shutting down, waiting for workers");
    stop.store(true, Ordering::Relaxed);
    for handle in backend.workers.drain(..) {
        if handle.join().is_err() {
            error!("a worker panicked during shutdown");
        }
    }
    served?;
    Ok(())
}

fn main() -> ExitCode {
    init_logging();
    let args = CmdArgs::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

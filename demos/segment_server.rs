// Copyright (c) 2026 netsvc-core contributors. Licensed under Apache License, Version 2.0.

//! Runnable demo: a `SegmentHandler` echo service on a configurable bind
//! address. The CLI/config layer lives here, not in the library crate —
//! the core runtime itself takes no CLI or environment input.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use serde::Deserialize;

use netsvc_core::segment::SegmentHandler;
use netsvc_core::tcp::TcpService;
use netsvc_core::{AsyncWorker, Signal};

#[derive(Debug, Parser)]
#[command(name = "segment_server", about = "Echo segment service over TCP")]
struct Cli {
    /// Address to bind the listening socket to.
    #[arg(long, default_value = "127.0.0.1:9000")]
    bind: SocketAddr,
}

#[derive(Debug, Deserialize)]
struct ServiceConfig {
    bind: SocketAddr,
}

impl From<Cli> for ServiceConfig {
    fn from(cli: Cli) -> Self {
        Self { bind: cli.bind }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = ServiceConfig::from(Cli::parse());

    let worker = AsyncWorker::start::<TcpService<SegmentHandler>>((config.bind, SegmentHandler::new()))
        .expect("failed to start segment worker");

    tracing::info!(bind = %config.bind, "segment service started; press Ctrl-C to stop");

    ctrlc_wait();
    worker.signal(Signal::Terminate);
    drop(worker);
}

/// Block until the process receives SIGINT. Process-level signal trapping
/// is intentionally outside this crate's scope (`spec.md` §6); the demo
/// binary owns whatever OS-signal plumbing it needs to decide when to call
/// `Signal::Terminate`. Uses `signal-hook`'s `flag` registration, the same
/// crate the teacher links for this job — the only thing hand-rolled here
/// is the wait loop itself, since this runs on the main thread rather than
/// the reactor thread `signal-hook-mio` is built for.
fn ctrlc_wait() {
    let interrupted = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(signal_hook::consts::SIGINT, Arc::clone(&interrupted))
        .expect("failed to register SIGINT handler");
    while !interrupted.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(100));
    }
}

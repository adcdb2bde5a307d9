// Copyright (c) 2026 netsvc-core contributors. Licensed under Apache License, Version 2.0.

//! Error taxonomy (`spec.md` §7): everything here is fatal to the service
//! that produced it. Transient per-I/O failures (accept/recv/send/connect)
//! are deliberately absent — those are logged and swallowed at the
//! continuation boundary, never surfaced through a `Result`.
//!
//! Shape grounded on the teacher's `SubscribeError`
//! (`resilient_reactor_thread/rrt_types.rs`): one `thiserror` variant per
//! distinct failure mode, paired with a `miette::Diagnostic` code and, where
//! there's something actionable to say, a `help()`.

use miette::Diagnostic;
use thiserror::Error;

/// Failures while bringing a `TcpService` up: socket creation through the
/// handler's own `initialize` hook.
#[derive(Debug, Error, Diagnostic)]
pub enum SetupError {
    #[error("failed to create socket")]
    #[diagnostic(
        code(netsvc_core::setup::socket),
        help("check the process's open file descriptor limit")
    )]
    Socket(#[source] std::io::Error),

    #[error("failed to set a socket option")]
    #[diagnostic(code(netsvc_core::setup::sockopt))]
    SetSockOpt(#[source] std::io::Error),

    #[error("handler initialize() rejected the listening socket")]
    #[diagnostic(
        code(netsvc_core::setup::handler_initialize),
        help("the handler's initialize() hook returned an error before bind()")
    )]
    HandlerInitialize(#[source] std::io::Error),

    #[error("failed to bind listening socket")]
    #[diagnostic(
        code(netsvc_core::setup::bind),
        help("check the address is not already in use and the process can bind it")
    )]
    Bind(#[source] std::io::Error),

    #[error("failed to read the bound local address back from the socket")]
    #[diagnostic(code(netsvc_core::setup::getsockname))]
    GetSockName(#[source] std::io::Error),

    #[error("failed to mark the listening socket as listening")]
    #[diagnostic(code(netsvc_core::setup::listen))]
    Listen(#[source] std::io::Error),

    #[error("failed to register the listening socket with the event loop")]
    #[diagnostic(code(netsvc_core::setup::register))]
    Register(#[source] std::io::Error),
}

/// Failures starting a worker thread, before it has a chance to report
/// anything of its own.
#[derive(Debug, Error, Diagnostic)]
pub enum StartError {
    #[error("failed to create the worker's event loop")]
    #[diagnostic(code(netsvc_core::start::reactor))]
    Reactor(#[source] std::io::Error),

    #[error("failed to allocate the wake socketpair")]
    #[diagnostic(
        code(netsvc_core::start::socketpair),
        help("check the process's open file descriptor limit")
    )]
    SocketPair(#[source] std::io::Error),

    #[error("failed to spawn the worker thread")]
    #[diagnostic(code(netsvc_core::start::spawn))]
    Spawn(#[source] std::io::Error),

    #[error("the parent-side readiness handshake mutex was poisoned")]
    #[diagnostic(
        code(netsvc_core::start::poisoned),
        help("a prior panic on the worker thread while holding the readiness lock")
    )]
    Poisoned,
}

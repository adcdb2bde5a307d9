// Copyright (c) 2026 netsvc-core contributors. Licensed under Apache License, Version 2.0.

//! The accept continuation, `TcpService` itself, and the stop
//! choreography that unblocks it.

use std::cell::{Cell, RefCell};
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::rc::Rc;

use mio::net::TcpListener as MioTcpListener;
use mio::Interest;
use socket2::{Domain, Protocol, Socket, Type};

use crate::context::AsyncContext;
use crate::error::SetupError;
use crate::reactor::{Dialog, Reactor};
use crate::service::Service;
use crate::signal::Signal;

use super::connection::{reader, Connection};

/// The capability set a concrete TCP service implements: how to validate a
/// freshly-created listening socket, what to do with a signal other than
/// `Terminate`, and what to do with each full read.
pub trait StreamHandler: 'static {
    /// Called with the listening socket before `bind()`. The default does
    /// nothing; override to set additional socket options.
    fn initialize(&self, _socket: &Socket) -> std::io::Result<()> {
        Ok(())
    }

    /// Called for every signal other than `Terminate`, which the scaffold
    /// handles itself via the stop choreography.
    fn on_signal(&self, _signal: Signal) {}

    fn on_read(
        self: &Rc<Self>,
        reactor: &mut Reactor,
        ctx: &AsyncContext,
        conn: &Rc<Connection<Self>>,
        bytes: &[u8],
    ) where
        Self: Sized;
}

type StopClosure = Box<dyn Fn(&mut Reactor, &AsyncContext)>;

/// A TCP accept-loop-plus-per-connection-read-loop service, generic over
/// the handler that decides what a connection's bytes mean.
pub struct TcpService<H: StreamHandler> {
    handler: Rc<H>,
    bind_addr: SocketAddr,
    stop: RefCell<Option<StopClosure>>,
    local_addr: Cell<Option<SocketAddr>>,
}

impl<H: StreamHandler> TcpService<H> {
    pub fn new(bind_addr: SocketAddr, handler: H) -> Self {
        Self {
            handler: Rc::new(handler),
            bind_addr,
            stop: RefCell::new(None),
            local_addr: Cell::new(None),
        }
    }

    /// The address actually bound, once `start` has run. Useful when
    /// `bind_addr` used port `0` and the OS picked one.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr.get()
    }

    #[tracing::instrument(skip(self, reactor))]
    fn initialize(&self, reactor: &mut Reactor) -> Result<(Dialog<MioTcpListener>, SocketAddr), SetupError> {
        let domain = if self.bind_addr.is_ipv6() {
            Domain::IPV6
        } else {
            Domain::IPV4
        };
        let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP)).map_err(SetupError::Socket)?;
        socket.set_reuse_address(true).map_err(SetupError::SetSockOpt)?;
        self.handler.initialize(&socket).map_err(SetupError::HandlerInitialize)?;
        socket.bind(&self.bind_addr.into()).map_err(SetupError::Bind)?;
        let local_addr = socket
            .local_addr()
            .map_err(SetupError::GetSockName)?
            .as_socket()
            .expect("a bound AF_INET/AF_INET6 socket always has a SocketAddr representation");
        socket
            .listen(libc::SOMAXCONN)
            .map_err(SetupError::Listen)?;
        socket.set_nonblocking(true).map_err(SetupError::SetSockOpt)?;

        let std_listener: std::net::TcpListener = socket.into();
        let mio_listener = MioTcpListener::from_std(std_listener);
        let dialog = reactor
            .emplace(mio_listener, Interest::READABLE)
            .map_err(SetupError::Register)?;
        Ok((dialog, local_addr))
    }

    pub fn signal_handler(&self, reactor: &mut Reactor, ctx: &AsyncContext, signal: Signal) {
        match signal {
            Signal::Terminate => {
                let stop_ref = self.stop.borrow();
                match stop_ref.as_ref() {
                    Some(f) => f(reactor, ctx),
                    // `start()` never got far enough to install the stop
                    // closure (setup failed before bind completed); a plain
                    // stop request is all that's left to do.
                    None => ctx.request_stop(),
                }
            }
            other => self.handler.on_signal(other),
        }
    }

    pub fn start(&self, reactor: &mut Reactor, ctx: &AsyncContext) {
        match self.initialize(reactor) {
            Ok((dialog, local_addr)) => {
                self.local_addr.set(Some(local_addr));
                *self.stop.borrow_mut() = Some(make_stop_closure(local_addr));
                let listener_rc = Rc::new(RefCell::new(dialog));
                acceptor(reactor, ctx, listener_rc, Rc::clone(&self.handler));
            }
            Err(e) => {
                tracing::error!(error = %e, "tcp service setup failed");
                ctx.request_stop();
            }
        }
    }
}

impl<H: StreamHandler> Service for TcpService<H> {
    type Args = (SocketAddr, H);

    fn construct((bind_addr, handler): Self::Args) -> Self {
        TcpService::new(bind_addr, handler)
    }

    fn signal_handler(&self, reactor: &mut Reactor, ctx: &AsyncContext, signal: Signal) {
        TcpService::signal_handler(self, reactor, ctx, signal);
    }

    fn start(&self, reactor: &mut Reactor, ctx: &AsyncContext) {
        TcpService::start(self, reactor, ctx);
    }
}

impl<H: StreamHandler> std::fmt::Debug for TcpService<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpService")
            .field("bind_addr", &self.bind_addr)
            .field("local_addr", &self.local_addr.get())
            .finish()
    }
}

/// `spec.md` §4.F: unblock a possibly-parked accept continuation by
/// connecting a throwaway socket to the service's own bound address. The
/// acceptor observes the resulting connection, notices `stop_requested()`,
/// and declines to spawn a reader or re-arm itself.
fn make_stop_closure(local_addr: SocketAddr) -> StopClosure {
    Box::new(move |reactor, ctx| {
        ctx.request_stop();
        match mio::net::TcpStream::connect(local_addr) {
            Ok(stream) => match reactor.emplace(stream, Interest::WRITABLE) {
                Ok(dialog) => {
                    let dialog_rc = Rc::new(RefCell::new(dialog));
                    let token = dialog_rc.borrow().token;
                    reactor.spawn(
                        token,
                        Box::new(move |_reactor, _token| {
                            // Nothing to do: its only purpose was to wake the
                            // acceptor. Dropping it here closes the socket.
                            drop(Rc::clone(&dialog_rc));
                        }),
                        false,
                    );
                }
                Err(e) => tracing::debug!(error = %e, "failed to register stop self-connect"),
            },
            Err(e) => tracing::debug!(error = %e, "stop self-connect failed (non-fatal)"),
        }
    })
}

fn acceptor<H: StreamHandler>(
    reactor: &mut Reactor,
    ctx: &AsyncContext,
    listener: Rc<RefCell<Dialog<MioTcpListener>>>,
    handler: Rc<H>,
) {
    if ctx.stop_requested() {
        return;
    }
    let token = listener.borrow().token;
    let ctx = ctx.clone();
    reactor.spawn(
        token,
        Box::new(move |reactor, _token| {
            try_accept(reactor, &ctx, Rc::clone(&listener), Rc::clone(&handler));
        }),
        false,
    );
}

fn try_accept<H: StreamHandler>(
    reactor: &mut Reactor,
    ctx: &AsyncContext,
    listener: Rc<RefCell<Dialog<MioTcpListener>>>,
    handler: Rc<H>,
) {
    if ctx.stop_requested() {
        return;
    }

    let accepted = listener.borrow_mut().source.accept();
    match accepted {
        Ok((stream, peer_addr)) => {
            match reactor.emplace(stream, Interest::READABLE) {
                Ok(dialog) => {
                    let conn = Rc::new(Connection::new(dialog, peer_addr, Rc::clone(&handler)));
                    reader(reactor, ctx, conn);
                }
                Err(e) => tracing::debug!(error = %e, "failed to register accepted connection"),
            }
            // Keep draining the accept backlog via the trampoline rather
            // than waiting for a fresh edge-triggered readiness event.
            let token = listener.borrow().token;
            let ctx = ctx.clone();
            reactor.spawn(
                token,
                Box::new(move |reactor, _token| {
                    try_accept(reactor, &ctx, Rc::clone(&listener), Rc::clone(&handler));
                }),
                true,
            );
        }
        Err(e) if e.kind() == ErrorKind::WouldBlock => {
            let token = listener.borrow().token;
            let ctx = ctx.clone();
            reactor.spawn(
                token,
                Box::new(move |reactor, _token| {
                    try_accept(reactor, &ctx, Rc::clone(&listener), Rc::clone(&handler));
                }),
                false,
            );
        }
        Err(e) => {
            // Per spec: errors other than WouldBlock permanently stop this
            // listener's acceptor. Only a stop request is the intended exit
            // path, but this observed behavior is preserved as specified.
            tracing::debug!(error = %e, "accept failed; this listener will not re-arm");
        }
    }
}

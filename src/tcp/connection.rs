// Copyright (c) 2026 netsvc-core contributors. Licensed under Apache License, Version 2.0.

//! The read continuation: `spec.md`'s `reader(ctx, dialog, rctx)`, spawned
//! once per successful accept and re-spawned by the handler after each read
//! it wants to follow with another.

use std::cell::RefCell;
use std::io::{ErrorKind, Read};
use std::net::SocketAddr;
use std::rc::Rc;

use mio::net::TcpStream;

use crate::context::AsyncContext;
use crate::reactor::{Dialog, Reactor};

use super::listener::StreamHandler;

/// Per-connection state shared between the reader continuation and the
/// handler it calls into. `Rc<RefCell<..>>`-based: every continuation here
/// runs on the single worker thread, cooperatively, never preempted.
pub struct Connection<H: StreamHandler> {
    pub(crate) dialog: RefCell<Dialog<TcpStream>>,
    buf: RefCell<[u8; 1024]>,
    pub peer_addr: SocketAddr,
    pub(crate) handler: Rc<H>,
}

impl<H: StreamHandler> Connection<H> {
    pub(crate) fn new(dialog: Dialog<TcpStream>, peer_addr: SocketAddr, handler: Rc<H>) -> Self {
        Self {
            dialog: RefCell::new(dialog),
            buf: RefCell::new([0u8; 1024]),
            peer_addr,
            handler,
        }
    }
}

impl<H: StreamHandler> std::fmt::Debug for Connection<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("peer_addr", &self.peer_addr)
            .finish()
    }
}

/// Arm the reader continuation for `conn`. A no-op once a stop has been
/// requested, so a handler that keeps calling `reader` after
/// `request_stop()` does not keep the acceptor's connections alive past
/// teardown.
pub fn reader<H: StreamHandler>(reactor: &mut Reactor, ctx: &AsyncContext, conn: Rc<Connection<H>>) {
    if ctx.stop_requested() {
        return;
    }
    let token = conn.dialog.borrow().token;
    let ctx = ctx.clone();
    reactor.spawn(
        token,
        Box::new(move |reactor, _token| {
            try_read(reactor, &ctx, Rc::clone(&conn));
        }),
        true,
    );
}

fn try_read<H: StreamHandler>(reactor: &mut Reactor, ctx: &AsyncContext, conn: Rc<Connection<H>>) {
    if ctx.stop_requested() {
        return;
    }

    let read_result = {
        let mut dialog = conn.dialog.borrow_mut();
        let mut buf = conn.buf.borrow_mut();
        dialog.source.read(&mut buf[..])
    };

    let n = match read_result {
        Ok(n) => n,
        Err(e) if e.kind() == ErrorKind::WouldBlock => {
            let token = conn.dialog.borrow().token;
            let ctx = ctx.clone();
            reactor.spawn(
                token,
                Box::new(move |reactor, _token| {
                    try_read(reactor, &ctx, Rc::clone(&conn));
                }),
                false,
            );
            return;
        }
        Err(e) => {
            tracing::debug!(error = %e, peer = %conn.peer_addr, "read failed; dropping connection");
            return;
        }
    };

    if n == 0 {
        tracing::debug!(peer = %conn.peer_addr, "peer closed connection");
        return;
    }

    let bytes = conn.buf.borrow()[..n].to_vec();
    let handler = Rc::clone(&conn.handler);
    handler.on_read(reactor, ctx, &conn, &bytes);
    // The handler is responsible for calling `reader(..)` again if it wants
    // more bytes; we do not re-arm automatically.
}

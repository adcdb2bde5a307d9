// Copyright (c) 2026 netsvc-core contributors. Licensed under Apache License, Version 2.0.

//! The interrupt service routine: the continuation parked on the read end
//! of the wake socketpair, woken whenever `AsyncContext::signal` fires the
//! interrupt cell.
//!
//! Per `spec.md` §4.D: drain the wake bytes (there may be more than one
//! coalesced wake queued), snapshot-and-clear the pending signal bitmask,
//! dispatch each set bit low-to-high to the service, and re-arm unless the
//! snapshot had the terminate bit set.

use std::io::{ErrorKind, Read};
use std::rc::Rc;

use mio::net::UnixStream;

use crate::context::AsyncContext;
use crate::reactor::{Dialog, Reactor};
use crate::service::Service;
use crate::signal::Signal;

pub fn isr_spawn<S: Service>(
    reactor: &mut Reactor,
    ctx: &AsyncContext,
    dialog: Rc<std::cell::RefCell<Dialog<UnixStream>>>,
    service: Rc<S>,
) {
    let token = dialog.borrow().token;
    let ctx = ctx.clone();
    reactor.spawn(
        token,
        Box::new(move |reactor, _token| {
            isr_fire(reactor, &ctx, Rc::clone(&dialog), Rc::clone(&service));
        }),
        false,
    );
}

fn isr_fire<S: Service>(
    reactor: &mut Reactor,
    ctx: &AsyncContext,
    dialog: Rc<std::cell::RefCell<Dialog<UnixStream>>>,
    service: Rc<S>,
) {
    // Edge-triggered: drain every queued wake byte before parking again, or
    // a wake that arrives while we are between reads would never re-fire.
    let mut scratch = [0u8; 64];
    loop {
        let mut guard = dialog.borrow_mut();
        match guard.source.read(&mut scratch) {
            Ok(0) => break,
            Ok(_) => continue,
            Err(e) if e.kind() == ErrorKind::WouldBlock => break,
            Err(_) => break,
        }
    }

    let pending = ctx.take_pending_signals();
    let mut saw_terminate = false;
    for n in 0..Signal::END {
        if pending & (1 << n) == 0 {
            continue;
        }
        let signal = Signal::from_index(n).expect("bit index within [0, Signal::END)");
        if signal == Signal::Terminate {
            saw_terminate = true;
        }
        tracing::debug!(signal = n, "dispatching signal");
        service.signal_handler(reactor, ctx, signal);
    }

    if saw_terminate {
        ctx.request_stop();
    } else {
        isr_spawn(reactor, ctx, dialog, service);
    }
}

// Copyright (c) 2026 netsvc-core contributors. Licensed under Apache License, Version 2.0.

//! A minimal echo handler: the one concrete "segment" example `spec.md` §1
//! calls out by name but leaves unspecified. `original_source/` for this
//! spec kept no files for the project the name comes from, so this stays
//! deliberately small — it demonstrates the `StreamHandler` contract
//! (append to a per-connection log, echo back unmodified) rather than
//! implementing any particular bus wire protocol.

use std::cell::RefCell;
use std::io::Write;
use std::rc::Rc;

use crate::context::AsyncContext;
use crate::reactor::Reactor;
use crate::tcp::{Connection, StreamHandler};

#[derive(Default)]
pub struct SegmentHandler {
    log: RefCell<Vec<u8>>,
}

impl SegmentHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes seen across every connection this handler has served, in the
    /// order they arrived. Exposed for tests and diagnostics.
    pub fn log_snapshot(&self) -> Vec<u8> {
        self.log.borrow().clone()
    }
}

impl StreamHandler for SegmentHandler {
    fn on_read(
        self: &Rc<Self>,
        reactor: &mut Reactor,
        ctx: &AsyncContext,
        conn: &Rc<Connection<Self>>,
        bytes: &[u8],
    ) {
        self.log.borrow_mut().extend_from_slice(bytes);

        let write_result = conn.dialog.borrow_mut().source.write_all(bytes);
        if let Err(e) = write_result {
            tracing::debug!(error = %e, peer = %conn.peer_addr, "echo write failed; dropping connection");
            return;
        }

        crate::tcp::reader(reactor, ctx, Rc::clone(conn));
    }
}

// Copyright (c) 2026 netsvc-core contributors. Licensed under Apache License, Version 2.0.

//! The poll-based multiplexer and its token-keyed completion table.
//!
//! This is the Rust realization of `spec.md` §9's sanctioned alternative to
//! a generic sender/receiver combinator library: "a poll-loop dispatching
//! typed completion events". `then`/`upon_error` become ordinary `match`
//! arms inside a stored closure; `scope.spawn` becomes `Reactor::spawn`
//! inserting that closure into `callbacks`, keyed by the `mio::Token` of
//! the source it waits on.
//!
//! Continuations never call back into `step`/`poll` themselves — recursing
//! into the multiplexer from inside a completion is exactly what
//! `spec.md` §5 forbids. A continuation that wants to retry immediately
//! (more bytes may already be buffered, another connection may already be
//! queued in the accept backlog) calls `Reactor::spawn(.., poke_now: true)`,
//! which defers the retry onto `ready_queue` instead of recursing. `step`
//! drains `ready_queue` to a fixed point before it ever calls `Poll::poll`,
//! so a chatty connection grows a queue, not a call stack.

use std::collections::{HashMap, VecDeque};
use std::io;

use mio::event::Source;
use mio::{Events, Interest, Poll, Registry, Token};

pub type Callback = Box<dyn FnMut(&mut Reactor, Token)>;

pub struct Reactor {
    poll: Poll,
    events: Events,
    next_token: usize,
    callbacks: HashMap<Token, Callback>,
    ready_queue: VecDeque<Token>,
}

impl Reactor {
    pub fn new() -> io::Result<Self> {
        Ok(Self {
            poll: Poll::new()?,
            events: Events::with_capacity(128),
            next_token: 0,
            callbacks: HashMap::new(),
            ready_queue: VecDeque::new(),
        })
    }

    fn next_token(&mut self) -> Token {
        let token = Token(self.next_token);
        self.next_token += 1;
        token
    }

    /// Register a source with the multiplexer and hand back a `Dialog`
    /// that deregisters itself on drop.
    pub fn emplace<S: Source>(&mut self, mut source: S, interest: Interest) -> io::Result<Dialog<S>> {
        let token = self.next_token();
        let registry = self.poll.registry().try_clone()?;
        registry.register(&mut source, token, interest)?;
        Ok(Dialog {
            token,
            registry,
            source,
        })
    }

    /// Install (or replace) the completion callback for `token`. If
    /// `poke_now` is set, the callback also runs on the next `step` without
    /// waiting for a real readiness event — used to drain an accept backlog
    /// or a socket buffer that may already hold more than one read's worth
    /// of data, without recursing through user code.
    pub fn spawn(&mut self, token: Token, callback: Callback, poke_now: bool) {
        self.callbacks.insert(token, callback);
        if poke_now {
            self.ready_queue.push_back(token);
        }
    }

    pub fn cancel(&mut self, token: Token) {
        self.callbacks.remove(&token);
    }

    /// One iteration of the event loop: drain the ready queue, then block
    /// in `Poll::poll` if (and only if) there is still a registered
    /// callback to wait for. Returns whether there is more work pending —
    /// the caller loops `while reactor.step()? {}`.
    pub fn step(&mut self) -> io::Result<bool> {
        while let Some(token) = self.ready_queue.pop_front() {
            if let Some(mut callback) = self.callbacks.remove(&token) {
                callback(self, token);
            }
        }

        if self.callbacks.is_empty() && self.ready_queue.is_empty() {
            return Ok(false);
        }

        self.poll.poll(&mut self.events, None)?;
        let tokens: Vec<Token> = self.events.iter().map(|event| event.token()).collect();
        for token in tokens {
            if let Some(mut callback) = self.callbacks.remove(&token) {
                callback(self, token);
            }
        }

        Ok(!self.callbacks.is_empty() || !self.ready_queue.is_empty())
    }
}

impl std::fmt::Debug for Reactor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reactor")
            .field("pending_callbacks", &self.callbacks.len())
            .field("ready_queue_len", &self.ready_queue.len())
            .finish()
    }
}

/// A source registered with a `Reactor`, deregistering itself on drop. The
/// registry handle is an independent clone of the reactor's, so a `Dialog`
/// does not borrow the `Reactor` it came from.
pub struct Dialog<S: Source> {
    pub token: Token,
    registry: Registry,
    pub source: S,
}

impl<S: Source> Drop for Dialog<S> {
    fn drop(&mut self) {
        let _ = self.registry.deregister(&mut self.source);
    }
}

impl<S: Source + std::fmt::Debug> std::fmt::Debug for Dialog<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dialog")
            .field("token", &self.token)
            .field("source", &self.source)
            .finish()
    }
}

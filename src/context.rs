// Copyright (c) 2026 netsvc-core contributors. Licensed under Apache License, Version 2.0.

//! Async context: the handle shared between the owning thread (parent) and
//! the worker thread, plus whatever other threads call `signal(n)`.
//!
//! Fields mirror the abstract data model directly: a stop flag reachable
//! from any thread (`scope`), a pending-signal bitmask, a `stopped` latch
//! set once by the worker at teardown, and the interrupt cell used to wake
//! a blocked worker. `Arc`-shared rather than reference-shared, since unlike
//! the originating design the owning thread and the worker genuinely run on
//! independent stacks here.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crate::interrupt::InterruptCell;
use crate::signal::Signal;

struct ContextInner {
    stopped: AtomicBool,
    stop_requested: AtomicBool,
    sigmask: AtomicU64,
    interrupt: InterruptCell,
}

/// Cheap to clone; every clone refers to the same underlying state.
#[derive(Clone)]
pub struct AsyncContext {
    inner: Arc<ContextInner>,
}

impl AsyncContext {
    pub(crate) fn new() -> Self {
        Self {
            inner: Arc::new(ContextInner {
                stopped: AtomicBool::new(false),
                stop_requested: AtomicBool::new(false),
                sigmask: AtomicU64::new(0),
                interrupt: InterruptCell::new(),
            }),
        }
    }

    /// Raise signal `n`. A no-op if no worker has installed an interrupt yet
    /// (or has already torn one down) — the caller cannot distinguish "not
    /// yet listening" from "already gone", by design.
    ///
    /// Panics if `n` is outside `[0, Signal::END)`.
    pub fn signal(&self, n: u8) {
        assert!(
            n < Signal::END,
            "signal index {n} out of range [0, {})",
            Signal::END
        );
        if self.inner.interrupt.present() {
            self.inner.sigmask.fetch_or(1 << n, Ordering::AcqRel);
            self.inner.interrupt.invoke();
        }
    }

    /// True once the worker has fully drained its event loop and torn down.
    pub fn stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::Acquire)
    }

    /// A cheap, `Send + Sync` handle continuations can poll to see whether
    /// they should stop scheduling further work.
    pub fn stop_token(&self) -> StopToken {
        StopToken {
            inner: Arc::clone(&self.inner),
        }
    }

    pub fn stop_requested(&self) -> bool {
        self.inner.stop_requested.load(Ordering::Acquire)
    }

    /// Request that the worker's event loop wind down. Idempotent.
    pub fn request_stop(&self) {
        self.inner.stop_requested.store(true, Ordering::Release);
    }

    pub(crate) fn take_pending_signals(&self) -> u64 {
        self.inner.sigmask.swap(0, Ordering::AcqRel)
    }

    pub(crate) fn install_interrupt(&self, f: impl Fn() + Send + Sync + 'static) {
        self.inner.interrupt.assign(f);
    }

    pub(crate) fn clear_interrupt(&self) {
        self.inner.interrupt.clear();
    }

    pub(crate) fn mark_stopped(&self) {
        self.inner.stopped.store(true, Ordering::Release);
    }
}

impl std::fmt::Debug for AsyncContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncContext")
            .field("stopped", &self.stopped())
            .field("stop_requested", &self.stop_requested())
            .finish()
    }
}

/// The "scope" portion of an async context, handed to continuations that
/// only need to check for cancellation, not raise signals.
#[derive(Clone)]
pub struct StopToken {
    inner: Arc<ContextInner>,
}

impl StopToken {
    pub fn stop_requested(&self) -> bool {
        self.inner.stop_requested.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for StopToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StopToken")
            .field("stop_requested", &self.stop_requested())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_before_interrupt_installed_is_a_no_op() {
        let ctx = AsyncContext::new();
        ctx.signal(Signal::Terminate.index());
        assert_eq!(ctx.take_pending_signals(), 0);
    }

    #[test]
    fn signal_after_install_sets_the_bit_and_wakes() {
        let ctx = AsyncContext::new();
        let woke = Arc::new(AtomicBool::new(false));
        let woke2 = Arc::clone(&woke);
        ctx.install_interrupt(move || woke2.store(true, Ordering::SeqCst));
        ctx.signal(Signal::User1.index());
        assert!(woke.load(Ordering::SeqCst));
        assert_eq!(ctx.take_pending_signals(), 1 << Signal::User1.index());
    }

    #[test]
    fn take_pending_signals_resets_the_mask() {
        let ctx = AsyncContext::new();
        ctx.install_interrupt(|| {});
        ctx.signal(Signal::Terminate.index());
        assert_ne!(ctx.take_pending_signals(), 0);
        assert_eq!(ctx.take_pending_signals(), 0);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn signal_out_of_range_panics() {
        let ctx = AsyncContext::new();
        ctx.signal(Signal::END);
    }

    #[test]
    fn stop_token_reflects_request_stop() {
        let ctx = AsyncContext::new();
        let token = ctx.stop_token();
        assert!(!token.stop_requested());
        ctx.request_stop();
        assert!(token.stop_requested());
    }
}

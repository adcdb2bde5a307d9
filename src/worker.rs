// Copyright (c) 2026 netsvc-core contributors. Licensed under Apache License, Version 2.0.

//! The async worker thread: owns the reactor, the socketpair-based wake
//! channel, and the user service, for the lifetime of one dedicated OS
//! thread.
//!
//! Lifecycle grounded on the teacher's resilient-reactor-thread pattern
//! (`resilient_reactor_thread/thread_safe_global_state_manager.rs`): spawn
//! a thread, hand the caller a parent-side readiness handshake
//! (`Mutex`+`Condvar`, not unlike the teacher's `allocate()` fast/slow path
//! over a shared state cell), have the thread signal back once its
//! interrupt is installed so the caller never races `signal()` against an
//! uninstalled interrupt cell, and join on drop.

use std::io::Write;
use std::os::unix::net::UnixStream as StdUnixStream;
use std::rc::Rc;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

use mio::{net::UnixStream as MioUnixStream, Interest};

use crate::context::AsyncContext;
use crate::error::StartError;
use crate::isr::isr_spawn;
use crate::reactor::Reactor;
use crate::service::Service;
use crate::signal::Signal;

/// Parent-visible handshake state, mutated only by the worker thread.
#[derive(Debug, Default)]
pub struct Readiness {
    /// The worker has installed its interrupt cell and primed its ISR;
    /// `signal()` is now safe to call.
    pub interrupt_installed: bool,
    /// The worker has fully drained its event loop and torn down.
    pub stopped: bool,
    /// Set instead of `interrupt_installed` when the worker gives up before
    /// it ever gets that far (reactor/socketpair setup failure). `start()`
    /// surfaces this as its `Result::Err`.
    pub setup_error: Option<StartError>,
}

pub type ReadinessHandshake = Arc<(Mutex<Readiness>, Condvar)>;

pub fn new_readiness_handshake() -> ReadinessHandshake {
    Arc::new((Mutex::new(Readiness::default()), Condvar::new()))
}

/// Owns the worker thread for a `Service`. Dropping it signals
/// `Signal::Terminate` and joins.
pub struct AsyncWorker {
    ctx: AsyncContext,
    handle: Option<JoinHandle<()>>,
}

impl AsyncWorker {
    /// Spawn the worker thread and block (via `ready`'s condvar) until the
    /// worker has either installed its interrupt cell or given up during
    /// setup. Callers that want a non-blocking start can pass their own
    /// handshake and poll it instead of calling this constructor directly.
    ///
    /// Returns `Err` if the thread itself could not be spawned, or if the
    /// worker gave up before installing its interrupt cell (reactor or
    /// wake-socketpair allocation failure) — in the latter case the thread
    /// has already run to completion and `AsyncContext::stopped()` is
    /// already `true` by the time this returns.
    #[tracing::instrument(skip(args))]
    pub fn start<S>(args: S::Args) -> Result<Self, StartError>
    where
        S: Service,
        S::Args: Send + 'static,
    {
        let ctx = AsyncContext::new();
        let ctx_thread = ctx.clone();
        let ready = new_readiness_handshake();
        let ready_thread = Arc::clone(&ready);

        let handle = thread::Builder::new()
            .name("netsvc-worker".into())
            .spawn(move || run::<S>(ctx_thread, ready_thread, args))
            .map_err(StartError::Spawn)?;

        let (lock, cvar) = &*ready;
        let guard = lock.lock().map_err(|_| StartError::Poisoned)?;
        let mut guard = cvar
            .wait_while(guard, |r| !r.interrupt_installed && !r.stopped)
            .map_err(|_| StartError::Poisoned)?;

        if let Some(err) = guard.setup_error.take() {
            return Err(err);
        }
        drop(guard);

        Ok(Self {
            ctx,
            handle: Some(handle),
        })
    }

    pub fn signal(&self, signal: Signal) {
        self.ctx.signal(signal.index());
    }

    pub fn context(&self) -> &AsyncContext {
        &self.ctx
    }
}

impl Drop for AsyncWorker {
    fn drop(&mut self) {
        self.ctx.signal(Signal::Terminate.index());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl std::fmt::Debug for AsyncWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncWorker").field("ctx", &self.ctx).finish()
    }
}

#[tracing::instrument(skip(ctx, ready, args))]
fn run<S>(ctx: AsyncContext, ready: ReadinessHandshake, args: S::Args)
where
    S: Service,
{
    let mut reactor = match Reactor::new() {
        Ok(reactor) => reactor,
        Err(e) => {
            tracing::error!(error = %e, "failed to create reactor; worker exiting without starting");
            ctx.mark_stopped();
            notify_stopped_with_error(&ready, StartError::Reactor(e));
            return;
        }
    };

    // Step 1: construct the user service before anything that can fail, so
    // its destructor (if any) still runs normally on the unwind-free path
    // below.
    let service = Rc::new(S::construct(args));

    // Step 2: allocate the wake socketpair. Failure here skips straight to
    // teardown — the interrupt is never installed (S6).
    let (read_end, write_end) = match StdUnixStream::pair() {
        Ok(pair) => pair,
        Err(e) => {
            tracing::error!(error = %e, "failed to allocate wake socketpair; worker exiting without starting");
            ctx.mark_stopped();
            notify_stopped_with_error(&ready, StartError::SocketPair(e));
            return;
        }
    };

    if let Err(e) = read_end.set_nonblocking(true).and_then(|()| write_end.set_nonblocking(true)) {
        tracing::error!(error = %e, "failed to set wake socketpair nonblocking; worker exiting without starting");
        ctx.mark_stopped();
        notify_stopped(&ready);
        return;
    }

    let mio_read_end = MioUnixStream::from_std(read_end);
    let read_dialog = match reactor.emplace(mio_read_end, Interest::READABLE) {
        Ok(dialog) => dialog,
        Err(e) => {
            tracing::error!(error = %e, "failed to register wake socketpair; worker exiting without starting");
            ctx.mark_stopped();
            notify_stopped(&ready);
            return;
        }
    };
    let read_dialog_rc = Rc::new(std::cell::RefCell::new(read_dialog));

    // Step 3: install the interrupt. Any thread holding `ctx.clone()` may
    // now call `signal()` safely.
    let write_end = Arc::new(write_end);
    {
        let write_end = Arc::clone(&write_end);
        ctx.install_interrupt(move || {
            let _ = (&*write_end).write(&[1u8]);
        });
    }

    // Step 4: prime the ISR before telling the parent we're ready, so a
    // signal raised the instant the parent wakes up is guaranteed to have
    // somewhere to land.
    isr_spawn(&mut reactor, &ctx, Rc::clone(&read_dialog_rc), Rc::clone(&service));

    // Step 5: notify the parent.
    notify_interrupt_installed(&ready);

    // Step 6: start the user service.
    service.start(&mut reactor, &ctx);

    // Step 7: drive the event loop until nothing is left to wait for
    // (either the service tore everything down via the stop choreography,
    // or ran dry on its own).
    loop {
        match reactor.step() {
            Ok(true) => continue,
            Ok(false) => break,
            Err(e) => {
                tracing::error!(error = %e, "reactor step failed; tearing down");
                break;
            }
        }
    }

    ctx.clear_interrupt();
    drop(write_end);
    ctx.mark_stopped();
    notify_stopped(&ready);
}

fn notify_interrupt_installed(ready: &ReadinessHandshake) {
    let (lock, cvar) = &**ready;
    let mut guard = lock.lock().expect("readiness mutex poisoned");
    guard.interrupt_installed = true;
    cvar.notify_all();
}

fn notify_stopped(ready: &ReadinessHandshake) {
    let (lock, cvar) = &**ready;
    let mut guard = lock.lock().expect("readiness mutex poisoned");
    guard.stopped = true;
    cvar.notify_all();
}

/// Like `notify_stopped`, but also records the setup failure that caused
/// the worker to give up, so `AsyncWorker::start()` can surface it as its
/// `Result::Err` instead of silently returning a worker that never got
/// anywhere.
fn notify_stopped_with_error(ready: &ReadinessHandshake, err: StartError) {
    let (lock, cvar) = &**ready;
    let mut guard = lock.lock().expect("readiness mutex poisoned");
    guard.stopped = true;
    guard.setup_error = Some(err);
    cvar.notify_all();
}

// Copyright (c) 2026 netsvc-core contributors. Licensed under Apache License, Version 2.0.

//! Interrupt cell: a slot for the one callback that wakes a blocked worker
//! thread, installed once at worker start and cleared once at teardown.
//!
//! Grounded on the teacher's `WakerSlotReader`/`WakerSlotWriter` pair over
//! `SharedWakerSlot<K> = Arc<Mutex<Option<K>>>`
//! (`resilient_reactor_thread/rrt_waker_slot.rs`): snapshot the callback
//! under the lock, release the lock, then invoke the snapshot. Invoking
//! while holding the lock would deadlock a caller that reaches back into
//! the same cell (e.g. `assign`/`clear` racing `invoke` from another
//! thread).

use std::sync::{Arc, Mutex};

type Callback = Arc<dyn Fn() + Send + Sync + 'static>;

/// Holds at most one callback at a time. Calling `invoke` while empty is a
/// programmer error (callers check `present` first, exactly as the ISR does
/// before deciding whether `signal(n)` has anywhere to deliver to).
#[derive(Default)]
pub struct InterruptCell {
    inner: Mutex<Option<Callback>>,
}

impl InterruptCell {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(None),
        }
    }

    pub fn assign(&self, f: impl Fn() + Send + Sync + 'static) {
        let mut guard = self.inner.lock().expect("interrupt cell poisoned");
        *guard = Some(Arc::new(f));
    }

    pub fn clear(&self) {
        let mut guard = self.inner.lock().expect("interrupt cell poisoned");
        *guard = None;
    }

    pub fn present(&self) -> bool {
        self.inner
            .lock()
            .expect("interrupt cell poisoned")
            .is_some()
    }

    /// Snapshot-then-release-then-invoke. Panics if the cell is empty;
    /// callers must gate on `present()` first.
    pub fn invoke(&self) {
        let snapshot = {
            let guard = self.inner.lock().expect("interrupt cell poisoned");
            guard.clone()
        };
        match snapshot {
            Some(f) => f(),
            None => panic!("invoke() called on an empty interrupt cell"),
        }
    }
}

impl std::fmt::Debug for InterruptCell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterruptCell")
            .field("present", &self.present())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn starts_empty() {
        let cell = InterruptCell::new();
        assert!(!cell.present());
    }

    #[test]
    fn invokes_assigned_callback() {
        let cell = InterruptCell::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count2 = Arc::clone(&count);
        cell.assign(move || {
            count2.fetch_add(1, Ordering::SeqCst);
        });
        assert!(cell.present());
        cell.invoke();
        cell.invoke();
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn clear_empties_the_cell() {
        let cell = InterruptCell::new();
        cell.assign(|| {});
        cell.clear();
        assert!(!cell.present());
    }

    #[test]
    #[should_panic(expected = "empty interrupt cell")]
    fn invoke_on_empty_cell_panics() {
        let cell = InterruptCell::new();
        cell.invoke();
    }
}

//! Bookkeeping for graceful shutdown.
//!
//! Counts in-flight frame operations and records whether a peer close
//! frame has been observed, so `close` can drain before tearing the
//! stream down.

use std::sync::{Condvar, Mutex};
use std::time::Duration;

#[derive(Debug, Default)]
struct GateState {
    pending: usize,
    close_seen: bool,
}

#[derive(Debug)]
pub(super) struct Gate {
    state: Mutex<GateState>,
    cond: Condvar,
}

impl Gate {
    pub const fn new() -> Self {
        Gate {
            state: Mutex::new(GateState {
                pending: 0,
                close_seen: false,
            }),
            cond: Condvar::new(),
        }
    }

    /// Track one frame operation for its lifetime.
    pub fn op(&self) -> OpGuard<'_> {
        let mut state = self.lock();
        state.pending += 1;
        OpGuard { gate: self }
    }

    /// Record that a peer close frame arrived.
    pub fn mark_close_seen(&self) {
        self.lock().close_seen = true;
        self.cond.notify_all();
    }

    pub fn close_seen(&self) -> bool { self.lock().close_seen }

    /// Wait until a peer close frame is flagged, up to `timeout`.
    pub fn wait_close_seen(&self, timeout: Duration) -> bool {
        let state = self.lock();
        let (state, _) = self
            .cond
            .wait_timeout_while(state, timeout, |s| !s.close_seen)
            .unwrap_or_else(|e| e.into_inner());
        state.close_seen
    }

    /// Wait until no frame operation is in flight, up to `timeout`.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let state = self.lock();
        let (state, _) = self
            .cond
            .wait_timeout_while(state, timeout, |s| s.pending > 0)
            .unwrap_or_else(|e| e.into_inner());
        state.pending == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

pub(super) struct OpGuard<'a> {
    gate: &'a Gate,
}

impl Drop for OpGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.gate.lock();
        state.pending -= 1;
        if state.pending == 0 {
            self.gate.cond.notify_all();
        }
    }
}

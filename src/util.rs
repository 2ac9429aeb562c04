use std::sync::{Condvar, Mutex};

use crate::Error;

/// A binary lock handed out without a lifetime-bound guard.
///
/// The write and read sides of a connection are serialized with these. A
/// response stream keeps the read side locked until the body is drained,
/// which is longer than any scoped `MutexGuard` could live. Waiters can be
/// woken en masse by [`Gate::close`], in which case they observe
/// [`Error::Aborted`].
pub(crate) struct Gate {
    state: Mutex<GateState>,
    cond: Condvar,
}

struct GateState {
    locked: bool,
    closed: bool,
}

impl Gate {
    pub fn new() -> Self {
        Gate {
            state: Mutex::new(GateState {
                locked: false,
                closed: false,
            }),
            cond: Condvar::new(),
        }
    }

    /// Block until the gate is ours. Errors with `Aborted` if the gate is
    /// closed while waiting.
    pub fn lock(&self) -> Result<(), Error> {
        let mut state = self.state.lock().unwrap();
        loop {
            if state.closed {
                return Err(Error::Aborted);
            }
            if !state.locked {
                state.locked = true;
                return Ok(());
            }
            state = self.cond.wait(state).unwrap();
        }
    }

    pub fn unlock(&self) {
        let mut state = self.state.lock().unwrap();
        state.locked = false;
        drop(state);
        self.cond.notify_one();
    }

    /// Wake all waiters with `Aborted`. The current holder (if any) may
    /// still unlock, but no new lock succeeds.
    #[allow(dead_code)]
    pub fn close(&self) {
        let mut state = self.state.lock().unwrap();
        state.closed = true;
        drop(state);
        self.cond.notify_all();
    }
}

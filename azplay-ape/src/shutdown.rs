//! Process-wide shutdown signal
//!
//! Triggered by Ctrl+C/SIGTERM or by a device shutdown observed in a playout
//! session. The scheduler's pacing sleeps wait on it, so a trigger wakes the
//! control thread immediately.

use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::info;

#[derive(Debug, Default)]
pub struct ShutdownSignal {
    reason: Mutex<Option<String>>,
    cvar: Condvar,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, Option<String>> {
        self.reason.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Request shutdown. The first reason wins.
    pub fn trigger(&self, reason: impl Into<String>) {
        let mut state = self.state();
        if state.is_none() {
            let reason = reason.into();
            info!("Shutdown requested: {}", reason);
            *state = Some(reason);
            self.cvar.notify_all();
        }
    }

    pub fn is_triggered(&self) -> bool {
        self.state().is_some()
    }

    pub fn reason(&self) -> Option<String> {
        self.state().clone()
    }

    /// Sleep for `timeout` unless shutdown is triggered first.
    ///
    /// Returns `true` if shutdown was triggered.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state();
        while state.is_none() {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            state = match self.cvar.wait_timeout(state, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
        true
    }

    /// Block until shutdown is triggered
    pub fn wait(&self) {
        let mut state = self.state();
        while state.is_none() {
            state = match self.cvar.wait(state) {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
        }
    }
}

//! Per-job execution guard
//!
//! One binary token per job. `try_acquire` never waits: a tick that finds
//! the token taken is skipped. The token is returned when the
//! [`GuardPermit`] is dropped, or forcibly via [`ExecutionGuard::force_release`]
//! when shutdown abandons a run. Permits carry the run id that took them so a
//! permit from an abandoned run can never release a later holder.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use super::types::RunId;

#[derive(Debug, Default)]
struct GuardInner {
    holder: Mutex<Option<RunId>>,
    next_run_id: AtomicU64,
}

impl GuardInner {
    fn holder(&self) -> MutexGuard<'_, Option<RunId>> {
        // Only ever holds an Option; a poisoned lock still has a valid value
        self.holder.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Binary acquire/release token for one job
#[derive(Debug, Clone, Default)]
pub struct ExecutionGuard {
    inner: Arc<GuardInner>,
}

impl ExecutionGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the token if it is free
    pub fn try_acquire(&self) -> Option<GuardPermit> {
        let mut holder = self.inner.holder();
        if holder.is_some() {
            return None;
        }

        let run_id = self.inner.next_run_id.fetch_add(1, Ordering::Relaxed) + 1;
        *holder = Some(run_id);
        Some(GuardPermit {
            guard: self.clone(),
            run_id,
        })
    }

    pub fn is_held(&self) -> bool {
        self.inner.holder().is_some()
    }

    /// Run id of the current holder, if any
    pub fn holder(&self) -> Option<RunId> {
        *self.inner.holder()
    }

    /// Release the token regardless of who holds it
    ///
    /// Returns the run id that was holding it.
    pub fn force_release(&self) -> Option<RunId> {
        self.inner.holder().take()
    }

    fn release(&self, run_id: RunId) {
        let mut holder = self.inner.holder();
        if *holder == Some(run_id) {
            *holder = None;
        }
    }
}

/// Proof that the guard is held; releases it on drop
#[derive(Debug)]
pub struct GuardPermit {
    guard: ExecutionGuard,
    run_id: RunId,
}

impl GuardPermit {
    pub fn run_id(&self) -> RunId {
        self.run_id
    }
}

impl Drop for GuardPermit {
    fn drop(&mut self) {
        self.guard.release(self.run_id);
    }
}

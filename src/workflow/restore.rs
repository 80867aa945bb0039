//! Restoration of the pre-workflow index on every exit path.
//!
//! A [`RestoreGuard`] holds the snapshot for the normal and error paths; the
//! same pending restore is shared with the Ctrl-C handler through a
//! [`RestoreHook`]. Whichever runs first takes it, so it runs at most once.
//!
//! The hook's mutex doubles as the index lock. Workflow steps that write the
//! index run inside [`RestoreHook::exclusive`], and the interrupt path keeps
//! the lock from its restore until the process exits, so the two never
//! interleave.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::git::cli::GitCli;
use crate::git::snapshot::{IndexSnapshot, RestoreOutcome};

/// A snapshot waiting to be reapplied.
#[derive(Debug)]
pub struct PendingRestore {
    git: GitCli,
    snapshot: IndexSnapshot,
}

impl PendingRestore {
    /// Reapply the snapshot, resetting the index to HEAD first when asked.
    pub fn run(self, reset_first: bool) -> RestoreOutcome {
        if reset_first && let Err(e) = self.git.reset_index() {
            warn!("Failed to reset index before restore: {e}");
        }
        self.snapshot.restore(&self.git)
    }
}

/// Shared slot for the pending restore.
#[derive(Debug, Clone, Default)]
pub struct RestoreHook {
    pending: Arc<Mutex<Option<PendingRestore>>>,
}

impl RestoreHook {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self) -> MutexGuard<'_, Option<PendingRestore>> {
        // A panic while holding the lock must not prevent cleanup.
        self.pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn set(&self, restore: PendingRestore) {
        *self.slot() = Some(restore);
    }

    pub fn is_armed(&self) -> bool {
        self.slot().is_some()
    }

    /// Run an index mutation while holding the index lock.
    pub fn exclusive<T>(&self, mutate: impl FnOnce() -> T) -> T {
        let _lock = self.slot();
        mutate()
    }

    /// Run the pending restore, if any, under the index lock.
    pub fn run_pending(&self, reset_first: bool) -> Option<RestoreOutcome> {
        self.restore_and_hold(reset_first).1
    }

    /// Run the pending restore and hand back the still-held index lock.
    fn restore_and_hold(
        &self,
        reset_first: bool,
    ) -> (MutexGuard<'_, Option<PendingRestore>>, Option<RestoreOutcome>) {
        let mut slot = self.slot();
        let outcome = slot.take().map(|pending| pending.run(reset_first));
        (slot, outcome)
    }

    /// Restore and exit 1 without ever releasing the index lock.
    fn restore_and_exit(&self) {
        let (_lock, outcome) = self.restore_and_hold(true);
        if let Some(outcome) = outcome {
            eprintln!("  Restore: {outcome}");
        }
        std::process::exit(1);
    }
}

/// Reapplies the snapshot when finished explicitly or when dropped.
///
/// Dropping without [`RestoreGuard::finish`] means an error unwound the
/// workflow, so the index is reset before the snapshot is reapplied.
#[must_use = "dropping the guard restores the index immediately"]
pub struct RestoreGuard {
    hook: RestoreHook,
}

impl RestoreGuard {
    pub fn arm(hook: &RestoreHook, git: GitCli, snapshot: IndexSnapshot) -> Self {
        debug!(empty = snapshot.is_empty(), "Armed index restore");
        hook.set(PendingRestore { git, snapshot });
        Self { hook: hook.clone() }
    }

    /// Run the restore now. Returns `None` if an interrupt already ran it.
    pub fn finish(self, reset_first: bool) -> Option<RestoreOutcome> {
        self.hook.run_pending(reset_first)
    }
}

impl Drop for RestoreGuard {
    fn drop(&mut self) {
        if let Some(outcome) = self.hook.run_pending(true) {
            eprintln!("  Restore: {outcome}");
        }
    }
}

/// Restore the index and exit 1 on Ctrl-C.
///
/// Waits for any in-flight index mutation to finish before restoring.
pub fn spawn_interrupt_handler(hook: RestoreHook) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Could not listen for Ctrl-C: {e}");
            return;
        }
        eprintln!();
        eprintln!("Interrupted.");
        if let Err(e) = tokio::task::spawn_blocking(move || hook.restore_and_exit()).await {
            warn!("Interrupt restore did not complete: {e}");
            std::process::exit(1);
        }
    })
}

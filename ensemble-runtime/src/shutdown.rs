//! The process-wide shutdown tracker.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{OnceLock, Weak};

use parking_lot::Mutex;
use thiserror::Error;

/// Capacity of the workflows table.
pub const MAX_WORKFLOWS: usize = 32;

/// Capacity of the supervisors table.
pub const MAX_SUPERVISORS: usize = 8;

/// Capacity of the registries table.
pub const MAX_REGISTRIES: usize = 8;

/// Errors from the shutdown tracker.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The table for this kind of handle is full.
    #[error("shutdown tracker at capacity for {0}")]
    QueueFull(&'static str),
}

/// Something the tracker can tear down.
///
/// `teardown` must be idempotent: the tracker may race a normal drop, and
/// a handle torn down twice must be a no-op the second time.
pub trait Teardown: Send + Sync {
    /// Release the object's supervised resources.
    fn teardown(&self);
}

/// Which table a handle registers into. Teardown runs workflows first,
/// then supervisors, then registries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackedKind {
    /// Session workflows.
    Workflow,
    /// Lifecycle supervisors.
    Supervisor,
    /// CI registries.
    Registry,
}

impl TrackedKind {
    fn label(self) -> &'static str {
        match self {
            TrackedKind::Workflow => "workflows",
            TrackedKind::Supervisor => "supervisors",
            TrackedKind::Registry => "registries",
        }
    }

    fn capacity(self) -> usize {
        match self {
            TrackedKind::Workflow => MAX_WORKFLOWS,
            TrackedKind::Supervisor => MAX_SUPERVISORS,
            TrackedKind::Registry => MAX_REGISTRIES,
        }
    }
}

struct Slot {
    id: u64,
    handle: Weak<dyn Teardown>,
}

#[derive(Default)]
struct Tables {
    workflows: Vec<Slot>,
    supervisors: Vec<Slot>,
    registries: Vec<Slot>,
}

impl Tables {
    fn table_mut(&mut self, kind: TrackedKind) -> &mut Vec<Slot> {
        match kind {
            TrackedKind::Workflow => &mut self.workflows,
            TrackedKind::Supervisor => &mut self.supervisors,
            TrackedKind::Registry => &mut self.registries,
        }
    }
}

static NEXT_REGISTRATION_ID: AtomicU64 = AtomicU64::new(1);
static GLOBAL_TRACKER: OnceLock<ShutdownTracker> = OnceLock::new();

/// Mutex-guarded tables of weak teardown handles.
///
/// Instances can be constructed and injected for tests; production code
/// shares [`ShutdownTracker::global`]. Handles are held weakly: an object
/// dropped the normal way simply disappears from its table.
pub struct ShutdownTracker {
    tables: Mutex<Tables>,
}

impl ShutdownTracker {
    /// Create an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(Tables::default()),
        }
    }

    /// The process-wide tracker, created on first use.
    pub fn global() -> &'static ShutdownTracker {
        GLOBAL_TRACKER.get_or_init(ShutdownTracker::new)
    }

    /// Register a handle. Returns a registration id for
    /// [`ShutdownTracker::unregister`].
    pub fn register(
        &self,
        kind: TrackedKind,
        handle: Weak<dyn Teardown>,
    ) -> Result<u64, RuntimeError> {
        let mut tables = self.tables.lock();
        let table = tables.table_mut(kind);
        // Dead weaks do not count against the cap.
        table.retain(|slot| slot.handle.strong_count() > 0);
        if table.len() >= kind.capacity() {
            return Err(RuntimeError::QueueFull(kind.label()));
        }
        let id = NEXT_REGISTRATION_ID.fetch_add(1, Ordering::Relaxed);
        table.push(Slot { id, handle });
        Ok(id)
    }

    /// Drop a registration. Unknown ids are ignored.
    pub fn unregister(&self, id: u64) {
        let mut tables = self.tables.lock();
        for kind in [
            TrackedKind::Workflow,
            TrackedKind::Supervisor,
            TrackedKind::Registry,
        ] {
            tables.table_mut(kind).retain(|slot| slot.id != id);
        }
    }

    /// Number of live registrations of `kind`.
    #[must_use]
    pub fn len(&self, kind: TrackedKind) -> usize {
        let mut tables = self.tables.lock();
        let table = tables.table_mut(kind);
        table.retain(|slot| slot.handle.strong_count() > 0);
        table.len()
    }

    /// Tear down every registered handle, workflows → supervisors →
    /// registries, and clear the tables. Idempotent: a second call finds
    /// nothing to do.
    pub fn cleanup_all(&self) {
        let drained: Vec<(TrackedKind, Vec<Slot>)> = {
            let mut tables = self.tables.lock();
            [
                TrackedKind::Workflow,
                TrackedKind::Supervisor,
                TrackedKind::Registry,
            ]
            .into_iter()
            .map(|kind| (kind, std::mem::take(tables.table_mut(kind))))
            .collect()
        };
        // Teardown runs outside the lock so handles may re-enter the
        // tracker (unregister) without deadlocking.
        for (kind, slots) in drained {
            for slot in slots {
                if let Some(handle) = slot.handle.upgrade() {
                    tracing::info!(kind = kind.label(), id = slot.id, "tearing down");
                    handle.teardown();
                }
            }
        }
    }

    /// Spawn the signal task: on SIGINT or SIGTERM, run
    /// [`ShutdownTracker::cleanup_all`] and exit the process with code 0.
    ///
    /// Must be called from within a tokio runtime.
    pub fn install_signal_handler(&'static self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let interrupted = wait_for_termination().await;
            tracing::info!(signal = interrupted, "termination signal, cleaning up");
            self.cleanup_all();
            std::process::exit(0);
        })
    }
}

impl Default for ShutdownTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolve when the process receives a termination signal. Returns the
/// signal name for logging.
async fn wait_for_termination() -> &'static str {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(stream) => stream,
            Err(e) => {
                tracing::warn!(error = %e, "SIGTERM handler unavailable, watching SIGINT only");
                let _ = tokio::signal::ctrl_c().await;
                return "SIGINT";
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => "SIGINT",
            _ = sigterm.recv() => "SIGTERM",
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        "SIGINT"
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

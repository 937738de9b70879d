//! Session composition: an orchestrator wired into the shutdown tracker.

use std::sync::{Arc, Weak};

use ensemble_orch::Orchestrator;
use ensemble_types::OrchError;
use parking_lot::Mutex;

use crate::shutdown::{ShutdownTracker, Teardown, TrackedKind};

struct SessionGuard {
    orchestrator: Mutex<Orchestrator>,
}

impl Teardown for SessionGuard {
    fn teardown(&self) {
        // Orchestrator::shutdown is idempotent, so racing a normal drop
        // is harmless.
        self.orchestrator.lock().shutdown();
    }
}

/// An orchestrator registered with a shutdown tracker.
///
/// The tracker holds only a weak handle: dropping the session removes it
/// from teardown without any unregistration ceremony, and `Drop`
/// additionally clears the registration id eagerly.
pub struct SharedSession {
    guard: Arc<SessionGuard>,
    tracker: Option<&'static ShutdownTracker>,
    registration: Option<u64>,
}

impl SharedSession {
    /// Wrap an orchestrator.
    #[must_use]
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self {
            guard: Arc::new(SessionGuard {
                orchestrator: Mutex::new(orchestrator),
            }),
            tracker: None,
            registration: None,
        }
    }

    /// Register with `tracker` so a fatal signal tears this session down.
    pub fn register(
        &mut self,
        tracker: &'static ShutdownTracker,
    ) -> Result<(), crate::shutdown::RuntimeError> {
        let handle: Arc<dyn Teardown> = self.guard.clone();
        let weak: Weak<dyn Teardown> = Arc::downgrade(&handle);
        let id = tracker.register(TrackedKind::Workflow, weak)?;
        self.tracker = Some(tracker);
        self.registration = Some(id);
        Ok(())
    }

    /// Run `f` with exclusive access to the orchestrator.
    pub fn with<R>(&self, f: impl FnOnce(&mut Orchestrator) -> R) -> R {
        f(&mut self.guard.orchestrator.lock())
    }
}

impl Drop for SharedSession {
    fn drop(&mut self) {
        if let (Some(tracker), Some(id)) = (self.tracker, self.registration.take()) {
            tracker.unregister(id);
        }
        self.guard.teardown();
    }
}

/// Create an orchestrator for `session_id`, register it with the global
/// shutdown tracker, run the caller's `setup`, start the workflow, and
/// log the session status. The orchestrator is torn down on return —
/// success or failure.
pub fn run_session<F>(session_id: &str, base_branch: &str, setup: F) -> Result<(), OrchError>
where
    F: FnOnce(&mut Orchestrator) -> Result<(), OrchError>,
{
    let mut session = SharedSession::new(Orchestrator::new(session_id, base_branch));
    if let Err(e) = session.register(ShutdownTracker::global()) {
        // A full tracker is survivable: the session still tears down on
        // return, it just won't be reached by a signal.
        tracing::warn!(error = %e, "session not registered with shutdown tracker");
    }

    let result = session.with(|orchestrator| {
        setup(orchestrator)?;
        orchestrator.start_workflow()?;
        tracing::info!(status = %orchestrator.status_text(), "session started");
        Ok(())
    });

    // Teardown happens in SharedSession::drop on every path.
    result
}

// ─── Tests ───────────────────────────────────────────────────────────────────

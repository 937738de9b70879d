#![deny(missing_docs)]
//! # ensemble-runtime — process-wide teardown
//!
//! The [`ShutdownTracker`] is the one piece of process-wide mutable state
//! in the system: a mutex-guarded table of weak handles to live
//! workflows, supervisors, and registries. On normal exit or a fatal
//! signal, [`ShutdownTracker::cleanup_all`] tears them down in a fixed
//! order — workflows first, then supervisors, then registries — and the
//! signal task exits the process with code 0.
//!
//! [`run_session`] is the convenience composition: build an orchestrator,
//! register it, run the caller's setup, start the workflow, log status,
//! and tear everything down on the way out no matter what happened.

mod session;
mod shutdown;

pub use session::{run_session, SharedSession};
pub use shutdown::{
    RuntimeError, ShutdownTracker, Teardown, TrackedKind, MAX_REGISTRIES, MAX_SUPERVISORS,
    MAX_WORKFLOWS,
};

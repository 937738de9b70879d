#![deny(missing_docs)]
//! # ensemble-orch — the session runtime
//!
//! One [`Orchestrator`] owns everything a session needs:
//!
//! - a [`Registry`] — the name/role/port directory with per-CI counters,
//! - a [`LifecycleSupervisor`] — the per-CI state machine with heartbeat
//!   supervision and error escalation,
//! - a [`Workflow`] handle — the phase record the session advances through,
//! - optionally one [`MergeNegotiation`] — confidence-ranked conflict
//!   resolution between CIs.
//!
//! Messages travel through a [`BusTransport`]: the registry gates and
//! counts deliveries, the transport moves bytes. The in-process
//! [`LocalTransport`] serves tests and single-process deployments; a
//! socket transport lives outside this crate and runs its own event loop.
//!
//! Nothing here blocks: registry, supervisor, merge, and workflow
//! operations are plain synchronous mutations, and `BusTransport::deliver`
//! is a hand-off, not a round-trip. Each orchestrator instance is
//! single-owner; share one across threads only behind external
//! synchronization.

mod bus;
mod lifecycle;
mod merge;
mod orchestrator;
mod registry;
mod workflow;

pub use bus::{
    new_request_id, BusTransport, LocalTransport, PendingRequests, RequestKey,
    DEFAULT_REQUEST_TIMEOUT, MAX_PENDING_REQUESTS,
};
pub use lifecycle::{
    LifecycleEntry, LifecycleSupervisor, Transition, DEFAULT_HEARTBEAT_TIMEOUT, DEFAULT_MAX_MISSED,
};
pub use merge::{Conflict, MergeNegotiation, Proposal};
pub use orchestrator::Orchestrator;
pub use registry::{
    Counters, Registry, RegistryEntry, DEFAULT_BASE_PORT, DEFAULT_CAPACITY, MAX_NAME_LEN,
    PORTS_PER_ROLE, STALE_HEARTBEAT,
};
pub use workflow::Workflow;

//! Lifecycle status and event vocabulary.
//!
//! These are a shared vocabulary, not a trait: the supervisor applies
//! events to entries, the registry mirrors the resulting status, and the
//! orchestrator reports both. The transition table lives on
//! [`LifecycleEvent::target_status`] so every consumer agrees on it.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Observable status of a CI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CiStatus {
    /// Not started, or terminated.
    Offline,
    /// Start requested, not yet ready.
    Starting,
    /// Available for task assignment.
    Ready,
    /// Working on an assigned task.
    Busy,
    /// Escalated after a failure or missed heartbeats.
    Error,
    /// Graceful shutdown in progress or complete.
    Shutdown,
}

impl CiStatus {
    /// Stable lowercase name, as used in status reports.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            CiStatus::Offline => "offline",
            CiStatus::Starting => "starting",
            CiStatus::Ready => "ready",
            CiStatus::Busy => "busy",
            CiStatus::Error => "error",
            CiStatus::Shutdown => "shutdown",
        }
    }

    /// Whether a CI in this status can receive bus messages.
    #[must_use]
    pub fn can_receive(self) -> bool {
        matches!(self, CiStatus::Ready | CiStatus::Busy)
    }
}

impl fmt::Display for CiStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Events that drive the per-CI state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleEvent {
    /// Entry created in the supervisor.
    Created,
    /// Start requested.
    Initializing,
    /// CI reported in as available.
    Ready,
    /// A task was assigned.
    TaskAssigned,
    /// The assigned task finished.
    TaskComplete,
    /// A failure was recorded.
    Error,
    /// Graceful shutdown requested.
    ShutdownRequested,
    /// Shutdown acknowledged.
    Shutdown,
    /// Forcibly terminated.
    Terminated,
}

impl LifecycleEvent {
    /// The status this event transitions an entry into.
    #[must_use]
    pub fn target_status(self) -> CiStatus {
        match self {
            LifecycleEvent::Created => CiStatus::Offline,
            LifecycleEvent::Initializing => CiStatus::Starting,
            LifecycleEvent::Ready => CiStatus::Ready,
            LifecycleEvent::TaskAssigned => CiStatus::Busy,
            LifecycleEvent::TaskComplete => CiStatus::Ready,
            LifecycleEvent::Error => CiStatus::Error,
            LifecycleEvent::ShutdownRequested | LifecycleEvent::Shutdown => CiStatus::Shutdown,
            LifecycleEvent::Terminated => CiStatus::Offline,
        }
    }

    /// Stable lowercase name, as recorded in transition history.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            LifecycleEvent::Created => "created",
            LifecycleEvent::Initializing => "initializing",
            LifecycleEvent::Ready => "ready",
            LifecycleEvent::TaskAssigned => "task_assigned",
            LifecycleEvent::TaskComplete => "task_complete",
            LifecycleEvent::Error => "error",
            LifecycleEvent::ShutdownRequested => "shutdown_requested",
            LifecycleEvent::Shutdown => "shutdown",
            LifecycleEvent::Terminated => "terminated",
        }
    }
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

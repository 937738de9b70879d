//! Per-CI lifecycle supervision.
//!
//! The supervisor owns one [`LifecycleEntry`] per CI and applies
//! [`LifecycleEvent`]s through the shared transition table. Entries refer
//! to registry entries by name only — every status mirror and heartbeat
//! read is a fresh lookup, never a cached reference.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use ensemble_types::{CiStatus, LifecycleError, LifecycleEvent};

use crate::registry::Registry;

/// Default heartbeat timeout.
pub const DEFAULT_HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(60);

/// Missed heartbeats tolerated before escalation.
pub const DEFAULT_MAX_MISSED: u32 = 3;

/// One recorded state change. Immutable once appended.
#[derive(Debug, Clone)]
pub struct Transition {
    /// When the transition happened.
    pub at: DateTime<Utc>,
    /// Status before.
    pub from: CiStatus,
    /// Status after.
    pub to: CiStatus,
    /// The event that drove it.
    pub event: LifecycleEvent,
    /// Optional free-form reason.
    pub reason: Option<String>,
}

/// Supervision state for one CI.
///
/// `history[0]` is always the most recent transition.
#[derive(Debug, Clone)]
pub struct LifecycleEntry {
    /// The CI's name (the registry key).
    pub name: String,
    /// Current status.
    pub status: CiStatus,
    /// When the entry was created.
    pub created_at: DateTime<Utc>,
    /// When the last transition happened.
    pub last_transition: DateTime<Utc>,
    /// Total transitions applied, surviving `clear_history`.
    pub transition_count: u64,
    /// Transition records, most recent first.
    pub history: Vec<Transition>,
    /// How often this CI is expected to heartbeat.
    pub heartbeat_interval: Duration,
    /// Consecutive heartbeat checks the CI has missed.
    pub missed_heartbeats: u32,
    /// Errors recorded against this CI.
    pub error_count: u64,
    /// The most recent error text.
    pub last_error: Option<String>,
    /// Description of the task in progress, if any.
    pub current_task: Option<String>,
    /// When the current task was assigned.
    pub task_started: Option<DateTime<Utc>>,
}

impl LifecycleEntry {
    fn new(name: String, heartbeat_interval: Duration) -> Self {
        let now = Utc::now();
        Self {
            name,
            status: CiStatus::Offline,
            created_at: now,
            last_transition: now,
            transition_count: 0,
            history: Vec::new(),
            heartbeat_interval,
            missed_heartbeats: 0,
            error_count: 0,
            last_error: None,
            current_task: None,
            task_started: None,
        }
    }
}

/// The per-session supervisor.
pub struct LifecycleSupervisor {
    entries: BTreeMap<String, LifecycleEntry>,
    heartbeat_timeout: Duration,
    max_missed: u32,
}

impl LifecycleSupervisor {
    /// Create a supervisor with the default heartbeat policy.
    #[must_use]
    pub fn new() -> Self {
        Self::with_policy(DEFAULT_HEARTBEAT_TIMEOUT, DEFAULT_MAX_MISSED)
    }

    /// Create a supervisor with an explicit heartbeat timeout and missed
    /// tolerance.
    #[must_use]
    pub fn with_policy(heartbeat_timeout: Duration, max_missed: u32) -> Self {
        Self {
            entries: BTreeMap::new(),
            heartbeat_timeout,
            max_missed,
        }
    }

    /// Number of supervised CIs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no CIs are supervised.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up an entry by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&LifecycleEntry> {
        self.entries.get(name)
    }

    /// Iterate entries in name order.
    pub fn iter(&self) -> impl Iterator<Item = &LifecycleEntry> {
        self.entries.values()
    }

    /// Create an entry for `name`, initially offline, recording the
    /// creation transition.
    pub fn create_ci(&mut self, registry: &mut Registry, name: &str) -> Result<(), LifecycleError> {
        if self.entries.contains_key(name) {
            return Err(LifecycleError::Duplicate(name.to_string()));
        }
        self.entries.insert(
            name.to_string(),
            LifecycleEntry::new(name.to_string(), self.heartbeat_timeout),
        );
        self.apply(registry, name, LifecycleEvent::Created, None)?;
        Ok(())
    }

    /// Remove an entry. The registry entry, if any, is untouched.
    pub fn remove_ci(&mut self, name: &str) -> Result<(), LifecycleError> {
        self.entries
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| LifecycleError::NotFound(name.to_string()))
    }

    /// Apply `event` to `name`, appending history and mirroring the new
    /// status into the registry.
    pub fn apply(
        &mut self,
        registry: &mut Registry,
        name: &str,
        event: LifecycleEvent,
        reason: Option<String>,
    ) -> Result<CiStatus, LifecycleError> {
        let entry = self
            .entries
            .get_mut(name)
            .ok_or_else(|| LifecycleError::NotFound(name.to_string()))?;
        let from = entry.status;
        let to = event.target_status();
        let now = Utc::now();
        entry.history.insert(
            0,
            Transition {
                at: now,
                from,
                to,
                event,
                reason,
            },
        );
        entry.status = to;
        entry.last_transition = now;
        entry.transition_count += 1;
        tracing::debug!(name, %event, from = %from, to = %to, "lifecycle transition");

        // Weak link: resolved by name on every mirror, never cached.
        if registry.update_status(name, to).is_err() {
            tracing::debug!(name, "no registry entry to mirror into");
        }
        Ok(to)
    }

    /// Start a CI: offline → starting. Any other current status logs a
    /// warning and leaves the entry unchanged.
    pub fn start_ci(&mut self, registry: &mut Registry, name: &str) -> Result<(), LifecycleError> {
        let entry = self
            .entries
            .get(name)
            .ok_or_else(|| LifecycleError::NotFound(name.to_string()))?;
        if entry.status != CiStatus::Offline {
            tracing::warn!(name, status = %entry.status, "start ignored: not offline");
            return Ok(());
        }
        self.apply(registry, name, LifecycleEvent::Initializing, None)?;
        Ok(())
    }

    /// Mark a CI as ready for work.
    pub fn mark_ready(
        &mut self,
        registry: &mut Registry,
        name: &str,
    ) -> Result<(), LifecycleError> {
        self.apply(registry, name, LifecycleEvent::Ready, None)?;
        Ok(())
    }

    /// Stop a CI: gracefully to shutdown, or directly offline.
    pub fn stop_ci(
        &mut self,
        registry: &mut Registry,
        name: &str,
        graceful: bool,
    ) -> Result<(), LifecycleError> {
        let event = if graceful {
            LifecycleEvent::ShutdownRequested
        } else {
            LifecycleEvent::Terminated
        };
        self.apply(registry, name, event, None)?;
        Ok(())
    }

    /// Assign a task. The CI must be ready (or freshly starting); any
    /// other status is rejected.
    pub fn assign_task(
        &mut self,
        registry: &mut Registry,
        name: &str,
        description: &str,
    ) -> Result<(), LifecycleError> {
        let entry = self
            .entries
            .get_mut(name)
            .ok_or_else(|| LifecycleError::NotFound(name.to_string()))?;
        if !matches!(entry.status, CiStatus::Ready | CiStatus::Starting) {
            return Err(LifecycleError::CiInvalid {
                name: name.to_string(),
                status: entry.status,
                required: "ready",
            });
        }
        entry.current_task = Some(description.to_string());
        entry.task_started = Some(Utc::now());
        self.apply(
            registry,
            name,
            LifecycleEvent::TaskAssigned,
            Some(description.to_string()),
        )?;
        Ok(())
    }

    /// Complete the current task. A failed task is counted against the
    /// CI but still returns it to ready.
    pub fn complete_task(
        &mut self,
        registry: &mut Registry,
        name: &str,
        success: bool,
    ) -> Result<(), LifecycleError> {
        let entry = self
            .entries
            .get_mut(name)
            .ok_or_else(|| LifecycleError::NotFound(name.to_string()))?;
        let task = entry.current_task.take();
        entry.task_started = None;
        if !success {
            entry.error_count += 1;
            entry.last_error = task
                .as_deref()
                .map(|t| format!("task failed: {t}"))
                .or_else(|| Some("task failed".to_string()));
            tracing::warn!(name, task = task.as_deref().unwrap_or(""), "task failed");
        }
        self.apply(registry, name, LifecycleEvent::TaskComplete, task)?;
        Ok(())
    }

    /// Record an error against a CI, escalating it to the error state.
    pub fn record_error(
        &mut self,
        registry: &mut Registry,
        name: &str,
        message: &str,
    ) -> Result<(), LifecycleError> {
        let entry = self
            .entries
            .get_mut(name)
            .ok_or_else(|| LifecycleError::NotFound(name.to_string()))?;
        entry.error_count += 1;
        entry.last_error = Some(message.to_string());
        self.apply(
            registry,
            name,
            LifecycleEvent::Error,
            Some(message.to_string()),
        )?;
        Ok(())
    }

    /// Scan for missed heartbeats at `now`.
    ///
    /// Every non-offline entry whose registry heartbeat is at least the
    /// timeout old gains one missed count; an entry at the tolerance is
    /// escalated to the error state, and re-reported on later scans while
    /// it stays quiet. Returns how many entries were escalated this scan.
    /// Never blocks.
    pub fn check_heartbeats(&mut self, registry: &mut Registry, now: DateTime<Utc>) -> usize {
        let timeout = chrono::Duration::from_std(self.heartbeat_timeout)
            .unwrap_or_else(|_| chrono::Duration::seconds(60));
        let names: Vec<String> = self
            .entries
            .values()
            .filter(|e| e.status != CiStatus::Offline)
            .map(|e| e.name.clone())
            .collect();

        let mut escalated = 0;
        for name in names {
            // Heartbeats live on the registry entry; missing registry
            // entries are skipped, not errors.
            let Some(last_heartbeat) = registry.find_by_name(&name).map(|e| e.last_heartbeat)
            else {
                continue;
            };
            // Exactly at the threshold counts as missed.
            if now - last_heartbeat < timeout {
                continue;
            }
            let max_missed = self.max_missed;
            let missed = {
                let entry = match self.entries.get_mut(&name) {
                    Some(entry) => entry,
                    None => continue,
                };
                entry.missed_heartbeats += 1;
                entry.missed_heartbeats
            };
            tracing::debug!(name = %name, missed, "heartbeat missed");
            if missed >= max_missed {
                let _ = self.record_error(
                    registry,
                    &name,
                    &format!("missed {missed} heartbeats"),
                );
                escalated += 1;
            }
        }
        escalated
    }

    /// Reset a CI's missed-heartbeat count (on any observed heartbeat).
    pub fn reset_missed(&mut self, name: &str) -> Result<(), LifecycleError> {
        let entry = self
            .entries
            .get_mut(name)
            .ok_or_else(|| LifecycleError::NotFound(name.to_string()))?;
        entry.missed_heartbeats = 0;
        Ok(())
    }

    /// Drop a CI's transition history. The transition count and current
    /// status survive.
    pub fn clear_history(&mut self, name: &str) -> Result<(), LifecycleError> {
        let entry = self
            .entries
            .get_mut(name)
            .ok_or_else(|| LifecycleError::NotFound(name.to_string()))?;
        entry.history.clear();
        Ok(())
    }
}

impl Default for LifecycleSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

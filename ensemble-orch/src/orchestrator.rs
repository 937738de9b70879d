//! The session orchestrator: registry + supervisor + workflow + merge.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use ensemble_types::{CiMessage, MergeError, OrchError, Provider, QueryResponse, Role};

use crate::bus::{BusTransport, LocalTransport};
use crate::lifecycle::LifecycleSupervisor;
use crate::merge::MergeNegotiation;
use crate::registry::Registry;
use crate::workflow::Workflow;

/// Owns everything one session needs and keeps registry and supervisor in
/// lock-step: every CI mutation made through the orchestrator lands in
/// both.
///
/// The orchestrator is single-owner and fully synchronous; callers that
/// share one across threads wrap it in their own lock.
pub struct Orchestrator {
    session_id: String,
    base_branch: String,
    feature_branch: String,
    registry: Registry,
    supervisor: LifecycleSupervisor,
    workflow: Workflow,
    negotiation: Option<MergeNegotiation>,
    providers: HashMap<String, Box<dyn Provider>>,
    running: bool,
    started_at: DateTime<Utc>,
}

impl Orchestrator {
    /// Create a session orchestrator with an in-process bus transport.
    #[must_use]
    pub fn new(session_id: impl Into<String>, base_branch: impl Into<String>) -> Self {
        Self::with_transport(session_id, base_branch, Arc::new(LocalTransport::new()))
    }

    /// Create a session orchestrator over an explicit bus transport.
    #[must_use]
    pub fn with_transport(
        session_id: impl Into<String>,
        base_branch: impl Into<String>,
        transport: Arc<dyn BusTransport>,
    ) -> Self {
        let session_id = session_id.into();
        let feature_branch = format!("feature/{session_id}");
        Self {
            registry: Registry::new(transport),
            supervisor: LifecycleSupervisor::new(),
            workflow: Workflow::new(session_id.clone()),
            negotiation: None,
            providers: HashMap::new(),
            session_id,
            base_branch: base_branch.into(),
            feature_branch,
            running: true,
            started_at: Utc::now(),
        }
    }

    /// The session id.
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// The branch this session forked from.
    #[must_use]
    pub fn base_branch(&self) -> &str {
        &self.base_branch
    }

    /// The session's working branch.
    #[must_use]
    pub fn feature_branch(&self) -> &str {
        &self.feature_branch
    }

    /// Whether the session has not been shut down.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// The registry, read-only.
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// The supervisor, read-only.
    #[must_use]
    pub fn supervisor(&self) -> &LifecycleSupervisor {
        &self.supervisor
    }

    /// The workflow handle, read-only.
    #[must_use]
    pub fn workflow(&self) -> &Workflow {
        &self.workflow
    }

    /// The active negotiation, if any.
    #[must_use]
    pub fn negotiation(&self) -> Option<&MergeNegotiation> {
        self.negotiation.as_ref()
    }

    /// Replace the workflow's phase list before starting it.
    pub fn set_phases(&mut self, phases: Vec<String>) {
        self.workflow = Workflow::new(self.session_id.clone()).with_phases(phases);
    }

    // ── CI lifecycle facades ────────────────────────────────────────────

    /// Register a CI in both registry and supervisor. Returns the
    /// allocated port.
    pub fn add_ci(&mut self, name: &str, role: Role, model: &str) -> Result<u16, OrchError> {
        let port = self.registry.allocate_port(role)?;
        self.registry.add_ci(name, role, model, port)?;
        if let Err(e) = self.supervisor.create_ci(&mut self.registry, name) {
            // Keep the pair consistent: a supervisor refusal rolls the
            // registry entry back.
            let _ = self.registry.remove_ci(name);
            return Err(e.into());
        }
        Ok(port)
    }

    /// Remove a CI from both registry and supervisor.
    pub fn remove_ci(&mut self, name: &str) -> Result<(), OrchError> {
        self.supervisor.remove_ci(name)?;
        self.registry.remove_ci(name)?;
        Ok(())
    }

    /// Start a CI (offline → starting).
    pub fn start_ci(&mut self, name: &str) -> Result<(), OrchError> {
        self.supervisor.start_ci(&mut self.registry, name)?;
        Ok(())
    }

    /// Mark a CI ready for work.
    pub fn mark_ready(&mut self, name: &str) -> Result<(), OrchError> {
        self.supervisor.mark_ready(&mut self.registry, name)?;
        Ok(())
    }

    /// Stop a CI, gracefully or not.
    pub fn stop_ci(&mut self, name: &str, graceful: bool) -> Result<(), OrchError> {
        self.supervisor.stop_ci(&mut self.registry, name, graceful)?;
        Ok(())
    }

    /// Assign a task to a CI.
    pub fn create_task(&mut self, name: &str, description: &str) -> Result<(), OrchError> {
        self.supervisor
            .assign_task(&mut self.registry, name, description)?;
        Ok(())
    }

    /// Complete a CI's current task.
    pub fn complete_task(&mut self, name: &str, success: bool) -> Result<(), OrchError> {
        self.supervisor
            .complete_task(&mut self.registry, name, success)?;
        Ok(())
    }

    /// Record a heartbeat for a CI at `now`.
    pub fn record_heartbeat(&mut self, name: &str, now: DateTime<Utc>) -> Result<(), OrchError> {
        self.registry.record_heartbeat(name, now)?;
        self.supervisor.reset_missed(name)?;
        Ok(())
    }

    /// Scan for missed heartbeats; returns how many CIs were escalated.
    pub fn check_heartbeats(&mut self, now: DateTime<Utc>) -> usize {
        self.supervisor.check_heartbeats(&mut self.registry, now)
    }

    /// Count CIs whose heartbeat has gone stale.
    #[must_use]
    pub fn check_health(&self, now: DateTime<Utc>) -> usize {
        self.registry.check_health(now)
    }

    // ── Provider binding ────────────────────────────────────────────────

    /// Bind a provider to a registered CI, replacing any previous
    /// binding. The replaced provider, if any, is returned so the caller
    /// can clean it up.
    pub fn bind_provider(
        &mut self,
        name: &str,
        provider: Box<dyn Provider>,
    ) -> Result<Option<Box<dyn Provider>>, OrchError> {
        if self.registry.find_by_name(name).is_none() {
            return Err(ensemble_types::RegistryError::NotFound(name.to_string()).into());
        }
        Ok(self.providers.insert(name.to_string(), provider))
    }

    /// Detach and return a CI's provider so the caller can clean it up.
    pub fn unbind_provider(&mut self, name: &str) -> Option<Box<dyn Provider>> {
        self.providers.remove(name)
    }

    /// The provider bound to `name`, if any.
    #[must_use]
    pub fn provider(&self, name: &str) -> Option<&dyn Provider> {
        self.providers.get(name).map(Box::as_ref)
    }

    /// Query a CI through its bound provider.
    pub async fn query_ci(
        &mut self,
        name: &str,
        prompt: &str,
    ) -> Result<QueryResponse, OrchError> {
        let provider = self
            .providers
            .get_mut(name)
            .ok_or_else(|| OrchError::NoProvider(name.to_string()))?;
        Ok(provider.query(prompt).await?)
    }

    /// Stream a CI's answer through its bound provider.
    pub async fn stream_ci(
        &mut self,
        name: &str,
        prompt: &str,
        on_chunk: &mut (dyn for<'chunk> FnMut(&'chunk str) + Send),
    ) -> Result<QueryResponse, OrchError> {
        let provider = self
            .providers
            .get_mut(name)
            .ok_or_else(|| OrchError::NoProvider(name.to_string()))?;
        Ok(provider.stream(prompt, on_chunk).await?)
    }

    // ── Messaging facades ───────────────────────────────────────────────

    /// Send one message between CIs.
    pub fn send_message(
        &mut self,
        from: &str,
        to: &str,
        kind: &str,
        content: &str,
    ) -> Result<(), OrchError> {
        let message = CiMessage::new(from, to, kind, content);
        self.registry.send_message(&message)?;
        Ok(())
    }

    /// Broadcast to every matching CI; returns how many received it.
    pub fn broadcast_message(
        &mut self,
        from: &str,
        role_filter: Option<Role>,
        kind: &str,
        content: &str,
    ) -> Result<usize, OrchError> {
        Ok(self.registry.broadcast(from, role_filter, kind, content)?)
    }

    // ── Workflow facades ────────────────────────────────────────────────

    /// Start the session workflow. Refuses while already running.
    pub fn start_workflow(&mut self) -> Result<(), OrchError> {
        self.workflow.start()
    }

    /// Advance the workflow to its next phase, returning the phase name.
    pub fn advance_phase(&mut self) -> Result<String, OrchError> {
        self.workflow.advance().map(str::to_owned)
    }

    /// Pause the workflow.
    pub fn pause_workflow(&mut self) -> Result<(), OrchError> {
        self.workflow.pause()
    }

    /// Resume the workflow.
    pub fn resume_workflow(&mut self) -> Result<(), OrchError> {
        self.workflow.resume()
    }

    // ── Merge facades ───────────────────────────────────────────────────

    /// Open a merge negotiation. Refuses while one is active.
    pub fn start_merge(&mut self, branch_a: &str, branch_b: &str) -> Result<(), OrchError> {
        if self.negotiation.is_some() {
            return Err(MergeError::AlreadyActive.into());
        }
        self.negotiation = Some(MergeNegotiation::new(
            self.session_id.clone(),
            branch_a,
            branch_b,
        ));
        Ok(())
    }

    /// Register a conflict with the active negotiation.
    pub fn add_conflict(
        &mut self,
        file: &str,
        line_start: u32,
        line_end: u32,
        content_a: &str,
        content_b: &str,
    ) -> Result<u64, OrchError> {
        let negotiation = self.negotiation.as_mut().ok_or(MergeError::NotActive)?;
        Ok(negotiation.add_conflict(file, line_start, line_end, content_a, content_b))
    }

    /// Submit a resolution proposal to the active negotiation.
    pub fn propose_resolution(
        &mut self,
        conflict_id: u64,
        ci_name: &str,
        content: &str,
        confidence: f64,
    ) -> Result<u64, OrchError> {
        let negotiation = self.negotiation.as_mut().ok_or(MergeError::NotActive)?;
        Ok(negotiation.propose_resolution(conflict_id, ci_name, content, confidence)?)
    }

    /// Finalize and close the active negotiation, returning its summary.
    /// Refuses while any conflict lacks a resolution.
    pub fn finalize_merge(&mut self) -> Result<serde_json::Value, OrchError> {
        let negotiation = self.negotiation.as_mut().ok_or(MergeError::NotActive)?;
        negotiation.finalize()?;
        let summary = negotiation.to_json();
        self.negotiation = None;
        Ok(summary)
    }

    // ── Status reporting ────────────────────────────────────────────────

    /// Human-readable session status.
    #[must_use]
    pub fn status_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "session {} ({} → {})",
            self.session_id, self.base_branch, self.feature_branch
        );
        let _ = writeln!(
            out,
            "workflow: {} phase={} paused={}",
            if self.workflow.is_running() { "running" } else { "stopped" },
            self.workflow.current_phase().unwrap_or("-"),
            self.workflow.is_paused(),
        );
        for entry in self.registry.iter() {
            let _ = writeln!(
                out,
                "  {:<31} {:<12} {} port={} sent={} recv={} errors={}",
                entry.name,
                entry.role,
                entry.status,
                entry.port,
                entry.counters.messages_sent,
                entry.counters.messages_received,
                entry.counters.errors,
            );
        }
        if let Some(negotiation) = &self.negotiation {
            let _ = writeln!(
                out,
                "merge: {}/{} conflicts resolved",
                negotiation.resolved_count(),
                negotiation.conflict_count(),
            );
        }
        out
    }

    /// Machine-readable session status with per-CI counters.
    #[must_use]
    pub fn status_json(&self) -> serde_json::Value {
        let cis: Vec<serde_json::Value> = self
            .registry
            .iter()
            .map(|entry| {
                let lifecycle = self.supervisor.get(&entry.name);
                serde_json::json!({
                    "name": entry.name,
                    "role": entry.role,
                    "model": entry.model,
                    "port": entry.port,
                    "status": entry.status,
                    "messages_sent": entry.counters.messages_sent,
                    "messages_received": entry.counters.messages_received,
                    "errors": entry.counters.errors,
                    "last_error_at": entry.counters.last_error_at.map(|t| t.timestamp()),
                    "current_task": lifecycle.and_then(|l| l.current_task.clone()),
                    "transition_count": lifecycle.map(|l| l.transition_count),
                })
            })
            .collect();
        serde_json::json!({
            "session_id": self.session_id,
            "base_branch": self.base_branch,
            "feature_branch": self.feature_branch,
            "running": self.running,
            "started_at": self.started_at.timestamp(),
            "workflow": {
                "running": self.workflow.is_running(),
                "paused": self.workflow.is_paused(),
                "phase": self.workflow.current_phase(),
                "phase_index": self.workflow.phase_index(),
                "phase_count": self.workflow.phase_count(),
            },
            "cis": cis,
            "negotiation": self.negotiation.as_ref().map(MergeNegotiation::to_json),
        })
    }

    /// Shut the session down: stop the workflow, gracefully stop every
    /// CI, drop bound providers, abandon any open negotiation.
    /// Idempotent.
    ///
    /// Providers are released by drop; callers wanting explicit
    /// `cleanup` calls detach them first with
    /// [`Orchestrator::unbind_provider`].
    pub fn shutdown(&mut self) {
        if !self.running {
            return;
        }
        self.workflow.stop();
        let names: Vec<String> = self.registry.iter().map(|e| e.name.clone()).collect();
        for name in names {
            let _ = self.supervisor.stop_ci(&mut self.registry, &name, true);
        }
        self.providers.clear();
        self.negotiation = None;
        self.running = false;
        tracing::info!(session = %self.session_id, "session shut down");
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use ensemble_types::CiStatus;

    fn orchestrator() -> Orchestrator {
        Orchestrator::new("s-1", "main")
    }

    #[test]
    fn add_ci_lands_in_both_registry_and_supervisor() {
        let mut orch = orchestrator();
        let port = orch.add_ci("alpha", Role::Builder, "m").expect("add");
        assert_eq!(port, 9000);
        assert!(orch.registry().find_by_name("alpha").is_some());
        assert!(orch.supervisor().get("alpha").is_some());
    }

    #[test]
    fn remove_ci_clears_both() {
        let mut orch = orchestrator();
        orch.add_ci("alpha", Role::Builder, "m").expect("add");
        orch.remove_ci("alpha").expect("remove");
        assert!(orch.registry().find_by_name("alpha").is_none());
        assert!(orch.supervisor().get("alpha").is_none());
    }

    #[test]
    fn duplicate_add_rolls_back_cleanly() {
        let mut orch = orchestrator();
        orch.add_ci("alpha", Role::Builder, "m").expect("add");
        assert!(orch.add_ci("alpha", Role::Builder, "m").is_err());
        // Still exactly one of each.
        assert_eq!(orch.registry().len(), 1);
        assert_eq!(orch.supervisor().len(), 1);
    }

    #[test]
    fn ports_allocate_per_role() {
        let mut orch = orchestrator();
        assert_eq!(orch.add_ci("b1", Role::Builder, "m").expect("add"), 9000);
        assert_eq!(orch.add_ci("b2", Role::Builder, "m").expect("add"), 9001);
        assert_eq!(orch.add_ci("c1", Role::Coordinator, "m").expect("add"), 9010);
        assert_eq!(orch.add_ci("r1", Role::Requirements, "m").expect("add"), 9020);
        assert_eq!(orch.add_ci("a1", Role::Analysis, "m").expect("add"), 9030);
    }

    #[test]
    fn workflow_invariants_hold_through_the_facade() {
        let mut orch = orchestrator();
        orch.start_workflow().expect("start");
        assert!(matches!(
            orch.start_workflow(),
            Err(OrchError::WorkflowRunning)
        ));
        assert_eq!(orch.advance_phase().expect("advance"), "build");
        orch.pause_workflow().expect("pause");
        orch.resume_workflow().expect("resume");
    }

    #[test]
    fn merge_invariants_hold_through_the_facade() {
        let mut orch = orchestrator();
        orch.start_merge("main", "feature/s-1").expect("open");
        assert!(matches!(
            orch.start_merge("main", "feature/s-1"),
            Err(OrchError::Merge(MergeError::AlreadyActive))
        ));

        let conflict = orch
            .add_conflict("x.c", 10, 20, "a", "b")
            .expect("conflict");
        assert!(matches!(
            orch.finalize_merge(),
            Err(OrchError::Merge(MergeError::Incomplete { .. }))
        ));

        orch.propose_resolution(conflict, "alpha", "merged", 80.0)
            .expect("propose");
        let summary = orch.finalize_merge().expect("finalize");
        assert_eq!(summary["resolved_count"], 1);
        assert!(orch.negotiation().is_none());
        // A new negotiation may start after the old one closes.
        orch.start_merge("main", "feature/s-2").expect("reopen");
    }

    #[test]
    fn merge_operations_require_an_active_negotiation() {
        let mut orch = orchestrator();
        assert!(matches!(
            orch.add_conflict("x.c", 1, 2, "a", "b"),
            Err(OrchError::Merge(MergeError::NotActive))
        ));
        assert!(matches!(
            orch.propose_resolution(1, "a", "x", 50.0),
            Err(OrchError::Merge(MergeError::NotActive))
        ));
        assert!(matches!(
            orch.finalize_merge(),
            Err(OrchError::Merge(MergeError::NotActive))
        ));
    }

    #[test]
    fn status_json_reports_counters_and_workflow() {
        let mut orch = orchestrator();
        orch.add_ci("alpha", Role::Builder, "m").expect("add");
        orch.start_workflow().expect("start");

        let status = orch.status_json();
        assert_eq!(status["session_id"], "s-1");
        assert_eq!(status["workflow"]["running"], true);
        assert_eq!(status["cis"][0]["name"], "alpha");
        assert_eq!(status["cis"][0]["status"], "offline");
        assert_eq!(status["cis"][0]["errors"], 0);
    }

    #[test]
    fn status_text_mentions_every_ci() {
        let mut orch = orchestrator();
        orch.add_ci("alpha", Role::Builder, "m").expect("add");
        orch.add_ci("beta", Role::Analysis, "m").expect("add");
        let text = orch.status_text();
        assert!(text.contains("alpha"));
        assert!(text.contains("beta"));
        assert!(text.contains("session s-1"));
    }

    #[test]
    fn shutdown_is_idempotent_and_stops_everything() {
        let mut orch = orchestrator();
        orch.add_ci("alpha", Role::Builder, "m").expect("add");
        orch.start_ci("alpha").expect("start");
        orch.start_workflow().expect("start workflow");

        orch.shutdown();
        assert!(!orch.is_running());
        assert!(!orch.workflow().is_running());
        assert_eq!(
            orch.supervisor().get("alpha").expect("entry").status,
            CiStatus::Shutdown
        );
        orch.shutdown(); // no-op
    }

    #[test]
    fn heartbeat_facade_resets_missed_count() {
        let mut orch = orchestrator();
        orch.add_ci("alpha", Role::Builder, "m").expect("add");
        orch.start_ci("alpha").expect("start");

        let now = Utc::now();
        orch.record_heartbeat("alpha", now).expect("beat");
        assert_eq!(orch.check_health(now), 0);
        assert_eq!(orch.supervisor().get("alpha").expect("entry").missed_heartbeats, 0);
    }
}

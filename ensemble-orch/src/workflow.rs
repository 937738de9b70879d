//! The workflow handle: a phase record, not an execution engine.
//!
//! Step execution lives outside the core; the orchestrator only needs to
//! know which phase a session is in and whether the workflow is running
//! or paused.

use chrono::{DateTime, Utc};
use ensemble_types::OrchError;

/// Phases a fresh workflow advances through.
pub(crate) const DEFAULT_PHASES: [&str; 4] = ["requirements", "build", "review", "merge"];

/// The phase record for one session's workflow.
#[derive(Debug, Clone)]
pub struct Workflow {
    name: String,
    phases: Vec<String>,
    current: usize,
    running: bool,
    paused: bool,
    started_at: Option<DateTime<Utc>>,
}

impl Workflow {
    /// Create a workflow with the default phase list.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            phases: DEFAULT_PHASES.iter().map(|p| (*p).to_string()).collect(),
            current: 0,
            running: false,
            paused: false,
            started_at: None,
        }
    }

    /// Replace the phase list. Only meaningful before `start`.
    #[must_use]
    pub fn with_phases(mut self, phases: Vec<String>) -> Self {
        self.phases = phases;
        self
    }

    /// The workflow's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the workflow has been started and not yet stopped.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Whether the workflow is paused.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// The current phase name, if any phases exist.
    #[must_use]
    pub fn current_phase(&self) -> Option<&str> {
        self.phases.get(self.current).map(String::as_str)
    }

    /// Zero-based index of the current phase.
    #[must_use]
    pub fn phase_index(&self) -> usize {
        self.current
    }

    /// Total number of phases.
    #[must_use]
    pub fn phase_count(&self) -> usize {
        self.phases.len()
    }

    /// When the workflow was started.
    #[must_use]
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// Start from the first phase. Refuses while already running.
    pub fn start(&mut self) -> Result<(), OrchError> {
        if self.running {
            return Err(OrchError::WorkflowRunning);
        }
        self.running = true;
        self.paused = false;
        self.current = 0;
        self.started_at = Some(Utc::now());
        tracing::info!(workflow = %self.name, "workflow started");
        Ok(())
    }

    /// Advance to the next phase, returning its name. Advancing past the
    /// final phase stops the workflow and fails with workflow-complete.
    pub fn advance(&mut self) -> Result<&str, OrchError> {
        if !self.running {
            return Err(OrchError::WorkflowNotRunning);
        }
        if self.current + 1 >= self.phases.len() {
            self.running = false;
            return Err(OrchError::WorkflowComplete);
        }
        self.current += 1;
        let phase = &self.phases[self.current];
        tracing::info!(workflow = %self.name, phase = %phase, "phase advanced");
        Ok(phase)
    }

    /// Pause a running workflow.
    pub fn pause(&mut self) -> Result<(), OrchError> {
        if !self.running {
            return Err(OrchError::WorkflowNotRunning);
        }
        self.paused = true;
        Ok(())
    }

    /// Resume a paused workflow.
    pub fn resume(&mut self) -> Result<(), OrchError> {
        if !self.running {
            return Err(OrchError::WorkflowNotRunning);
        }
        self.paused = false;
        Ok(())
    }

    /// Stop the workflow. Idempotent.
    pub fn stop(&mut self) {
        self.running = false;
        self.paused = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_refuses_while_running() {
        let mut w = Workflow::new("s-1");
        w.start().expect("first start");
        assert!(matches!(w.start(), Err(OrchError::WorkflowRunning)));
        w.stop();
        w.start().expect("restart after stop");
    }

    #[test]
    fn phases_advance_in_order_and_complete() {
        let mut w = Workflow::new("s-1").with_phases(vec!["a".into(), "b".into()]);
        w.start().expect("start");
        assert_eq!(w.current_phase(), Some("a"));
        assert_eq!(w.advance().expect("advance"), "b");
        assert!(matches!(w.advance(), Err(OrchError::WorkflowComplete)));
        assert!(!w.is_running());
    }

    #[test]
    fn advance_requires_running() {
        let mut w = Workflow::new("s-1");
        assert!(matches!(w.advance(), Err(OrchError::WorkflowNotRunning)));
    }

    #[test]
    fn pause_and_resume() {
        let mut w = Workflow::new("s-1");
        assert!(w.pause().is_err());
        w.start().expect("start");
        w.pause().expect("pause");
        assert!(w.is_paused());
        w.resume().expect("resume");
        assert!(!w.is_paused());
    }

    #[test]
    fn default_phases_are_four() {
        let w = Workflow::new("s-1");
        assert_eq!(w.phase_count(), 4);
        assert_eq!(w.current_phase(), Some("requirements"));
    }
}

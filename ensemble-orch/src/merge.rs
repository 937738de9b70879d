//! Merge-conflict negotiation between CIs.
//!
//! A negotiation collects conflicts between two branches and
//! confidence-tagged resolution proposals from CIs. Selection is always
//! highest-confidence-wins across a conflict's proposals; ties keep the
//! earliest proposal at the maximum.

use chrono::Utc;
use ensemble_types::MergeError;
use serde_json::Value;

/// Clamp a proposal confidence into [0, 100].
///
/// Non-finite inputs (NaN, ±∞) are coerced to the neutral 50.
#[must_use]
fn clamp_confidence(confidence: f64) -> u8 {
    if !confidence.is_finite() {
        return 50;
    }
    confidence.clamp(0.0, 100.0).round() as u8
}

/// One conflicting region between the two branches.
#[derive(Debug, Clone)]
pub struct Conflict {
    /// Conflict id, unique within the negotiation.
    pub id: u64,
    /// File the conflict is in.
    pub file: String,
    /// First conflicting line.
    pub line_start: u32,
    /// Last conflicting line.
    pub line_end: u32,
    /// The region's content on branch A.
    pub content_a: String,
    /// The region's content on branch B.
    pub content_b: String,
    /// Id of the accepted resolution proposal, once any proposal exists.
    pub resolution: Option<u64>,
}

impl Conflict {
    /// The review JSON shape:
    /// `{"file", "line_start", "line_end", "content_a", "content_b"}`.
    #[must_use]
    pub fn to_json(&self) -> Value {
        serde_json::json!({
            "file": self.file,
            "line_start": self.line_start,
            "line_end": self.line_end,
            "content_a": self.content_a,
            "content_b": self.content_b,
        })
    }
}

/// One CI's proposed resolution for a conflict.
#[derive(Debug, Clone)]
pub struct Proposal {
    /// Proposal id, unique within the negotiation.
    pub id: u64,
    /// The conflict this resolves.
    pub conflict_id: u64,
    /// The proposing CI.
    pub ci_name: String,
    /// The proposed merged content.
    pub content: String,
    /// Confidence in [0, 100].
    pub confidence: u8,
    /// Unix seconds at submission.
    pub at: i64,
}

/// A negotiation over the conflicts between two branches.
pub struct MergeNegotiation {
    session_id: String,
    branch_a: String,
    branch_b: String,
    conflicts: Vec<Conflict>,
    proposals: Vec<Proposal>,
    started_at: i64,
    completed_at: Option<i64>,
    next_conflict_id: u64,
    next_proposal_id: u64,
}

impl MergeNegotiation {
    /// Open a negotiation between `branch_a` and `branch_b`.
    #[must_use]
    pub fn new(
        session_id: impl Into<String>,
        branch_a: impl Into<String>,
        branch_b: impl Into<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            branch_a: branch_a.into(),
            branch_b: branch_b.into(),
            conflicts: Vec::new(),
            proposals: Vec::new(),
            started_at: Utc::now().timestamp(),
            completed_at: None,
            next_conflict_id: 1,
            next_proposal_id: 1,
        }
    }

    /// The branch pair under negotiation.
    #[must_use]
    pub fn branches(&self) -> (&str, &str) {
        (&self.branch_a, &self.branch_b)
    }

    /// Number of registered conflicts.
    #[must_use]
    pub fn conflict_count(&self) -> usize {
        self.conflicts.len()
    }

    /// Number of submitted proposals.
    #[must_use]
    pub fn proposal_count(&self) -> usize {
        self.proposals.len()
    }

    /// Number of conflicts with an accepted resolution.
    #[must_use]
    pub fn resolved_count(&self) -> usize {
        self.conflicts.iter().filter(|c| c.resolution.is_some()).count()
    }

    /// When the negotiation was finalized, if it was.
    #[must_use]
    pub fn completed_at(&self) -> Option<i64> {
        self.completed_at
    }

    /// The registered conflicts, in registration order.
    #[must_use]
    pub fn conflicts(&self) -> &[Conflict] {
        &self.conflicts
    }

    /// Register a conflict; returns its id.
    pub fn add_conflict(
        &mut self,
        file: impl Into<String>,
        line_start: u32,
        line_end: u32,
        content_a: impl Into<String>,
        content_b: impl Into<String>,
    ) -> u64 {
        let id = self.next_conflict_id;
        self.next_conflict_id += 1;
        self.conflicts.push(Conflict {
            id,
            file: file.into(),
            line_start,
            line_end,
            content_a: content_a.into(),
            content_b: content_b.into(),
            resolution: None,
        });
        id
    }

    /// Submit a proposal for `conflict_id`; returns the proposal id.
    ///
    /// The confidence is clamped to [0, 100] (non-finite values coerce to
    /// 50). The conflict's accepted resolution is re-selected as the
    /// highest-confidence proposal seen so far.
    pub fn propose_resolution(
        &mut self,
        conflict_id: u64,
        ci_name: impl Into<String>,
        content: impl Into<String>,
        confidence: f64,
    ) -> Result<u64, MergeError> {
        if !self.conflicts.iter().any(|c| c.id == conflict_id) {
            return Err(MergeError::UnknownConflict(conflict_id));
        }
        let id = self.next_proposal_id;
        self.next_proposal_id += 1;
        self.proposals.push(Proposal {
            id,
            conflict_id,
            ci_name: ci_name.into(),
            content: content.into(),
            confidence: clamp_confidence(confidence),
            at: Utc::now().timestamp(),
        });

        let best = self.select_best_proposal(conflict_id).map(|p| p.id);
        if let Some(conflict) = self.conflicts.iter_mut().find(|c| c.id == conflict_id) {
            conflict.resolution = best;
        }
        Ok(id)
    }

    /// The highest-confidence proposal for `conflict_id`, if any. Ties
    /// keep the earliest proposal at the maximum.
    #[must_use]
    pub fn select_best_proposal(&self, conflict_id: u64) -> Option<&Proposal> {
        self.proposals
            .iter()
            .filter(|p| p.conflict_id == conflict_id)
            .fold(None, |best: Option<&Proposal>, candidate| match best {
                Some(current) if candidate.confidence > current.confidence => Some(candidate),
                Some(current) => Some(current),
                None => Some(candidate),
            })
    }

    /// Whether every conflict has an accepted resolution.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.conflicts.iter().all(|c| c.resolution.is_some())
    }

    /// Finalize the negotiation. Refuses while any conflict lacks a
    /// resolution.
    pub fn finalize(&mut self) -> Result<(), MergeError> {
        let unresolved = self.conflict_count() - self.resolved_count();
        if unresolved > 0 {
            return Err(MergeError::Incomplete { unresolved });
        }
        self.completed_at = Some(Utc::now().timestamp());
        tracing::info!(
            session = %self.session_id,
            conflicts = self.conflict_count(),
            proposals = self.proposal_count(),
            "merge negotiation finalized"
        );
        Ok(())
    }

    /// The negotiation summary JSON.
    #[must_use]
    pub fn to_json(&self) -> Value {
        serde_json::json!({
            "session_id": self.session_id,
            "branch_a": self.branch_a,
            "branch_b": self.branch_b,
            "conflict_count": self.conflict_count(),
            "proposal_count": self.proposal_count(),
            "resolved_count": self.resolved_count(),
            "complete": self.is_complete(),
            "started_at": self.started_at,
            "completed_at": self.completed_at,
            "conflicts": self.conflicts.iter().map(Conflict::to_json).collect::<Vec<_>>(),
        })
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

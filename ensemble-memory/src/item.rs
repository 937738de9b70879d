//! Memory items and their relevance metadata.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use ensemble_types::MemoryError;

/// Item ids are monotonically increasing within the process, across all
/// digests, so an id never collides after a sunset/sunrise handoff.
static NEXT_ITEM_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_item_id() -> u64 {
    NEXT_ITEM_ID.fetch_add(1, Ordering::Relaxed)
}

/// What kind of knowledge a memory item records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryKind {
    /// Something observed to be true.
    Fact,
    /// A decision taken during the session.
    Decision,
    /// An approach being followed.
    Approach,
    /// Something that went wrong.
    Error,
    /// Something that worked.
    Success,
    /// A short progress marker.
    Breadcrumb,
    /// A relationship between entities or CIs.
    Relationship,
}

impl MemoryKind {
    /// Stable lowercase label, used in the rendered context block.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            MemoryKind::Fact => "fact",
            MemoryKind::Decision => "decision",
            MemoryKind::Approach => "approach",
            MemoryKind::Error => "error",
            MemoryKind::Success => "success",
            MemoryKind::Breadcrumb => "breadcrumb",
            MemoryKind::Relationship => "relationship",
        }
    }
}

impl fmt::Display for MemoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How useful an item currently is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relevance {
    /// Score in [0.0, 1.0]. New items start at 1.0.
    pub score: f64,
    /// Unix seconds of the last access through `select_item`.
    pub last_accessed: i64,
    /// How many times the item was selected.
    pub access_count: u32,
    /// A CI explicitly marked this item important.
    pub marked_important: bool,
}

impl Relevance {
    pub(crate) fn fresh(now: i64) -> Self {
        Self {
            score: 1.0,
            last_accessed: now,
            access_count: 0,
            marked_important: false,
        }
    }

    /// Replace the score, rejecting values outside [0.0, 1.0].
    pub fn update(&mut self, score: f64) -> Result<(), MemoryError> {
        if !(0.0..=1.0).contains(&score) {
            return Err(MemoryError::OutOfRange(score));
        }
        self.score = score;
        Ok(())
    }
}

/// One typed entry in a digest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryItem {
    /// Process-unique, monotonically increasing id.
    pub id: u64,
    /// What kind of knowledge this is.
    pub kind: MemoryKind,
    /// The item's content. Counted against the digest cap.
    pub content: String,
    /// Name of the CI that created the item.
    pub creator: String,
    /// Unix seconds at creation.
    pub created: i64,
    /// Access metadata and score.
    pub relevance: Relevance,
}

impl MemoryItem {
    pub(crate) fn new(kind: MemoryKind, content: String, creator: String) -> Self {
        let now = Utc::now().timestamp();
        Self {
            id: next_item_id(),
            kind,
            content,
            creator,
            created: now,
            relevance: Relevance::fresh(now),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_monotonic() {
        let a = MemoryItem::new(MemoryKind::Fact, "a".into(), "ci".into());
        let b = MemoryItem::new(MemoryKind::Fact, "b".into(), "ci".into());
        assert!(b.id > a.id);
    }

    #[test]
    fn fresh_relevance_starts_at_one() {
        let item = MemoryItem::new(MemoryKind::Decision, "x".into(), "ci".into());
        assert_eq!(item.relevance.score, 1.0);
        assert_eq!(item.relevance.access_count, 0);
        assert!(!item.relevance.marked_important);
    }

    #[test]
    fn update_rejects_out_of_range() {
        let mut rel = Relevance::fresh(0);
        assert!(rel.update(1.5).is_err());
        assert!(rel.update(-0.1).is_err());
        assert_eq!(rel.score, 1.0);
        rel.update(0.25).expect("in range");
        assert_eq!(rel.score, 0.25);
    }
}

//! The bounded digest itself.

use chrono::Utc;
use std::path::Path;

use ensemble_types::{ContextSource, MemoryError};

use crate::item::{MemoryItem, MemoryKind};

/// Maximum number of items a digest holds.
pub const MAX_ITEMS: usize = 100;

/// Maximum number of breadcrumbs a digest holds.
pub const MAX_BREADCRUMBS: usize = 20;

/// Bounded, typed memory for one CI in one session.
///
/// The digest's budget is `context_limit / 2` bytes, shared by item
/// contents and the sunset/sunrise notes. Mutations that would exceed the
/// budget fail with [`MemoryError::TooLarge`] and leave the digest
/// unchanged.
#[derive(Debug, Clone)]
pub struct MemoryDigest {
    session_id: String,
    ci_name: String,
    created: i64,
    context_limit: usize,
    max_allowed: usize,
    items: Vec<MemoryItem>,
    breadcrumbs: Vec<String>,
    sunset_notes: Option<String>,
    sunrise_brief: Option<String>,
}

impl MemoryDigest {
    /// Create an empty digest for `ci_name` in `session_id`.
    ///
    /// `context_limit` is the bound model's context window; the digest may
    /// use at most half of it.
    pub fn new(
        session_id: impl Into<String>,
        ci_name: impl Into<String>,
        context_limit: usize,
    ) -> Result<Self, MemoryError> {
        if context_limit < 2 {
            return Err(MemoryError::InvalidValue(format!(
                "context limit too small: {context_limit}"
            )));
        }
        Ok(Self {
            session_id: session_id.into(),
            ci_name: ci_name.into(),
            created: Utc::now().timestamp(),
            context_limit,
            max_allowed: context_limit / 2,
            items: Vec::new(),
            breadcrumbs: Vec::new(),
            sunset_notes: None,
            sunrise_brief: None,
        })
    }

    /// The session this digest belongs to.
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// The CI this digest belongs to.
    #[must_use]
    pub fn ci_name(&self) -> &str {
        &self.ci_name
    }

    /// Unix seconds at creation.
    #[must_use]
    pub fn created(&self) -> i64 {
        self.created
    }

    /// The context window the budget is derived from.
    #[must_use]
    pub fn context_limit(&self) -> usize {
        self.context_limit
    }

    /// The hard budget: half the context limit.
    #[must_use]
    pub fn max_allowed(&self) -> usize {
        self.max_allowed
    }

    /// Bytes currently counted against the budget: item contents plus the
    /// sunset and sunrise notes. Breadcrumbs are not counted.
    #[must_use]
    pub fn size(&self) -> usize {
        let items: usize = self.items.iter().map(|i| i.content.len()).sum();
        items
            + self.sunset_notes.as_deref().map_or(0, str::len)
            + self.sunrise_brief.as_deref().map_or(0, str::len)
    }

    /// Number of items held.
    #[must_use]
    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    /// The breadcrumb list, oldest first.
    #[must_use]
    pub fn breadcrumbs(&self) -> &[String] {
        &self.breadcrumbs
    }

    /// The sunset notes, if set.
    #[must_use]
    pub fn sunset_notes(&self) -> Option<&str> {
        self.sunset_notes.as_deref()
    }

    /// The sunrise brief, if set.
    #[must_use]
    pub fn sunrise_brief(&self) -> Option<&str> {
        self.sunrise_brief.as_deref()
    }

    /// Add a typed item. Fails without mutation when the digest is at its
    /// item cap or the content would exceed the budget.
    pub fn add_item(
        &mut self,
        kind: MemoryKind,
        content: impl Into<String>,
        creator: impl Into<String>,
    ) -> Result<u64, MemoryError> {
        let content = content.into();
        if self.items.len() >= MAX_ITEMS {
            return Err(MemoryError::QueueFull("items"));
        }
        let size = self.size() + content.len();
        if size > self.max_allowed {
            tracing::debug!(size, max = self.max_allowed, "rejecting over-budget item");
            return Err(MemoryError::TooLarge {
                size,
                max: self.max_allowed,
            });
        }
        let item = MemoryItem::new(kind, content, creator.into());
        let id = item.id;
        self.items.push(item);
        Ok(id)
    }

    /// Add a short progress breadcrumb.
    pub fn add_breadcrumb(&mut self, text: impl Into<String>) -> Result<(), MemoryError> {
        if self.breadcrumbs.len() >= MAX_BREADCRUMBS {
            return Err(MemoryError::QueueFull("breadcrumbs"));
        }
        self.breadcrumbs.push(text.into());
        Ok(())
    }

    /// Look up an item by id, recording the access.
    pub fn select_item(&mut self, id: u64) -> Result<&MemoryItem, MemoryError> {
        let item = self
            .items
            .iter_mut()
            .find(|i| i.id == id)
            .ok_or(MemoryError::NotFound(id))?;
        item.relevance.last_accessed = Utc::now().timestamp();
        item.relevance.access_count += 1;
        Ok(item)
    }

    /// Mark an item as important so decay never buries it.
    pub fn mark_important(&mut self, id: u64) -> Result<(), MemoryError> {
        let item = self
            .items
            .iter_mut()
            .find(|i| i.id == id)
            .ok_or(MemoryError::NotFound(id))?;
        item.relevance.marked_important = true;
        Ok(())
    }

    /// Replace an item's relevance score. Rejects values outside [0, 1].
    pub fn update_relevance(&mut self, id: u64, score: f64) -> Result<(), MemoryError> {
        let item = self
            .items
            .iter_mut()
            .find(|i| i.id == id)
            .ok_or(MemoryError::NotFound(id))?;
        item.relevance.update(score)
    }

    /// Multiply every item's score by `factor`. The caller guarantees
    /// `0 ≤ factor ≤ 1`; items marked important are not decayed.
    pub fn decay(&mut self, factor: f64) {
        for item in &mut self.items {
            if !item.relevance.marked_important {
                item.relevance.score *= factor;
            }
        }
    }

    /// Up to `max` items of `kind`, highest score first.
    #[must_use]
    pub fn suggest_by_type(&self, kind: MemoryKind, max: usize) -> Vec<&MemoryItem> {
        let mut matching: Vec<&MemoryItem> =
            self.items.iter().filter(|i| i.kind == kind).collect();
        matching.sort_by(|a, b| {
            b.relevance
                .score
                .partial_cmp(&a.relevance.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.id.cmp(&b.id))
        });
        matching.truncate(max);
        matching
    }

    /// Set the sunset notes (end-of-session handoff). Counted against the
    /// budget; fails without mutation when over.
    pub fn set_sunset_notes(&mut self, text: impl Into<String>) -> Result<(), MemoryError> {
        let text = text.into();
        let size = self.size() - self.sunset_notes.as_deref().map_or(0, str::len) + text.len();
        if size > self.max_allowed {
            return Err(MemoryError::TooLarge {
                size,
                max: self.max_allowed,
            });
        }
        self.sunset_notes = Some(text);
        Ok(())
    }

    /// Set the sunrise brief (start-of-session context). Counted against
    /// the budget; fails without mutation when over.
    pub fn set_sunrise_brief(&mut self, text: impl Into<String>) -> Result<(), MemoryError> {
        let text = text.into();
        let size = self.size() - self.sunrise_brief.as_deref().map_or(0, str::len) + text.len();
        if size > self.max_allowed {
            return Err(MemoryError::TooLarge {
                size,
                max: self.max_allowed,
            });
        }
        self.sunrise_brief = Some(text);
        Ok(())
    }

    /// Check the digest's invariants: budget, item cap, breadcrumb cap.
    pub fn validate(&self) -> Result<(), MemoryError> {
        let size = self.size();
        if size > self.max_allowed {
            return Err(MemoryError::TooLarge {
                size,
                max: self.max_allowed,
            });
        }
        if self.items.len() > MAX_ITEMS {
            return Err(MemoryError::QueueFull("items"));
        }
        if self.breadcrumbs.len() > MAX_BREADCRUMBS {
            return Err(MemoryError::QueueFull("breadcrumbs"));
        }
        Ok(())
    }

    /// The stable JSON shape:
    /// `{session_id, ci_name, created, item_count, breadcrumbs[]}`.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "session_id": self.session_id,
            "ci_name": self.ci_name,
            "created": self.created,
            "item_count": self.items.len(),
            "breadcrumbs": self.breadcrumbs,
        })
    }

    /// Rebuild a digest's observable fields from the stable JSON shape.
    ///
    /// Items are not part of the shape, so `item_count` is informational
    /// only; the rebuilt digest starts with the breadcrumbs and notes of
    /// the persisted one and an empty item list.
    pub fn from_json(value: &serde_json::Value, context_limit: usize) -> Result<Self, MemoryError> {
        let session_id = value["session_id"]
            .as_str()
            .ok_or_else(|| MemoryError::Corrupt("missing session_id".into()))?;
        let ci_name = value["ci_name"]
            .as_str()
            .ok_or_else(|| MemoryError::Corrupt("missing ci_name".into()))?;
        let created = value["created"]
            .as_i64()
            .ok_or_else(|| MemoryError::Corrupt("missing created".into()))?;
        let breadcrumbs = value["breadcrumbs"]
            .as_array()
            .ok_or_else(|| MemoryError::Corrupt("missing breadcrumbs".into()))?
            .iter()
            .map(|b| {
                b.as_str()
                    .map(str::to_owned)
                    .ok_or_else(|| MemoryError::Corrupt("non-string breadcrumb".into()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        if breadcrumbs.len() > MAX_BREADCRUMBS {
            return Err(MemoryError::QueueFull("breadcrumbs"));
        }
        let mut digest = Self::new(session_id, ci_name, context_limit)?;
        digest.created = created;
        digest.breadcrumbs = breadcrumbs;
        Ok(digest)
    }

    /// Write the stable JSON shape to `path`. Not fsynced — durability is
    /// the caller's responsibility.
    pub fn save_to_file(&self, path: &Path) -> Result<(), MemoryError> {
        let json = serde_json::to_string_pretty(&self.to_json())
            .map_err(|e| MemoryError::Corrupt(e.to_string()))?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Read a digest back from a file written by [`Self::save_to_file`].
    pub fn load_from_file(path: &Path, context_limit: usize) -> Result<Self, MemoryError> {
        let text = std::fs::read_to_string(path)?;
        let value: serde_json::Value =
            serde_json::from_str(&text).map_err(|e| MemoryError::Corrupt(e.to_string()))?;
        Self::from_json(&value, context_limit)
    }

    /// Render the fixed-shape context block ahead of `task`.
    ///
    /// Sections appear only when they have content: previous-session
    /// summary (sunset), session context (sunrise), progress breadcrumbs,
    /// relevant items labeled by kind, then the current task.
    #[must_use]
    pub fn augment_prompt(&self, task: &str) -> String {
        let mut out = String::new();
        if let Some(sunset) = &self.sunset_notes {
            out.push_str("## Previous Session Summary\n");
            out.push_str(sunset);
            out.push_str("\n\n");
        }
        if let Some(sunrise) = &self.sunrise_brief {
            out.push_str("## Session Context\n");
            out.push_str(sunrise);
            out.push_str("\n\n");
        }
        if !self.breadcrumbs.is_empty() {
            out.push_str("## Progress Breadcrumbs\n");
            for crumb in &self.breadcrumbs {
                out.push_str("- ");
                out.push_str(crumb);
                out.push('\n');
            }
            out.push('\n');
        }
        if !self.items.is_empty() {
            out.push_str("## Relevant Context\n");
            let mut items: Vec<&MemoryItem> = self.items.iter().collect();
            items.sort_by(|a, b| {
                b.relevance
                    .score
                    .partial_cmp(&a.relevance.score)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(a.id.cmp(&b.id))
            });
            for item in items {
                out.push_str(&format!("- [{}] {}\n", item.kind, item.content));
            }
            out.push('\n');
        }
        out.push_str("## Current Task\n");
        out.push_str(task);
        out
    }
}

impl ContextSource for MemoryDigest {
    fn augment(&self, task: &str) -> String {
        self.augment_prompt(task)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn digest() -> MemoryDigest {
        MemoryDigest::new("s-1", "alpha", 200).expect("digest")
    }

    #[test]
    fn budget_is_half_the_context_limit() {
        let d = digest();
        assert_eq!(d.max_allowed(), 100);
    }

    #[test]
    fn cap_enforcement_leaves_digest_unchanged() {
        let mut d = digest();
        d.add_item(MemoryKind::Fact, "x".repeat(60), "alpha")
            .expect("60 bytes fit in 100");
        let err = d
            .add_item(MemoryKind::Fact, "y".repeat(50), "alpha")
            .expect_err("60 + 50 exceeds 100");
        assert!(matches!(err, MemoryError::TooLarge { size: 110, max: 100 }));
        assert_eq!(d.size(), 60);
        assert_eq!(d.item_count(), 1);
        d.validate().expect("digest still valid");
    }

    #[test]
    fn item_cap_is_one_hundred() {
        let mut d = MemoryDigest::new("s", "ci", 100_000).expect("digest");
        for i in 0..MAX_ITEMS {
            d.add_item(MemoryKind::Fact, format!("i{i}"), "ci")
                .expect("under cap");
        }
        let err = d
            .add_item(MemoryKind::Fact, "one too many", "ci")
            .expect_err("101st item");
        assert!(matches!(err, MemoryError::QueueFull("items")));
        assert_eq!(d.item_count(), MAX_ITEMS);
    }

    #[test]
    fn breadcrumb_cap_is_twenty() {
        let mut d = digest();
        for i in 0..MAX_BREADCRUMBS {
            d.add_breadcrumb(format!("step {i}")).expect("under cap");
        }
        let err = d.add_breadcrumb("step 20").expect_err("21st breadcrumb");
        assert!(matches!(err, MemoryError::QueueFull("breadcrumbs")));
    }

    #[test]
    fn select_item_updates_access_metadata() {
        let mut d = digest();
        let id = d.add_item(MemoryKind::Decision, "use serde", "alpha").expect("add");
        let item = d.select_item(id).expect("found");
        assert_eq!(item.relevance.access_count, 1);
        let item = d.select_item(id).expect("found again");
        assert_eq!(item.relevance.access_count, 2);
        assert!(matches!(
            d.select_item(9999).expect_err("unknown id"),
            MemoryError::NotFound(9999)
        ));
    }

    #[test]
    fn suggest_by_type_orders_by_score() {
        let mut d = digest();
        let a = d.add_item(MemoryKind::Fact, "a", "ci").expect("a");
        let b = d.add_item(MemoryKind::Fact, "b", "ci").expect("b");
        d.add_item(MemoryKind::Decision, "d", "ci").expect("d");
        d.update_relevance(a, 0.2).expect("score a");
        d.update_relevance(b, 0.9).expect("score b");
        let suggested = d.suggest_by_type(MemoryKind::Fact, 10);
        assert_eq!(suggested.len(), 2);
        assert_eq!(suggested[0].content, "b");
        assert_eq!(suggested[1].content, "a");
        assert_eq!(d.suggest_by_type(MemoryKind::Fact, 1).len(), 1);
    }

    #[test]
    fn decay_skips_important_items() {
        let mut d = digest();
        let a = d.add_item(MemoryKind::Fact, "a", "ci").expect("a");
        let b = d.add_item(MemoryKind::Fact, "b", "ci").expect("b");
        d.mark_important(b).expect("mark");
        d.decay(0.5);
        assert_eq!(d.select_item(a).expect("a").relevance.score, 0.5);
        assert_eq!(d.select_item(b).expect("b").relevance.score, 1.0);
    }

    #[test]
    fn sunset_counts_against_budget() {
        let mut d = digest();
        d.add_item(MemoryKind::Fact, "x".repeat(60), "ci").expect("add");
        let err = d
            .set_sunset_notes("y".repeat(50))
            .expect_err("60 + 50 over budget");
        assert!(matches!(err, MemoryError::TooLarge { .. }));
        assert!(d.sunset_notes().is_none());
        d.set_sunset_notes("y".repeat(40)).expect("fits");
        assert_eq!(d.size(), 100);
        // Replacing the notes releases the old allocation first.
        d.set_sunset_notes("z".repeat(40)).expect("replace fits");
        assert_eq!(d.size(), 100);
    }

    #[test]
    fn json_shape_round_trips() {
        let mut d = digest();
        d.add_breadcrumb("parsed config").expect("crumb");
        d.add_breadcrumb("wrote tests").expect("crumb");
        d.add_item(MemoryKind::Fact, "not in shape", "ci").expect("add");
        let json = d.to_json();
        assert_eq!(json["item_count"], 1);
        let back = MemoryDigest::from_json(&json, 200).expect("parse");
        assert_eq!(back.session_id(), "s-1");
        assert_eq!(back.ci_name(), "alpha");
        assert_eq!(back.created(), d.created());
        assert_eq!(back.breadcrumbs(), d.breadcrumbs());
    }

    #[test]
    fn from_json_rejects_missing_fields() {
        let err = MemoryDigest::from_json(&serde_json::json!({"ci_name": "x"}), 200)
            .expect_err("missing session_id");
        assert!(matches!(err, MemoryError::Corrupt(_)));
    }

    #[test]
    fn file_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("digest.json");
        let mut d = digest();
        d.add_breadcrumb("one").expect("crumb");
        d.save_to_file(&path).expect("save");
        let back = MemoryDigest::load_from_file(&path, 200).expect("load");
        assert_eq!(back.breadcrumbs(), &["one".to_string()]);
    }

    #[test]
    fn augment_prompt_renders_all_sections() {
        let mut d = MemoryDigest::new("s", "ci", 4096).expect("digest");
        d.set_sunset_notes("finished the lexer").expect("sunset");
        d.set_sunrise_brief("today: the parser").expect("sunrise");
        d.add_breadcrumb("lexer done").expect("crumb");
        d.add_item(MemoryKind::Decision, "tokens are owned", "ci").expect("add");
        let prompt = d.augment_prompt("write the parser");
        let sunset = prompt.find("## Previous Session Summary").expect("sunset section");
        let sunrise = prompt.find("## Session Context").expect("sunrise section");
        let crumbs = prompt.find("## Progress Breadcrumbs").expect("crumbs section");
        let context = prompt.find("## Relevant Context").expect("context section");
        let task = prompt.find("## Current Task").expect("task section");
        assert!(sunset < sunrise && sunrise < crumbs && crumbs < context && context < task);
        assert!(prompt.contains("- [decision] tokens are owned"));
        assert!(prompt.ends_with("write the parser"));
    }

    #[test]
    fn augment_prompt_empty_digest_is_just_the_task() {
        let d = MemoryDigest::new("s", "ci", 4096).expect("digest");
        assert_eq!(d.augment_prompt("do it"), "## Current Task\ndo it");
    }
}

#![deny(missing_docs)]
//! # ensemble-memory — bounded per-session memory
//!
//! A [`MemoryDigest`] is the working memory a CI carries through a
//! session: typed items, short progress breadcrumbs, and the
//! sunset/sunrise notes that hand context from one session to the next.
//!
//! The digest is hard-capped at half its model's context window. Every
//! mutation is checked against the cap first; a mutation that would
//! violate it fails without touching the digest. The stable JSON shape
//! (`session_id`, `ci_name`, `created`, `item_count`, `breadcrumbs`)
//! round-trips through [`MemoryDigest::to_json`] / [`MemoryDigest::from_json`]
//! and the file helpers.
//!
//! Providers consume a digest through the
//! [`ContextSource`](ensemble_types::ContextSource) seam: the digest
//! renders a fixed-shape context block ahead of the current task.

mod digest;
mod item;

pub use digest::{MemoryDigest, MAX_BREADCRUMBS, MAX_ITEMS};
pub use item::{MemoryItem, MemoryKind, Relevance};

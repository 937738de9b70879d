//! The canonical inter-CI message shape.
//!
//! Serialization is canonical: required fields are always present,
//! optional fields are emitted only when set, and `metadata` is omitted
//! entirely when both of its sub-fields are absent. Deserialization is
//! strict on required fields and tolerant of unknown fields.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::BusError;

/// Optional delivery hints attached to a message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageMetadata {
    /// Delivery priority label ("high", "normal", ...). Free-form.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
    /// Per-request timeout in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl MessageMetadata {
    /// Whether both sub-fields are absent (the metadata object is omitted).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.priority.is_none() && self.timeout_ms.is_none()
    }
}

/// One addressed CI→CI message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CiMessage {
    /// Sender name.
    pub from: String,
    /// Recipient name.
    pub to: String,
    /// Unix seconds at submission.
    pub timestamp: i64,
    /// Message kind ("task", "status", "heartbeat", ...). Free-form.
    #[serde(rename = "type")]
    pub kind: String,
    /// Message payload.
    pub content: String,
    /// Correlates a request/response exchange.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    /// Delivery hints; omitted when empty.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MessageMetadata>,
}

impl CiMessage {
    /// Create a message stamped with the current time.
    #[must_use]
    pub fn new(
        from: impl Into<String>,
        to: impl Into<String>,
        kind: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            timestamp: Utc::now().timestamp(),
            kind: kind.into(),
            content: content.into(),
            thread_id: None,
            metadata: None,
        }
    }

    /// Attach a thread id.
    #[must_use]
    pub fn with_thread_id(mut self, thread_id: impl Into<String>) -> Self {
        self.thread_id = Some(thread_id.into());
        self
    }

    /// Attach a priority hint, materializing metadata.
    #[must_use]
    pub fn with_priority(mut self, priority: impl Into<String>) -> Self {
        self.metadata
            .get_or_insert_with(MessageMetadata::default)
            .priority = Some(priority.into());
        self
    }

    /// Attach a per-request timeout, materializing metadata.
    #[must_use]
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.metadata
            .get_or_insert_with(MessageMetadata::default)
            .timeout_ms = Some(timeout_ms);
        self
    }

    /// Serialize to the canonical JSON form.
    pub fn to_json(&self) -> Result<String, BusError> {
        serde_json::to_string(self).map_err(|e| BusError::Serialization(e.to_string()))
    }

    /// Parse from JSON. Strict on required fields, tolerant of unknown
    /// fields.
    pub fn from_json(json: &str) -> Result<Self, BusError> {
        serde_json::from_str(json).map_err(|e| BusError::Serialization(e.to_string()))
    }
}

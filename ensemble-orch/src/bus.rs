//! The message-bus contract: transport hand-off and pending-request
//! tracking.
//!
//! The real socket transport is an external collaborator with its own
//! event loop; this module defines what the core needs from it and
//! provides [`LocalTransport`] for in-process use. Delivery is
//! at-most-once: the transport either accepts a message or reports an
//! error, and nothing retries.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use ensemble_types::{BusError, CiMessage};
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Cap on simultaneously outstanding requests.
pub const MAX_PENDING_REQUESTS: usize = 50;

/// Generate a fresh request id.
#[must_use]
pub fn new_request_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Hands a message to the bus.
///
/// `deliver` enqueues and returns — it must not block on the recipient.
/// Messages from one sender to one recipient are delivered in submission
/// order; nothing is guaranteed across senders.
pub trait BusTransport: Send + Sync {
    /// Accept one message for delivery to `message.to`.
    fn deliver(&self, message: &CiMessage) -> Result<(), BusError>;
}

/// In-process transport over unbounded mpsc mailboxes.
///
/// Each recipient registers a mailbox and drains it at its own pace.
/// Suitable for tests and single-process deployments.
#[derive(Default)]
pub struct LocalTransport {
    mailboxes: Mutex<HashMap<String, mpsc::UnboundedSender<CiMessage>>>,
}

impl LocalTransport {
    /// Create a transport with no mailboxes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a mailbox for `name`, replacing any previous one.
    pub fn register(&self, name: impl Into<String>) -> mpsc::UnboundedReceiver<CiMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.mailboxes.lock().insert(name.into(), tx);
        rx
    }

    /// Drop the mailbox for `name`. Unknown names are ignored.
    pub fn unregister(&self, name: &str) {
        self.mailboxes.lock().remove(name);
    }
}

impl BusTransport for LocalTransport {
    fn deliver(&self, message: &CiMessage) -> Result<(), BusError> {
        let mailboxes = self.mailboxes.lock();
        let sender = mailboxes
            .get(&message.to)
            .ok_or_else(|| BusError::Disconnected(message.to.clone()))?;
        sender
            .send(message.clone())
            .map_err(|_| BusError::Disconnected(message.to.clone()))
    }
}

/// Key identifying one outstanding request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey {
    /// Requesting CI.
    pub from: String,
    /// Responding CI.
    pub to: String,
    /// Caller-supplied request id (see [`new_request_id`]).
    pub request_id: String,
}

struct PendingEntry {
    deadline: DateTime<Utc>,
    waiter: oneshot::Sender<Result<CiMessage, BusError>>,
}

/// Tracks outstanding request/response exchanges.
///
/// At most one request may be outstanding per key, the table holds at
/// most [`MAX_PENDING_REQUESTS`] entries, and every entry is discarded at
/// its deadline with a timeout delivered to the waiter. Completion is
/// at-most-once: a response for an unknown or expired key is dropped.
pub struct PendingRequests {
    capacity: usize,
    timeout: Duration,
    entries: HashMap<RequestKey, PendingEntry>,
}

impl PendingRequests {
    /// Create a tracker with the default cap and timeout.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(MAX_PENDING_REQUESTS, DEFAULT_REQUEST_TIMEOUT)
    }

    /// Create a tracker with an explicit cap and per-request timeout.
    #[must_use]
    pub fn with_capacity(capacity: usize, timeout: Duration) -> Self {
        Self {
            capacity,
            timeout,
            entries: HashMap::new(),
        }
    }

    /// Number of outstanding requests.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no requests are outstanding.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Begin tracking a request. The returned receiver resolves with the
    /// response, or with [`BusError::Timeout`] when the deadline passes.
    pub fn track(
        &mut self,
        key: RequestKey,
        now: DateTime<Utc>,
    ) -> Result<oneshot::Receiver<Result<CiMessage, BusError>>, BusError> {
        if self.entries.contains_key(&key) {
            return Err(BusError::Duplicate(key.request_id));
        }
        if self.entries.len() >= self.capacity {
            return Err(BusError::QueueFull);
        }
        let (tx, rx) = oneshot::channel();
        let deadline = now
            + chrono::Duration::from_std(self.timeout)
                .unwrap_or_else(|_| chrono::Duration::seconds(30));
        self.entries.insert(
            key,
            PendingEntry {
                deadline,
                waiter: tx,
            },
        );
        Ok(rx)
    }

    /// Complete a request with its response. Returns `false` when the key
    /// is unknown (already completed or expired) — the response is dropped.
    pub fn complete(&mut self, key: &RequestKey, response: CiMessage) -> bool {
        match self.entries.remove(key) {
            Some(entry) => {
                // The waiter may have gone away; that still counts as done.
                let _ = entry.waiter.send(Ok(response));
                true
            }
            None => false,
        }
    }

    /// Discard every request whose deadline has passed, delivering a
    /// timeout to its waiter. Returns how many were discarded.
    pub fn expire(&mut self, now: DateTime<Utc>) -> usize {
        let overdue: Vec<RequestKey> = self
            .entries
            .iter()
            .filter(|(_, entry)| now >= entry.deadline)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &overdue {
            if let Some(entry) = self.entries.remove(key) {
                tracing::debug!(request_id = %key.request_id, "request expired");
                let _ = entry.waiter.send(Err(BusError::Timeout(self.timeout)));
            }
        }
        overdue.len()
    }
}

impl Default for PendingRequests {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

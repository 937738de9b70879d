//! Error types for each protocol area.
//!
//! One enum per area, never a god-enum: callers match on the kinds their
//! layer can act on and forward the rest. No global error state — every
//! failure is returned to the caller that triggered it.

use std::time::Duration;
use thiserror::Error;

/// Errors from provider backends (remote HTTP, local daemon, subprocess,
/// file-mediated, mock).
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ProviderError {
    // Retryable errors
    /// Network-level error (connection reset, DNS failure, etc.).
    #[error("network error: {0}")]
    Network(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Rate limited by the provider.
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimit {
        /// Suggested retry delay, if the API provided one.
        retry_after: Option<Duration>,
    },

    /// The operation did not finish within its configured timeout.
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    /// Provider service is temporarily unavailable (5xx).
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    // Terminal errors
    /// Authentication failure (401).
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Authorization failure (403).
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Malformed or invalid request (400).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Endpoint or model not found (404).
    #[error("not found: {0}")]
    NotFound(String),

    /// Any other non-success HTTP status.
    #[error("http status {status}: {body}")]
    Http {
        /// The HTTP status code.
        status: u16,
        /// The response body, verbatim, for caller-side logging.
        body: String,
    },

    /// The response body did not match the expected shape.
    #[error("malformed response: {0}")]
    Format(String),

    /// The response exceeded the instance's buffer cap.
    #[error("response too large: {0} bytes")]
    TooLarge(usize),

    /// An input value was rejected before any request was made.
    #[error("invalid value: {0}")]
    InvalidValue(String),

    /// The operation is not implemented by this provider.
    #[error("{0} not supported by this provider")]
    NotSupported(String),

    /// A subprocess CI exited with a non-zero status.
    #[error("assistant exited with status {code}")]
    Confused {
        /// The child's exit code.
        code: i32,
    },

    /// Spawning or supervising a subprocess failed.
    #[error("process error: {0}")]
    Process(String),

    /// I/O error from pipes, sockets, or session files.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Catch-all. Include context.
    #[error(transparent)]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

impl ProviderError {
    /// Whether this error is likely transient and the request can be retried.
    ///
    /// The core never retries; this is advice for the caller.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Network(_)
                | Self::RateLimit { .. }
                | Self::Timeout(_)
                | Self::ServiceUnavailable(_)
        )
    }
}

/// Errors from bounded memory digest operations.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum MemoryError {
    /// The mutation would push the digest past its size cap.
    #[error("digest over capacity: {size} > {max} bytes")]
    TooLarge {
        /// Size the digest would have after the mutation.
        size: usize,
        /// The digest's hard cap (half the context limit).
        max: usize,
    },

    /// A fixed-capacity list (items or breadcrumbs) is full.
    #[error("{0} at capacity")]
    QueueFull(&'static str),

    /// A relevance score outside [0.0, 1.0].
    #[error("relevance score out of range: {0}")]
    OutOfRange(f64),

    /// An input value was rejected.
    #[error("invalid value: {0}")]
    InvalidValue(String),

    /// No item with the given id.
    #[error("no memory item with id {0}")]
    NotFound(u64),

    /// Persisted digest could not be parsed.
    #[error("corrupt digest: {0}")]
    Corrupt(String),

    /// I/O error during file round-trip.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from registry operations.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum RegistryError {
    /// A CI with this name is already registered.
    #[error("duplicate name: {0}")]
    Duplicate(String),

    /// The name exceeds the registry's length limit.
    #[error("name too long: {0}")]
    NameTooLong(String),

    /// No entry with the given name.
    #[error("unknown ci: {0}")]
    NotFound(String),

    /// The port is already assigned to another entry.
    #[error("port {0} in use")]
    PortInUse(u16),

    /// The registry or a role's port range is full.
    #[error("{0} at capacity")]
    QueueFull(&'static str),

    /// The recipient cannot receive messages in its current state.
    #[error("ci disconnected: {0}")]
    Disconnected(String),

    /// Delivery failed in the bus transport.
    #[error("bus error: {0}")]
    Bus(#[from] BusError),

    /// No recipient accepted a broadcast.
    #[error("broadcast reached no recipients")]
    NoRecipients,
}

/// Errors from the lifecycle supervisor.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// No lifecycle entry with the given name.
    #[error("unknown ci: {0}")]
    NotFound(String),

    /// A CI with this name already has a lifecycle entry.
    #[error("duplicate ci: {0}")]
    Duplicate(String),

    /// The operation is not valid in the CI's current status.
    #[error("ci {name} is {status}, operation requires {required}")]
    CiInvalid {
        /// The CI's name.
        name: String,
        /// The status it is in.
        status: crate::CiStatus,
        /// The status the operation requires.
        required: &'static str,
    },
}

/// Errors from the message bus contract.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum BusError {
    /// The pending-request table is at capacity.
    #[error("pending request table full")]
    QueueFull,

    /// A request with this key is already outstanding.
    #[error("request already pending: {0}")]
    Duplicate(String),

    /// The request was discarded after its timeout.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The recipient has no live mailbox.
    #[error("no route to {0}")]
    Disconnected(String),

    /// The transport failed to accept the message.
    #[error("transport error: {0}")]
    Transport(String),

    /// Message could not be serialized or deserialized.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Errors from merge negotiation.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum MergeError {
    /// A negotiation is already active for this session.
    #[error("merge negotiation already active")]
    AlreadyActive,

    /// No negotiation is active.
    #[error("no active merge negotiation")]
    NotActive,

    /// No conflict with the given id.
    #[error("unknown conflict: {0}")]
    UnknownConflict(u64),

    /// The negotiation still has unresolved conflicts.
    #[error("negotiation incomplete: {unresolved} conflict(s) unresolved")]
    Incomplete {
        /// How many conflicts lack an accepted resolution.
        unresolved: usize,
    },
}

/// Errors from the orchestrator facade.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum OrchError {
    /// `start_workflow` was called while the workflow is running.
    #[error("workflow already running")]
    WorkflowRunning,

    /// The operation requires a running workflow.
    #[error("workflow not running")]
    WorkflowNotRunning,

    /// `advance_phase` was called past the final phase.
    #[error("workflow has no further phases")]
    WorkflowComplete,

    /// The named CI has no bound provider.
    #[error("no provider bound for ci: {0}")]
    NoProvider(String),

    /// A registry operation failed.
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    /// A lifecycle operation failed.
    #[error("lifecycle error: {0}")]
    Lifecycle(#[from] LifecycleError),

    /// A merge operation failed.
    #[error("merge error: {0}")]
    Merge(#[from] MergeError),

    /// A provider operation failed.
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Catch-all. Include context.
    #[error(transparent)]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_retryable_split() {
        assert!(ProviderError::RateLimit { retry_after: None }.is_retryable());
        assert!(ProviderError::Timeout(Duration::from_secs(30)).is_retryable());
        assert!(ProviderError::ServiceUnavailable("overloaded".into()).is_retryable());
        assert!(!ProviderError::Authentication("bad key".into()).is_retryable());
        assert!(!ProviderError::Confused { code: 2 }.is_retryable());
        assert!(!ProviderError::Format("truncated".into()).is_retryable());
    }

    #[test]
    fn confused_display_carries_exit_code() {
        assert_eq!(
            ProviderError::Confused { code: 3 }.to_string(),
            "assistant exited with status 3"
        );
    }

    #[test]
    fn memory_too_large_display() {
        let err = MemoryError::TooLarge { size: 110, max: 100 };
        assert_eq!(err.to_string(), "digest over capacity: 110 > 100 bytes");
    }

    #[test]
    fn orch_error_wraps_registry_error() {
        let err: OrchError = RegistryError::NotFound("alpha".into()).into();
        assert!(matches!(err, OrchError::Registry(_)));
    }
}

//! The Provider protocol — the uniform contract over CI backends.

use crate::error::ProviderError;
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Longest model identifier a provider instance accepts.
pub const MAX_MODEL_LEN: usize = 63;

/// One answered query from a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    /// The extracted response content. Non-empty on success.
    pub content: String,
    /// The model that produced the content.
    pub model: String,
    /// Unix seconds when the response was committed.
    pub timestamp: i64,
}

impl QueryResponse {
    /// Create a response stamped with the current time.
    #[must_use]
    pub fn new(content: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            model: model.into(),
            timestamp: Utc::now().timestamp(),
        }
    }
}

/// A source of session context that can be prepended to prompts.
///
/// This is the seam between providers and the bounded memory digest: a
/// provider that supports memory holds a [`SharedContext`] and calls
/// [`ContextSource::augment`] before each query. The digest crate
/// implements this; providers never depend on it directly.
pub trait ContextSource: Send {
    /// Build the full augmented prompt for `task`.
    ///
    /// Returns `task` verbatim when the source has nothing to add.
    fn augment(&self, task: &str) -> String;
}

/// A context source shared between its owner and a bound provider.
///
/// The digest stays single-owner in spirit: the owner mutates it, the
/// provider only reads through [`ContextSource::augment`]. The mutex
/// serializes the two.
pub type SharedContext = Arc<Mutex<dyn ContextSource>>;

/// Wrap a context source for sharing with a provider.
pub fn shared_context<S: ContextSource + 'static>(source: S) -> SharedContext {
    Arc::new(Mutex::new(source))
}

impl std::fmt::Debug for dyn Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("dyn Provider")
            .field("name", &self.name())
            .field("model", &self.model())
            .finish()
    }
}

/// Protocol — the Provider contract.
///
/// Every backend implements the same five operations: `init`, `connect`,
/// `query`, `stream`, `cleanup`. Calling code doesn't know which backend
/// is behind the trait — `query` might be an HTTPS round-trip, a local
/// daemon call, or a child process reading stdin.
///
/// ## Contract
///
/// - `query` resolves exactly once per call: either `Ok` with non-empty
///   content, or an error. There is no third path.
/// - `supports_streaming` is `true` iff `stream` is implemented; the
///   default `stream` returns [`ProviderError::NotSupported`].
/// - `cleanup` is idempotent: the second call is a no-op.
#[async_trait]
pub trait Provider: Send {
    /// Short provider name ("claude", "ollama", ...).
    fn name(&self) -> &str;

    /// The model this instance queries.
    fn model(&self) -> &str;

    /// Whether [`Provider::stream`] is implemented.
    fn supports_streaming(&self) -> bool {
        false
    }

    /// Whether this provider consumes a bound memory digest.
    fn supports_memory(&self) -> bool {
        false
    }

    /// Maximum context window, in tokens.
    fn max_context(&self) -> usize;

    /// One-time instance initialization. Idempotent.
    async fn init(&mut self) -> Result<(), ProviderError> {
        Ok(())
    }

    /// Establish or verify connectivity to the backend.
    async fn connect(&mut self) -> Result<(), ProviderError> {
        Ok(())
    }

    /// Answer one prompt.
    async fn query(&mut self, prompt: &str) -> Result<QueryResponse, ProviderError>;

    /// Answer one prompt, emitting content chunks as they arrive.
    ///
    /// `on_chunk` is called zero or more times before the final response
    /// resolves. Backends without native streaming may emit the full
    /// content as a single chunk.
    async fn stream(
        &mut self,
        prompt: &str,
        on_chunk: &mut (dyn for<'chunk> FnMut(&'chunk str) + Send),
    ) -> Result<QueryResponse, ProviderError> {
        let _ = (prompt, on_chunk);
        Err(ProviderError::NotSupported("streaming".into()))
    }

    /// Release long-lived resources. Idempotent; callers invoke it once.
    async fn cleanup(&mut self) -> Result<(), ProviderError> {
        Ok(())
    }

    /// Bind a memory context to this instance.
    ///
    /// Returns `false` when the provider does not support memory; the
    /// context is dropped in that case.
    fn bind_memory(&mut self, context: SharedContext) -> bool {
        let _ = context;
        false
    }
}

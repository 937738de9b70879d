//! File-mediated provider: a human operator relays prompts by hand.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use ensemble_types::{Provider, ProviderError, QueryResponse, SharedContext};

/// How often the response file is polled.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// How long to wait for the operator before giving up.
pub const DEFAULT_FILE_TIMEOUT: Duration = Duration::from_secs(300);

/// Env var naming the runtime's root directory for session files.
pub const ENSEMBLE_ROOT: &str = "ENSEMBLE_ROOT";

/// The default session directory: `$ENSEMBLE_ROOT/sessions` when the
/// root is set, the system temp directory otherwise.
#[must_use]
pub fn default_session_dir() -> PathBuf {
    match std::env::var_os(ENSEMBLE_ROOT) {
        Some(root) => PathBuf::from(root).join("sessions"),
        None => std::env::temp_dir().join("ensemble-sessions"),
    }
}

/// Provider mediated through a pair of session files.
///
/// `query` writes the prompt to `<session>.prompt` under the session
/// directory, prints a banner telling the operator where to write the
/// answer, and polls once per second for `<session>.response`. Both files
/// are removed on completion and on every failure path, so a session
/// directory never accumulates stale exchanges.
///
/// `stream` additionally watches the response file grow, emitting each
/// appended region as a chunk; the operator signals completion by
/// creating `<session>.done`.
pub struct FileCliProvider {
    session_dir: PathBuf,
    session_id: String,
    poll_interval: Duration,
    timeout: Duration,
    context: Option<SharedContext>,
    query_count: u64,
}

impl FileCliProvider {
    /// Create a provider exchanging files under `session_dir`.
    #[must_use]
    pub fn new(session_dir: impl Into<PathBuf>) -> Self {
        Self {
            session_dir: session_dir.into(),
            session_id: uuid::Uuid::new_v4().to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_FILE_TIMEOUT,
            context: None,
            query_count: 0,
        }
    }

    /// Create a provider under [`default_session_dir`].
    #[must_use]
    pub fn from_env() -> Self {
        Self::new(default_session_dir())
    }

    /// Override the generated session id.
    #[must_use]
    pub fn session_id(mut self, id: impl Into<String>) -> Self {
        self.session_id = id.into();
        self
    }

    /// Override the poll cadence.
    #[must_use]
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Override the operator timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Path the prompt is written to.
    #[must_use]
    pub fn prompt_path(&self) -> PathBuf {
        self.session_dir.join(format!("{}.prompt", self.session_id))
    }

    /// Path the operator writes the response to.
    #[must_use]
    pub fn response_path(&self) -> PathBuf {
        self.session_dir
            .join(format!("{}.response", self.session_id))
    }

    /// Marker file ending a streamed exchange.
    #[must_use]
    pub fn done_path(&self) -> PathBuf {
        self.session_dir.join(format!("{}.done", self.session_id))
    }

    /// How many exchanges have completed on this instance.
    #[must_use]
    pub fn query_count(&self) -> u64 {
        self.query_count
    }

    fn augmented(&self, prompt: &str) -> String {
        match &self.context {
            Some(ctx) => ctx.lock().augment(prompt),
            None => prompt.to_string(),
        }
    }

    async fn write_prompt(&self, prompt: &str) -> Result<(), ProviderError> {
        tokio::fs::create_dir_all(&self.session_dir).await?;
        tokio::fs::write(self.prompt_path(), prompt).await?;
        println!(
            "── operator action required ──────────────────────────────\n\
             prompt : {}\n\
             respond: {}\n\
             waiting up to {}s…",
            self.prompt_path().display(),
            self.response_path().display(),
            self.timeout.as_secs(),
        );
        Ok(())
    }

    /// Remove every session file that exists. Errors other than
    /// not-found are ignored; cleanup must never mask the real outcome.
    async fn remove_session_files(&self) {
        for path in [self.prompt_path(), self.response_path(), self.done_path()] {
            let _ = tokio::fs::remove_file(path).await;
        }
    }
}

#[async_trait]
impl Provider for FileCliProvider {
    fn name(&self) -> &str {
        "file-cli"
    }

    fn model(&self) -> &str {
        "operator"
    }

    fn supports_streaming(&self) -> bool {
        true
    }

    fn supports_memory(&self) -> bool {
        true
    }

    fn max_context(&self) -> usize {
        200_000
    }

    async fn query(&mut self, prompt: &str) -> Result<QueryResponse, ProviderError> {
        let final_prompt = self.augmented(prompt);
        self.write_prompt(&final_prompt).await?;

        let started = tokio::time::Instant::now();
        let response_path = self.response_path();
        loop {
            if tokio::fs::try_exists(&response_path).await.unwrap_or(false) {
                let content = tokio::fs::read_to_string(&response_path).await?;
                self.remove_session_files().await;
                self.query_count += 1;
                return Ok(QueryResponse {
                    content,
                    model: "operator".into(),
                    timestamp: Utc::now().timestamp(),
                });
            }
            if started.elapsed() >= self.timeout {
                self.remove_session_files().await;
                return Err(ProviderError::Timeout(self.timeout));
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn stream(
        &mut self,
        prompt: &str,
        on_chunk: &mut (dyn for<'chunk> FnMut(&'chunk str) + Send),
    ) -> Result<QueryResponse, ProviderError> {
        let final_prompt = self.augmented(prompt);
        self.write_prompt(&final_prompt).await?;

        let started = tokio::time::Instant::now();
        let response_path = self.response_path();
        let done_path = self.done_path();
        let mut content = String::new();
        loop {
            if tokio::fs::try_exists(&response_path).await.unwrap_or(false) {
                let full = tokio::fs::read_to_string(&response_path).await?;
                if full.len() > content.len() {
                    let appended = full[content.len()..].to_string();
                    on_chunk(&appended);
                    content = full;
                }
            }
            if tokio::fs::try_exists(&done_path).await.unwrap_or(false) {
                self.remove_session_files().await;
                self.query_count += 1;
                return Ok(QueryResponse {
                    content,
                    model: "operator".into(),
                    timestamp: Utc::now().timestamp(),
                });
            }
            if started.elapsed() >= self.timeout {
                self.remove_session_files().await;
                return Err(ProviderError::Timeout(self.timeout));
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Remove any session files still on disk. Idempotent.
    async fn cleanup(&mut self) -> Result<(), ProviderError> {
        self.remove_session_files().await;
        self.context = None;
        Ok(())
    }

    fn bind_memory(&mut self, context: SharedContext) -> bool {
        self.context = Some(context);
        true
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

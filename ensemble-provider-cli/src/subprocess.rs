//! Child-process provider: one spawn per query.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use ensemble_types::{Provider, ProviderError, QueryResponse, SharedContext};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Default per-query timeout for subprocess assistants.
pub const DEFAULT_CLI_TIMEOUT: Duration = Duration::from_secs(300);

/// Locate `binary` on the `PATH`.
#[must_use]
pub fn find_in_path(binary: &str) -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(binary))
        .find(|candidate| candidate.is_file())
}

/// Provider backed by a CLI assistant run as a child process.
///
/// Every query spawns a fresh child: the augmented prompt is piped to its
/// stdin, stdin is closed to signal end of input, stdout is read to EOF,
/// and the exit status is checked. The child is not kept alive between
/// queries; `kill_on_drop` guarantees teardown on every exit path,
/// including timeout and caller cancellation.
pub struct CliProvider {
    binary: String,
    args: Vec<String>,
    model_label: String,
    timeout: Duration,
    context: Option<SharedContext>,
    query_count: u64,
}

impl CliProvider {
    /// Create a provider running `binary` per query.
    #[must_use]
    pub fn new(binary: impl Into<String>) -> Self {
        let binary = binary.into();
        Self {
            model_label: binary.clone(),
            binary,
            args: Vec::new(),
            timeout: DEFAULT_CLI_TIMEOUT,
            context: None,
            query_count: 0,
        }
    }

    /// Arguments passed to the assistant on every spawn.
    #[must_use]
    pub fn args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// Label reported as the instance's model.
    #[must_use]
    pub fn model_label(mut self, label: impl Into<String>) -> Self {
        self.model_label = label.into();
        self
    }

    /// Override the per-query timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// How many queries have succeeded on this instance.
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

    async fn run_once(&self, prompt: &str) -> Result<String, ProviderError> {
        let mut child = Command::new(&self.binary)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ProviderError::Process(format!("spawn {}: {e}", self.binary)))?;

        {
            // Write the prompt and drop the handle so the child sees EOF.
            let mut stdin = child
                .stdin
                .take()
                .ok_or_else(|| ProviderError::Process("child stdin not captured".into()))?;
            stdin.write_all(prompt.as_bytes()).await?;
            stdin.shutdown().await?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| ProviderError::Process(format!("wait {}: {e}", self.binary)))?;

        if !output.status.success() {
            let code = output.status.code().unwrap_or(-1);
            tracing::warn!(
                binary = %self.binary,
                code,
                stderr = %String::from_utf8_lossy(&output.stderr),
                "assistant exited non-zero"
            );
            return Err(ProviderError::Confused { code });
        }

        String::from_utf8(output.stdout)
            .map_err(|e| ProviderError::Format(format!("non-UTF-8 output: {e}")))
    }
}

#[async_trait]
impl Provider for CliProvider {
    fn name(&self) -> &str {
        &self.binary
    }

    fn model(&self) -> &str {
        &self.model_label
    }

    fn supports_memory(&self) -> bool {
        true
    }

    fn max_context(&self) -> usize {
        200_000
    }

    /// Verify the assistant binary is on the PATH.
    async fn connect(&mut self) -> Result<(), ProviderError> {
        match find_in_path(&self.binary) {
            Some(path) => {
                tracing::debug!(binary = %self.binary, path = %path.display(), "assistant found");
                Ok(())
            }
            None => Err(ProviderError::Process(format!(
                "{} not found on PATH",
                self.binary
            ))),
        }
    }

    async fn query(&mut self, prompt: &str) -> Result<QueryResponse, ProviderError> {
        let final_prompt = self.augmented(prompt);

        let content = tokio::time::timeout(self.timeout, self.run_once(&final_prompt))
            .await
            .map_err(|_| ProviderError::Timeout(self.timeout))??;

        self.query_count += 1;
        Ok(QueryResponse {
            content,
            model: self.model_label.clone(),
            timestamp: Utc::now().timestamp(),
        })
    }

    async fn cleanup(&mut self) -> Result<(), ProviderError> {
        self.context = None;
        Ok(())
    }

    fn bind_memory(&mut self, context: SharedContext) -> bool {
        self.context = Some(context);
        true
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

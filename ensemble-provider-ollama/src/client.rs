//! Daemon provider struct and builder.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use ensemble_types::{Provider, ProviderError, QueryResponse, SharedContext};

use crate::streaming::consume_ndjson;

/// Default model used when none is specified.
const DEFAULT_MODEL: &str = "llama3.2";

/// Default daemon host.
const DEFAULT_HOST: &str = "127.0.0.1";

/// Default daemon port.
pub const DEFAULT_PORT: u16 = 11434;

/// Default per-query timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Provider backed by a local model daemon.
///
/// # Example
///
/// ```no_run
/// use ensemble_provider_ollama::OllamaProvider;
///
/// let provider = OllamaProvider::new()
///     .model("llama3.2")
///     .port(11434);
/// ```
pub struct OllamaProvider {
    model: String,
    host: String,
    port: u16,
    timeout: Duration,
    client: reqwest::Client,
    context: Option<SharedContext>,
    query_count: u64,
}

impl OllamaProvider {
    /// Create a provider with the daemon defaults: `127.0.0.1:11434`,
    /// model `llama3.2`, 60 s timeout, no authentication.
    #[must_use]
    pub fn new() -> Self {
        Self {
            model: DEFAULT_MODEL.into(),
            host: DEFAULT_HOST.into(),
            port: DEFAULT_PORT,
            timeout: DEFAULT_TIMEOUT,
            client: reqwest::Client::new(),
            context: None,
            query_count: 0,
        }
    }

    /// Override the model.
    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Override the daemon host.
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Override the daemon port.
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Override the per-query timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Build the generate endpoint URL.
    pub(crate) fn generate_url(&self) -> String {
        format!("http://{}:{}/api/generate", self.host, self.port)
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

    fn request_body(&self, prompt: &str, stream: bool) -> serde_json::Value {
        serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "stream": stream,
        })
    }
}

impl Default for OllamaProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Provider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn supports_streaming(&self) -> bool {
        true
    }

    fn supports_memory(&self) -> bool {
        true
    }

    fn max_context(&self) -> usize {
        32_768
    }

    /// Probe the daemon's TCP port. The probe connection is dropped
    /// immediately; queries open their own connections.
    async fn connect(&mut self) -> Result<(), ProviderError> {
        let addr = format!("{}:{}", self.host, self.port);
        let probe = tokio::time::timeout(self.timeout, tokio::net::TcpStream::connect(&addr));
        match probe.await {
            Ok(Ok(_stream)) => {
                tracing::debug!(addr = %addr, "daemon reachable");
                Ok(())
            }
            Ok(Err(e)) => Err(ProviderError::Network(Box::new(e))),
            Err(_) => Err(ProviderError::Timeout(self.timeout)),
        }
    }

    async fn query(&mut self, prompt: &str) -> Result<QueryResponse, ProviderError> {
        let final_prompt = self.augmented(prompt);
        let body = self.request_body(&final_prompt, false);
        let url = self.generate_url();

        tracing::debug!(url = %url, model = %self.model, "sending generate request");

        let send = self.client.post(&url).json(&body).send();
        let response = tokio::time::timeout(self.timeout, send)
            .await
            .map_err(|_| ProviderError::Timeout(self.timeout))?
            .map_err(|e| ProviderError::Network(Box::new(e)))?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| ProviderError::Network(Box::new(e)))?;

        if !(200..300).contains(&status) {
            return Err(ProviderError::Http { status, body: text });
        }

        let json: serde_json::Value = serde_json::from_str(&text)
            .map_err(|e| ProviderError::Format(format!("invalid JSON response: {e}")))?;
        let content = json["response"]
            .as_str()
            .ok_or_else(|| ProviderError::Format("missing response field".into()))?
            .to_string();

        self.query_count += 1;
        Ok(QueryResponse {
            content,
            model: self.model.clone(),
            timestamp: Utc::now().timestamp(),
        })
    }

    async fn stream(
        &mut self,
        prompt: &str,
        on_chunk: &mut (dyn for<'chunk> FnMut(&'chunk str) + Send),
    ) -> Result<QueryResponse, ProviderError> {
        let final_prompt = self.augmented(prompt);
        let body = self.request_body(&final_prompt, true);
        let url = self.generate_url();

        tracing::debug!(url = %url, model = %self.model, "sending streaming generate request");

        let send = self.client.post(&url).json(&body).send();
        let response = tokio::time::timeout(self.timeout, send)
            .await
            .map_err(|_| ProviderError::Timeout(self.timeout))?
            .map_err(|e| ProviderError::Network(Box::new(e)))?;

        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            let text = response
                .text()
                .await
                .map_err(|e| ProviderError::Network(Box::new(e)))?;
            return Err(ProviderError::Http { status, body: text });
        }

        let content =
            tokio::time::timeout(self.timeout, consume_ndjson(response, on_chunk))
                .await
                .map_err(|_| ProviderError::Timeout(self.timeout))??;

        self.query_count += 1;
        Ok(QueryResponse {
            content,
            model: self.model.clone(),
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_daemon() {
        let p = OllamaProvider::new();
        assert_eq!(p.model, DEFAULT_MODEL);
        assert_eq!(p.host, DEFAULT_HOST);
        assert_eq!(p.port, DEFAULT_PORT);
        assert_eq!(p.timeout, DEFAULT_TIMEOUT);
    }

    #[test]
    fn builder_overrides() {
        let p = OllamaProvider::new()
            .model("mistral")
            .host("10.0.0.2")
            .port(12000)
            .timeout(Duration::from_secs(5));
        assert_eq!(p.model, "mistral");
        assert_eq!(p.generate_url(), "http://10.0.0.2:12000/api/generate");
        assert_eq!(p.timeout, Duration::from_secs(5));
    }

    #[test]
    fn default_impl_matches_new() {
        let p = OllamaProvider::default();
        assert_eq!(p.generate_url(), "http://127.0.0.1:11434/api/generate");
    }

    #[test]
    fn request_body_shape() {
        let p = OllamaProvider::new();
        let body = p.request_body("hi", false);
        assert_eq!(body["model"], "llama3.2");
        assert_eq!(body["prompt"], "hi");
        assert_eq!(body["stream"], false);
    }

    #[tokio::test]
    async fn connect_fails_fast_when_daemon_absent() {
        // Port 9 (discard) is almost certainly closed; the probe must
        // return an error, not hang.
        let mut p = OllamaProvider::new()
            .port(9)
            .timeout(Duration::from_millis(500));
        let err = p.connect().await.expect_err("nothing listens on :9");
        assert!(matches!(
            err,
            ProviderError::Network(_) | ProviderError::Timeout(_)
        ));
    }
}

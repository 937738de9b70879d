//! MockProvider — a scripted Provider for deterministic tests.

use crate::error::ProviderError;
use crate::provider::{Provider, QueryResponse, SharedContext};
use async_trait::async_trait;

/// A provider that returns configured responses without any backend.
///
/// Responses cycle: with three configured responses the fourth query
/// returns the first again. The last prompt and a query count are
/// recorded for assertions. An error message can be scripted instead,
/// making every query fail.
pub struct MockProvider {
    name: String,
    model: String,
    responses: Vec<String>,
    next: usize,
    fail_with: Option<String>,
    context: Option<SharedContext>,
    /// The most recent prompt passed to `query` or `stream`.
    pub last_prompt: Option<String>,
    /// How many times `query` or `stream` has been called.
    pub query_count: u64,
    /// How many times `cleanup` has been called.
    pub cleanup_count: u64,
}

impl MockProvider {
    /// Create a mock with a single fixed response.
    #[must_use]
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            name: "mock".into(),
            model: "mock-model".into(),
            responses: vec![response.into()],
            next: 0,
            fail_with: None,
            context: None,
            last_prompt: None,
            query_count: 0,
            cleanup_count: 0,
        }
    }

    /// Create a mock that cycles through `responses`. An empty list
    /// behaves like a single empty response.
    #[must_use]
    pub fn with_responses(responses: Vec<String>) -> Self {
        let mut mock = Self::new("");
        if !responses.is_empty() {
            mock.responses = responses;
        }
        mock
    }

    /// Create a mock whose every query fails with an invalid-request error.
    #[must_use]
    pub fn failing(message: impl Into<String>) -> Self {
        let mut mock = Self::new("");
        mock.fail_with = Some(message.into());
        mock
    }

    /// Override the reported model.
    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    fn answer(&mut self, prompt: &str) -> Result<QueryResponse, ProviderError> {
        self.query_count += 1;
        let rendered = match &self.context {
            Some(ctx) => ctx.lock().augment(prompt),
            None => prompt.to_string(),
        };
        self.last_prompt = Some(rendered);
        if let Some(message) = &self.fail_with {
            return Err(ProviderError::InvalidRequest(message.clone()));
        }
        let content = self.responses[self.next % self.responses.len()].clone();
        self.next += 1;
        Ok(QueryResponse::new(content, self.model.clone()))
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn name(&self) -> &str {
        &self.name
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
        8192
    }

    async fn query(&mut self, prompt: &str) -> Result<QueryResponse, ProviderError> {
        self.answer(prompt)
    }

    async fn stream(
        &mut self,
        prompt: &str,
        on_chunk: &mut (dyn for<'chunk> FnMut(&'chunk str) + Send),
    ) -> Result<QueryResponse, ProviderError> {
        let response = self.answer(prompt)?;
        on_chunk(&response.content);
        Ok(response)
    }

    async fn cleanup(&mut self) -> Result<(), ProviderError> {
        self.cleanup_count += 1;
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
    use crate::provider::ContextSource;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[tokio::test]
    async fn fixed_response_and_counters() {
        let mut mock = MockProvider::new("OK");
        let resp = mock.query("hello").await.expect("scripted success");
        assert_eq!(resp.content, "OK");
        assert_eq!(mock.query_count, 1);
        assert_eq!(mock.last_prompt.as_deref(), Some("hello"));
    }

    #[tokio::test]
    async fn responses_cycle() {
        let mut mock = MockProvider::with_responses(vec!["a".into(), "b".into()]);
        assert_eq!(mock.query("1").await.expect("a").content, "a");
        assert_eq!(mock.query("2").await.expect("b").content, "b");
        assert_eq!(mock.query("3").await.expect("a again").content, "a");
    }

    #[tokio::test]
    async fn failing_mock_always_errors() {
        let mut mock = MockProvider::failing("scripted");
        let err = mock.query("x").await.expect_err("scripted failure");
        assert!(matches!(err, ProviderError::InvalidRequest(_)));
        assert_eq!(mock.query_count, 1);
    }

    #[tokio::test]
    async fn stream_emits_one_chunk() {
        let mut mock = MockProvider::new("chunked");
        let mut chunks = Vec::new();
        let resp = mock
            .stream("x", &mut |c: &str| chunks.push(c.to_string()))
            .await
            .expect("stream");
        assert_eq!(chunks, vec!["chunked".to_string()]);
        assert_eq!(resp.content, "chunked");
    }

    #[tokio::test]
    async fn bound_context_augments_prompt() {
        struct Prefix;
        impl ContextSource for Prefix {
            fn augment(&self, task: &str) -> String {
                format!("ctx\n{task}")
            }
        }
        let mut mock = MockProvider::new("OK");
        assert!(mock.bind_memory(Arc::new(Mutex::new(Prefix))));
        mock.query("task").await.expect("ok");
        assert_eq!(mock.last_prompt.as_deref(), Some("ctx\ntask"));
    }

    #[tokio::test]
    async fn cleanup_is_idempotent() {
        let mut mock = MockProvider::new("OK");
        mock.cleanup().await.expect("first");
        mock.cleanup().await.expect("second");
        assert_eq!(mock.cleanup_count, 2);
    }
}

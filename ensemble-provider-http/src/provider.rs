//! The generic remote provider instance.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use ensemble_types::{Provider, ProviderError, QueryResponse, SharedContext, MAX_MODEL_LEN};

use crate::adapter::{extract_string_by_path, map_http_status, post_json};
use crate::config::ProviderConfig;

/// Hard cap on a single committed response.
pub const MAX_RESPONSE_BYTES: usize = 4 * 1024 * 1024;

/// Headroom reserved beyond the committed content when the response
/// buffer grows.
pub const RESPONSE_HEADROOM: usize = 1024;

/// A provider instance speaking one vendor's dialect, as described by its
/// [`ProviderConfig`].
///
/// The instance keeps a reusable response buffer: it grows with
/// [`RESPONSE_HEADROOM`] slack as larger responses arrive and is only
/// committed on success — a failed query leaves the previous response
/// readable.
pub struct HttpProvider {
    config: Arc<ProviderConfig>,
    model: String,
    client: reqwest::Client,
    response: String,
    query_count: u64,
    last_query_at: Option<i64>,
    context: Option<SharedContext>,
    initialized: bool,
}

impl std::fmt::Debug for HttpProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpProvider")
            .field("model", &self.model)
            .field("response", &self.response)
            .field("query_count", &self.query_count)
            .field("last_query_at", &self.last_query_at)
            .field("initialized", &self.initialized)
            .finish()
    }
}

impl HttpProvider {
    /// Build an instance from `config`, optionally overriding the model.
    ///
    /// Fails when the model id exceeds [`MAX_MODEL_LEN`] characters.
    pub fn generic_create(
        config: Arc<ProviderConfig>,
        model_override: Option<&str>,
    ) -> Result<Self, ProviderError> {
        let model = model_override
            .map(str::to_owned)
            .unwrap_or_else(|| config.default_model.clone());
        if model.is_empty() || model.len() > MAX_MODEL_LEN {
            return Err(ProviderError::InvalidValue(format!(
                "model id must be 1..={MAX_MODEL_LEN} chars: {model:?}"
            )));
        }
        Ok(Self {
            config,
            model,
            client: reqwest::Client::new(),
            response: String::new(),
            query_count: 0,
            last_query_at: None,
            context: None,
            initialized: false,
        })
    }

    /// The most recently committed response content.
    #[must_use]
    pub fn last_response(&self) -> &str {
        &self.response
    }

    /// How many queries have succeeded on this instance.
    #[must_use]
    pub fn query_count(&self) -> u64 {
        self.query_count
    }

    /// Unix seconds of the last successful query.
    #[must_use]
    pub fn last_query_at(&self) -> Option<i64> {
        self.last_query_at
    }

    /// The request URL for the current model.
    fn request_url(&self) -> String {
        if self.config.url_includes_model {
            format!("{}/{}:generateContent", self.config.endpoint, self.model)
        } else {
            self.config.endpoint.clone()
        }
    }

    fn augmented(&self, prompt: &str) -> String {
        match &self.context {
            Some(ctx) => ctx.lock().augment(prompt),
            None => prompt.to_string(),
        }
    }

    fn commit(&mut self, content: &str) {
        self.response.clear();
        if self.response.capacity() < content.len() {
            self.response.reserve(content.len() + RESPONSE_HEADROOM);
        }
        self.response.push_str(content);
    }
}

#[async_trait]
impl Provider for HttpProvider {
    fn name(&self) -> &str {
        self.config.name
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn supports_streaming(&self) -> bool {
        self.config.supports_streaming
    }

    fn supports_memory(&self) -> bool {
        true
    }

    fn max_context(&self) -> usize {
        self.config.max_context
    }

    async fn init(&mut self) -> Result<(), ProviderError> {
        if !self.initialized {
            self.response.reserve(RESPONSE_HEADROOM);
            self.initialized = true;
        }
        Ok(())
    }

    // Remote vendors are connectionless from the instance's perspective.

    async fn query(&mut self, prompt: &str) -> Result<QueryResponse, ProviderError> {
        let final_prompt = self.augmented(prompt);
        let body = (self.config.request_builder)(&self.model, &final_prompt);
        let url = self.request_url();

        let reply = post_json(
            &self.client,
            &url,
            &body,
            &self.config.auth,
            &self.config.extra_headers,
        )
        .await?;

        if let Some(err) = map_http_status(reply.status, &reply.body) {
            tracing::warn!(
                provider = self.config.name,
                status = reply.status,
                body = %reply.body,
                "provider returned error status"
            );
            return Err(err);
        }

        let content = extract_string_by_path(reply.body.as_bytes(), &self.config.response_path)?;
        if content.len() > MAX_RESPONSE_BYTES {
            return Err(ProviderError::TooLarge(content.len()));
        }

        self.commit(&content);
        self.query_count += 1;
        let now = Utc::now().timestamp();
        self.last_query_at = Some(now);

        tracing::debug!(
            provider = self.config.name,
            model = %self.model,
            bytes = content.len(),
            "query succeeded"
        );

        Ok(QueryResponse {
            content,
            model: self.model.clone(),
            timestamp: now,
        })
    }

    /// Streaming by delegation: one full query, one chunk.
    async fn stream(
        &mut self,
        prompt: &str,
        on_chunk: &mut (dyn for<'chunk> FnMut(&'chunk str) + Send),
    ) -> Result<QueryResponse, ProviderError> {
        if !self.supports_streaming() {
            return Err(ProviderError::NotSupported("streaming".into()));
        }
        let response = self.query(prompt).await?;
        on_chunk(&response.content);
        Ok(response)
    }

    async fn cleanup(&mut self) -> Result<(), ProviderError> {
        self.response = String::new();
        self.context = None;
        self.initialized = false;
        Ok(())
    }

    fn bind_memory(&mut self, context: SharedContext) -> bool {
        self.context = Some(context);
        true
    }
}

//! Per-vendor provider configuration.

use serde_json::Value;

/// Builds a vendor request body from (model, prompt).
pub type RequestBuilder = fn(model: &str, prompt: &str) -> Value;

/// Where and how a vendor expects its credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Auth {
    /// `Authorization: Bearer <token>`.
    Bearer {
        /// The credential value.
        token: String,
    },
    /// A custom header, e.g. `x-api-key`.
    Header {
        /// Header name.
        name: String,
        /// The credential value.
        value: String,
    },
    /// A URL query parameter appended as `?<name>=<value>`. The endpoint
    /// URL must not already carry a query string.
    UrlParam {
        /// Parameter name.
        name: String,
        /// The credential value.
        value: String,
    },
}

impl Auth {
    /// The credential value, whichever placement carries it.
    #[must_use]
    pub fn credential(&self) -> &str {
        match self {
            Auth::Bearer { token } => token,
            Auth::Header { value, .. } | Auth::UrlParam { value, .. } => value,
        }
    }
}

/// Everything the generic HTTP provider needs to speak one vendor's
/// dialect. Immutable after construction; shared by `Arc` so one config
/// can back any number of provider instances.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Short provider name ("claude", "openai", ...).
    pub name: &'static str,
    /// Model used when no override is given.
    pub default_model: String,
    /// Endpoint URL, without trailing slash or query string.
    pub endpoint: String,
    /// Whether the model id is appended to the URL
    /// (`/<model>:generateContent`, the Gemini convention).
    pub url_includes_model: bool,
    /// Credential placement.
    pub auth: Auth,
    /// Extra header pairs appended, in order, after the auth header.
    pub extra_headers: Vec<(String, String)>,
    /// Ordered key path at which the response content string is found.
    pub response_path: Vec<String>,
    /// Vendor request body builder.
    pub request_builder: RequestBuilder,
    /// Whether the vendor supports streaming. The generic provider
    /// streams by single-chunk delegation either way.
    pub supports_streaming: bool,
    /// Maximum context window, in tokens.
    pub max_context: usize,
}

impl ProviderConfig {
    /// Create a config with no extra headers and streaming enabled.
    #[must_use]
    pub fn new(
        name: &'static str,
        default_model: impl Into<String>,
        endpoint: impl Into<String>,
        auth: Auth,
        response_path: Vec<String>,
        request_builder: RequestBuilder,
        max_context: usize,
    ) -> Self {
        Self {
            name,
            default_model: default_model.into(),
            endpoint: endpoint.into(),
            url_includes_model: false,
            auth,
            extra_headers: Vec::new(),
            response_path,
            request_builder,
            supports_streaming: true,
            max_context,
        }
    }

    /// Append an extra header pair.
    #[must_use]
    pub fn with_extra_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.push((name.into(), value.into()));
        self
    }

    /// Append the model id to the request URL (Gemini-style endpoints).
    #[must_use]
    pub fn with_url_includes_model(mut self) -> Self {
        self.url_includes_model = true;
        self
    }

    /// Whether the configured credential looks usable: non-empty and at
    /// least 10 characters. Absent or truncated env credentials make the
    /// vendor report as unavailable rather than failing at query time.
    #[must_use]
    pub fn is_available(&self) -> bool {
        let credential = self.auth.credential();
        !credential.is_empty() && credential.len() >= 10
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(_model: &str, _prompt: &str) -> Value {
        Value::Null
    }

    fn config_with(auth: Auth) -> ProviderConfig {
        ProviderConfig::new(
            "test",
            "m",
            "https://example.test/v1",
            auth,
            vec!["content".into()],
            body,
            4096,
        )
    }

    #[test]
    fn credential_reaches_through_every_placement() {
        assert_eq!(Auth::Bearer { token: "t".into() }.credential(), "t");
        assert_eq!(
            Auth::Header {
                name: "x-api-key".into(),
                value: "v".into()
            }
            .credential(),
            "v"
        );
        assert_eq!(
            Auth::UrlParam {
                name: "key".into(),
                value: "u".into()
            }
            .credential(),
            "u"
        );
    }

    #[test]
    fn short_credential_is_unavailable() {
        assert!(!config_with(Auth::Bearer { token: String::new() }).is_available());
        assert!(!config_with(Auth::Bearer { token: "short".into() }).is_available());
        assert!(config_with(Auth::Bearer {
            token: "long-enough-credential".into()
        })
        .is_available());
        // Exactly 10 characters is the floor.
        assert!(config_with(Auth::Bearer { token: "0123456789".into() }).is_available());
    }

    #[test]
    fn builder_appends_headers_in_order() {
        let config = config_with(Auth::Bearer { token: "t".into() })
            .with_extra_header("a", "1")
            .with_extra_header("b", "2");
        assert_eq!(config.extra_headers[0].0, "a");
        assert_eq!(config.extra_headers[1].0, "b");
    }
}

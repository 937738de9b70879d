//! Vendor presets for the generic HTTP provider.
//!
//! Each preset reads its credential from the vendor's conventional
//! environment variable at construction time. A missing or truncated
//! credential does not fail construction — the config simply reports as
//! unavailable through [`ProviderConfig::is_available`].

use serde_json::Value;

use crate::config::{Auth, ProviderConfig};

/// Env var carrying the Anthropic credential.
pub const ANTHROPIC_API_KEY: &str = "ANTHROPIC_API_KEY";
/// Env var carrying the OpenAI credential.
pub const OPENAI_API_KEY: &str = "OPENAI_API_KEY";
/// Env var carrying the Gemini credential.
pub const GEMINI_API_KEY: &str = "GEMINI_API_KEY";
/// Env var carrying the xAI credential.
pub const XAI_API_KEY: &str = "XAI_API_KEY";
/// Env var carrying the DeepSeek credential.
pub const DEEPSEEK_API_KEY: &str = "DEEPSEEK_API_KEY";

/// Default max_tokens requested from vendors that require the field.
const DEFAULT_MAX_TOKENS: u32 = 4096;

fn env_credential(name: &str) -> String {
    std::env::var(name).unwrap_or_default()
}

/// Anthropic Messages API body.
pub fn anthropic_body(model: &str, prompt: &str) -> Value {
    serde_json::json!({
        "model": model,
        "max_tokens": DEFAULT_MAX_TOKENS,
        "messages": [{ "role": "user", "content": prompt }],
    })
}

/// OpenAI-compatible chat completions body (also xAI and DeepSeek).
pub fn openai_body(model: &str, prompt: &str) -> Value {
    serde_json::json!({
        "model": model,
        "messages": [{ "role": "user", "content": prompt }],
    })
}

/// Gemini generateContent body. The model rides in the URL, not the body.
pub fn gemini_body(_model: &str, prompt: &str) -> Value {
    serde_json::json!({
        "contents": [{ "parts": [{ "text": prompt }] }],
    })
}

/// Anthropic Claude via the Messages API.
#[must_use]
pub fn claude() -> ProviderConfig {
    ProviderConfig::new(
        "claude",
        "claude-sonnet-4-20250514",
        "https://api.anthropic.com/v1/messages",
        Auth::Header {
            name: "x-api-key".into(),
            value: env_credential(ANTHROPIC_API_KEY),
        },
        vec!["content".into(), "text".into()],
        anthropic_body,
        200_000,
    )
    .with_extra_header("anthropic-version", "2023-06-01")
}

/// OpenAI chat completions.
#[must_use]
pub fn openai() -> ProviderConfig {
    ProviderConfig::new(
        "openai",
        "gpt-4o",
        "https://api.openai.com/v1/chat/completions",
        Auth::Bearer {
            token: env_credential(OPENAI_API_KEY),
        },
        vec!["choices".into(), "message".into(), "content".into()],
        openai_body,
        128_000,
    )
}

/// Google Gemini generateContent. The model id is appended to the URL and
/// the credential rides as a query parameter.
#[must_use]
pub fn gemini() -> ProviderConfig {
    ProviderConfig::new(
        "gemini",
        "gemini-2.0-flash",
        "https://generativelanguage.googleapis.com/v1beta/models",
        Auth::UrlParam {
            name: "key".into(),
            value: env_credential(GEMINI_API_KEY),
        },
        vec![
            "candidates".into(),
            "content".into(),
            "parts".into(),
            "text".into(),
        ],
        gemini_body,
        1_000_000,
    )
    .with_url_includes_model()
}

/// xAI Grok via the OpenAI-compatible endpoint.
#[must_use]
pub fn grok() -> ProviderConfig {
    ProviderConfig::new(
        "grok",
        "grok-3",
        "https://api.x.ai/v1/chat/completions",
        Auth::Bearer {
            token: env_credential(XAI_API_KEY),
        },
        vec!["choices".into(), "message".into(), "content".into()],
        openai_body,
        131_072,
    )
}

/// DeepSeek via the OpenAI-compatible endpoint.
#[must_use]
pub fn deepseek() -> ProviderConfig {
    ProviderConfig::new(
        "deepseek",
        "deepseek-chat",
        "https://api.deepseek.com/chat/completions",
        Auth::Bearer {
            token: env_credential(DEEPSEEK_API_KEY),
        },
        vec!["choices".into(), "message".into(), "content".into()],
        openai_body,
        64_000,
    )
}

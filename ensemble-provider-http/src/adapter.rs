//! The HTTP-JSON adapter: one POST, one extracted string.

use std::time::Duration;

use ensemble_types::ProviderError;
use serde_json::Value;

use crate::config::Auth;

/// A completed HTTP exchange. The body is carried even for non-2xx
/// statuses so callers can log vendor error payloads.
#[derive(Debug, Clone)]
pub struct HttpReply {
    /// The HTTP status code.
    pub status: u16,
    /// The full response body.
    pub body: String,
}

/// POST `body` as JSON to `url` with the vendor's auth placement and
/// extra headers.
///
/// Transport failures (DNS, connect, read) return an error; any HTTP
/// status, success or not, returns a reply. Status interpretation is
/// [`map_http_status`]'s job.
pub async fn post_json(
    client: &reqwest::Client,
    url: &str,
    body: &Value,
    auth: &Auth,
    extra_headers: &[(String, String)],
) -> Result<HttpReply, ProviderError> {
    let url = match auth {
        // The config contract guarantees the endpoint has no query string.
        Auth::UrlParam { name, value } => format!("{url}?{name}={value}"),
        _ => url.to_string(),
    };

    let mut request = client.post(&url).json(body);
    match auth {
        Auth::Bearer { token } => {
            request = request.header("authorization", format!("Bearer {token}"));
        }
        Auth::Header { name, value } => {
            request = request.header(name.as_str(), value.as_str());
        }
        Auth::UrlParam { .. } => {}
    }
    for (name, value) in extra_headers {
        request = request.header(name.as_str(), value.as_str());
    }

    tracing::debug!(url = %url, "posting provider request");

    let response = request.send().await.map_err(map_reqwest_error)?;
    let status = response.status().as_u16();
    let body = response.text().await.map_err(map_reqwest_error)?;
    Ok(HttpReply { status, body })
}

/// Map a non-success HTTP status to its error kind. Returns `None` for
/// 2xx statuses.
#[must_use]
pub fn map_http_status(status: u16, body: &str) -> Option<ProviderError> {
    match status {
        200..=299 => None,
        400 => Some(ProviderError::InvalidRequest(body.to_string())),
        401 => Some(ProviderError::Authentication(body.to_string())),
        403 => Some(ProviderError::Forbidden(body.to_string())),
        404 => Some(ProviderError::NotFound(body.to_string())),
        429 => Some(ProviderError::RateLimit { retry_after: None }),
        500..=599 => Some(ProviderError::ServiceUnavailable(body.to_string())),
        other => Some(ProviderError::Http {
            status: other,
            body: body.to_string(),
        }),
    }
}

/// Map a [`reqwest::Error`] to a [`ProviderError`].
fn map_reqwest_error(err: reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Timeout(Duration::from_secs(30))
    } else {
        ProviderError::Network(Box::new(err))
    }
}

/// Return the string found by walking `path` through the JSON in `bytes`.
///
/// Each key indexes into an object; when a step lands on an array the
/// walk descends into its first element before applying the key — the
/// common shape of provider content lists
/// (`{"content":[{"text":"..."}]}`). Malformed JSON, a missing key, an
/// empty array, or a non-string terminal all fail with
/// [`ProviderError::Format`].
pub fn extract_string_by_path(bytes: &[u8], path: &[String]) -> Result<String, ProviderError> {
    let root: Value = serde_json::from_slice(bytes)
        .map_err(|e| ProviderError::Format(format!("invalid JSON response: {e}")))?;
    let mut current = &root;
    for key in path {
        while let Some(array) = current.as_array() {
            current = array
                .first()
                .ok_or_else(|| ProviderError::Format(format!("empty array before key {key:?}")))?;
        }
        current = current
            .get(key)
            .ok_or_else(|| ProviderError::Format(format!("key {key:?} not found")))?;
    }
    while let Some(array) = current.as_array() {
        current = array
            .first()
            .ok_or_else(|| ProviderError::Format("empty array at path terminal".into()))?;
    }
    current
        .as_str()
        .map(str::to_owned)
        .ok_or_else(|| ProviderError::Format("path terminal is not a string".into()))
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn path(keys: &[&str]) -> Vec<String> {
        keys.iter().map(|k| (*k).to_string()).collect()
    }

    #[test]
    fn extracts_through_content_list() {
        let body = br#"{"content":[{"text":"OK"}]}"#;
        let out = extract_string_by_path(body, &path(&["content", "text"])).expect("extract");
        assert_eq!(out, "OK");
    }

    #[test]
    fn extracts_openai_shape() {
        let body = br#"{"choices":[{"message":{"role":"assistant","content":"hi"}}]}"#;
        let out = extract_string_by_path(body, &path(&["choices", "message", "content"]))
            .expect("extract");
        assert_eq!(out, "hi");
    }

    #[test]
    fn extracts_gemini_shape() {
        let body =
            br#"{"candidates":[{"content":{"parts":[{"text":"pong"}],"role":"model"}}]}"#;
        let out = extract_string_by_path(
            body,
            &path(&["candidates", "content", "parts", "text"]),
        )
        .expect("extract");
        assert_eq!(out, "pong");
    }

    #[test]
    fn escaped_quotes_survive_extraction() {
        let body = br#"{"content":[{"text":"say \"hi\" twice"}]}"#;
        let out = extract_string_by_path(body, &path(&["content", "text"])).expect("extract");
        assert_eq!(out, "say \"hi\" twice");
    }

    #[test]
    fn missing_key_is_a_format_error() {
        let body = br#"{"content":[{"text":"OK"}]}"#;
        let err = extract_string_by_path(body, &path(&["content", "missing"]))
            .expect_err("key absent");
        assert!(matches!(err, ProviderError::Format(_)));
    }

    #[test]
    fn non_string_terminal_is_a_format_error() {
        let body = br#"{"count": 3}"#;
        let err = extract_string_by_path(body, &path(&["count"])).expect_err("not a string");
        assert!(matches!(err, ProviderError::Format(_)));
    }

    #[test]
    fn malformed_json_is_a_format_error() {
        let err = extract_string_by_path(b"{truncated", &path(&["x"])).expect_err("bad JSON");
        assert!(matches!(err, ProviderError::Format(_)));
    }

    #[test]
    fn empty_array_is_a_format_error() {
        let body = br#"{"content":[]}"#;
        let err = extract_string_by_path(body, &path(&["content", "text"]))
            .expect_err("nothing to descend into");
        assert!(matches!(err, ProviderError::Format(_)));
    }

    #[test]
    fn status_mapping_covers_the_taxonomy() {
        assert!(map_http_status(200, "").is_none());
        assert!(map_http_status(204, "").is_none());
        assert!(matches!(
            map_http_status(400, "bad"),
            Some(ProviderError::InvalidRequest(_))
        ));
        assert!(matches!(
            map_http_status(401, "no"),
            Some(ProviderError::Authentication(_))
        ));
        assert!(matches!(
            map_http_status(403, "no"),
            Some(ProviderError::Forbidden(_))
        ));
        assert!(matches!(
            map_http_status(404, "gone"),
            Some(ProviderError::NotFound(_))
        ));
        assert!(matches!(
            map_http_status(429, "rate"),
            Some(ProviderError::RateLimit { .. })
        ));
        assert!(matches!(
            map_http_status(500, "boom"),
            Some(ProviderError::ServiceUnavailable(_))
        ));
        assert!(matches!(
            map_http_status(529, "overloaded"),
            Some(ProviderError::ServiceUnavailable(_))
        ));
        assert!(matches!(
            map_http_status(302, "moved"),
            Some(ProviderError::Http { status: 302, .. })
        ));
    }

    #[test]
    fn non_success_mapping_keeps_the_body() {
        match map_http_status(418, "teapot body") {
            Some(ProviderError::Http { status, body }) => {
                assert_eq!(status, 418);
                assert_eq!(body, "teapot body");
            }
            other => panic!("expected Http error, got {other:?}"),
        }
    }
}

//! NDJSON stream consumption for the daemon's generate API.
//!
//! The daemon emits one JSON object per line. Each object's `response`
//! field is a content chunk; an object with `"done":true` ends the
//! stream. Lines may be split across transport chunks, so a line buffer
//! carries partial lines between reads.

use ensemble_types::ProviderError;
use futures::StreamExt;

/// Drive a streaming response to completion, invoking `on_chunk` for each
/// non-empty `response` field. Returns the accumulated content.
pub(crate) async fn consume_ndjson(
    response: reqwest::Response,
    on_chunk: &mut (dyn for<'chunk> FnMut(&'chunk str) + Send),
) -> Result<String, ProviderError> {
    let mut byte_stream = response.bytes_stream();
    let mut parser = NdjsonParser::new();
    let mut line_buf = String::new();

    while let Some(chunk_result) = byte_stream.next().await {
        let chunk = chunk_result.map_err(|e| ProviderError::Network(Box::new(e)))?;
        let chunk_str = std::str::from_utf8(&chunk)
            .map_err(|e| ProviderError::Format(format!("UTF-8 decode error: {e}")))?;

        line_buf.push_str(chunk_str);

        while let Some(newline_pos) = line_buf.find('\n') {
            let line = line_buf[..newline_pos].trim_end_matches('\r').to_string();
            line_buf.drain(..=newline_pos);

            if line.trim().is_empty() {
                continue;
            }
            if parser.process_line(&line, on_chunk)? {
                return Ok(parser.into_content());
            }
        }
    }

    // Process any remaining content in the buffer.
    let remaining = line_buf.trim().to_string();
    if !remaining.is_empty() {
        parser.process_line(&remaining, on_chunk)?;
    }

    if parser.done {
        Ok(parser.into_content())
    } else {
        Err(ProviderError::Format(
            "stream ended without a done marker".into(),
        ))
    }
}

/// Tracks accumulated content and completion across NDJSON lines.
struct NdjsonParser {
    content: String,
    done: bool,
}

impl NdjsonParser {
    fn new() -> Self {
        Self {
            content: String::new(),
            done: false,
        }
    }

    /// Process one line. Returns `Ok(true)` when the done marker was seen.
    fn process_line(
        &mut self,
        line: &str,
        on_chunk: &mut (dyn for<'chunk> FnMut(&'chunk str) + Send),
    ) -> Result<bool, ProviderError> {
        let json: serde_json::Value = serde_json::from_str(line)
            .map_err(|e| ProviderError::Format(format!("JSON parse error in NDJSON: {e}")))?;

        if let Some(piece) = json["response"].as_str() {
            if !piece.is_empty() {
                self.content.push_str(piece);
                on_chunk(piece);
            }
        }

        if json["done"].as_bool().unwrap_or(false) {
            self.done = true;
        }
        Ok(self.done)
    }

    fn into_content(self) -> String {
        self.content
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(parser: &mut NdjsonParser, line: &str) -> (Vec<String>, bool) {
        let mut chunks = Vec::new();
        let done = parser
            .process_line(line, &mut |c: &str| chunks.push(c.to_string()))
            .expect("valid line");
        (chunks, done)
    }

    #[test]
    fn chunks_accumulate_in_order() {
        let mut parser = NdjsonParser::new();
        let (chunks, done) =
            collect(&mut parser, r#"{"model":"llama3.2","response":"Hello","done":false}"#);
        assert_eq!(chunks, vec!["Hello".to_string()]);
        assert!(!done);
        let (chunks, done) =
            collect(&mut parser, r#"{"model":"llama3.2","response":" world","done":false}"#);
        assert_eq!(chunks, vec![" world".to_string()]);
        assert!(!done);
        assert_eq!(parser.content, "Hello world");
    }

    #[test]
    fn done_marker_ends_the_stream() {
        let mut parser = NdjsonParser::new();
        collect(&mut parser, r#"{"response":"Hi","done":false}"#);
        let (chunks, done) = collect(&mut parser, r#"{"response":"","done":true}"#);
        assert!(chunks.is_empty(), "empty final response emits no chunk");
        assert!(done);
        assert_eq!(parser.into_content(), "Hi");
    }

    #[test]
    fn final_line_may_carry_content() {
        let mut parser = NdjsonParser::new();
        let (chunks, done) = collect(&mut parser, r#"{"response":"all at once","done":true}"#);
        assert_eq!(chunks, vec!["all at once".to_string()]);
        assert!(done);
    }

    #[test]
    fn missing_done_field_is_not_done() {
        let mut parser = NdjsonParser::new();
        let (_, done) = collect(&mut parser, r#"{"response":"Hi"}"#);
        assert!(!done);
    }

    #[test]
    fn invalid_json_is_a_format_error() {
        let mut parser = NdjsonParser::new();
        let err = parser
            .process_line("{invalid", &mut |_c: &str| {})
            .expect_err("bad line");
        assert!(matches!(err, ProviderError::Format(_)));
    }
}

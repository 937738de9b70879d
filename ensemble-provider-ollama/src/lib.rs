#![deny(missing_docs)]
//! # ensemble-provider-ollama — the local daemon provider
//!
//! Talks to a locally running model daemon over its HTTP generate API.
//! `connect` is a plain TCP probe of the daemon's port; each query opens
//! its own connection and the connection is never reused.
//!
//! Streaming uses the daemon's NDJSON format — one JSON object per line,
//! the `response` field of each object emitted as a chunk, terminated by
//! an object with `"done":true`:
//!
//! ```text
//! {"model":"llama3.2","response":"Hello","done":false}
//! {"model":"llama3.2","response":" world","done":false}
//! {"model":"llama3.2","response":"","done":true,"total_duration":5000000000}
//! ```

mod client;
mod streaming;

pub use client::{OllamaProvider, DEFAULT_PORT, DEFAULT_TIMEOUT};

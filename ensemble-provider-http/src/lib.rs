#![deny(missing_docs)]
//! # ensemble-provider-http — the generic remote provider
//!
//! One [`HttpProvider`] implementation serves every remote HTTP-JSON
//! vendor. The differences between vendors live entirely in a
//! [`ProviderConfig`] value: endpoint, authentication placement, request
//! body shape, and the ordered key path at which the response content
//! string is found.
//!
//! ```no_run
//! use ensemble_provider_http::{presets, HttpProvider};
//! use std::sync::Arc;
//!
//! let config = Arc::new(presets::claude());
//! let provider = HttpProvider::generic_create(config, None).expect("valid model");
//! ```

mod adapter;
mod config;
pub mod presets;
mod provider;

pub use adapter::{extract_string_by_path, map_http_status, post_json, HttpReply};
pub use config::{Auth, ProviderConfig, RequestBuilder};
pub use provider::{HttpProvider, MAX_RESPONSE_BYTES, RESPONSE_HEADROOM};

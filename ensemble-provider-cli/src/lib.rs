#![deny(missing_docs)]
//! # ensemble-provider-cli — CLI-mediated providers
//!
//! Two providers back a CI with a command-line assistant instead of an
//! API:
//!
//! - [`CliProvider`] runs the assistant as a child process per query: the
//!   augmented prompt goes in on stdin, the answer comes back on stdout,
//!   and a non-zero exit surfaces as [`ProviderError::Confused`].
//! - [`FileCliProvider`] mediates through a pair of session files for
//!   assistants a human operator drives by hand: the prompt is written to
//!   a file, the provider polls for the paired response file, and both
//!   files are removed on completion.
//!
//! [`ProviderError::Confused`]: ensemble_types::ProviderError::Confused

mod file_session;
mod subprocess;

pub use file_session::{
    default_session_dir, FileCliProvider, DEFAULT_FILE_TIMEOUT, DEFAULT_POLL_INTERVAL,
    ENSEMBLE_ROOT,
};
pub use subprocess::{find_in_path, CliProvider, DEFAULT_CLI_TIMEOUT};

//! Deterministic test doubles for the Provider protocol.

mod mock_provider;

pub use mock_provider::MockProvider;

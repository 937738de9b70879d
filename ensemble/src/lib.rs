#![deny(missing_docs)]
//! # ensemble — umbrella crate
//!
//! Provides a single import surface for the ensemble runtime. Re-exports
//! the workspace crates behind feature flags, plus a `prelude` for the
//! happy path.

#[cfg(feature = "core")]
pub use ensemble_memory;
#[cfg(feature = "orch")]
pub use ensemble_orch;
#[cfg(feature = "provider-cli")]
pub use ensemble_provider_cli;
#[cfg(feature = "provider-http")]
pub use ensemble_provider_http;
#[cfg(feature = "provider-ollama")]
pub use ensemble_provider_ollama;
#[cfg(feature = "runtime")]
pub use ensemble_runtime;
#[cfg(feature = "core")]
pub use ensemble_types;

/// Happy-path imports for composing ensemble systems.
pub mod prelude {
    #[cfg(feature = "core")]
    pub use ensemble_types::{
        shared_context, BusError, CiMessage, CiStatus, ContextSource, LifecycleError,
        LifecycleEvent, MemoryError, MergeError, OrchError, Provider, ProviderError,
        QueryResponse, RegistryError, Role, SessionId,
    };

    #[cfg(feature = "core")]
    pub use ensemble_memory::{MemoryDigest, MemoryItem, MemoryKind};

    #[cfg(feature = "orch")]
    pub use ensemble_orch::{
        BusTransport, LifecycleSupervisor, LocalTransport, MergeNegotiation, Orchestrator,
        Registry, Workflow,
    };

    #[cfg(feature = "runtime")]
    pub use ensemble_runtime::{run_session, SharedSession, ShutdownTracker};

    #[cfg(feature = "provider-http")]
    pub use ensemble_provider_http::{presets, Auth, HttpProvider, ProviderConfig};

    #[cfg(feature = "provider-ollama")]
    pub use ensemble_provider_ollama::OllamaProvider;

    #[cfg(feature = "provider-cli")]
    pub use ensemble_provider_cli::{CliProvider, FileCliProvider};
}

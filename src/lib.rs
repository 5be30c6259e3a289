//! tarm - resource lifecycle and dispatch engine
//!
//! Routes resource operations to pluggable providers, keeps names unique per
//! scope, drives resources through a provisioning state machine, and can
//! offload any operation to a durable job queue worked by retrying consumers.
//!
//! ```text
//! caller -> ResourceProviderRegistry::dispatch -> ResourceProvider
//! caller -> OffloadingProviderRegistry -> JobQueue -> ProviderWorker -> registry
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod lifecycle;
pub mod offload;
pub mod queue;
pub mod resource;
pub mod scope;
pub mod store;
pub mod worker;

/// Version injected at compile time via TARM_VERSION env var (set by CI/CD),
/// or "dev" for local builds.
pub const VERSION: &str = match option_env!("TARM_VERSION") {
    Some(v) => v,
    None => "dev",
};

pub use config::EngineConfig;
pub use engine::Engine;
pub use error::{EngineError, EngineResult, ErrorKind};
pub use offload::OffloadingProviderRegistry;
pub use queue::{Job, JobQueue, JobResult, JobStatus};
pub use resource::{Operation, ProviderRequest, ResourceProvider, ResourceProviderRegistry};
pub use worker::{ProviderWorker, WorkerRegistry};

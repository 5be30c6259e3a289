//! Background workers
//!
//! - [`classify`] - retryable vs non-retryable failures
//! - [`provider_worker`] - runs one job through the provider registry
//! - [`registry`] - starts, stops and reports on a pool of workers

pub mod classify;
pub mod provider_worker;
pub mod registry;

pub use classify::{classify, classify_message, FailureClass};
pub use provider_worker::ProviderWorker;
pub use registry::{RegistryStatus, WorkerRegistry, WorkerState, WorkerStatus};

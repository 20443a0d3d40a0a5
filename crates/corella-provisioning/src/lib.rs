//! # Asynchronous account provisioning
//!
//! The pipeline between a completed federated registration and a usable
//! cloud account:
//!
//! - Durable Postgres-backed work queue with competing consumers
//!   (`FOR UPDATE SKIP LOCKED`), retry backoff and a dead letter state.
//! - Orchestrator driving project creation, user creation, role grants,
//!   quotas, default security groups and notifications, with a
//!   compensating path for duplicate identities.
//! - Background worker with bounded concurrency, stale-claim release
//!   and graceful shutdown.

pub mod dispatch;
pub mod manager;
pub mod queue;
pub mod request;
pub mod worker;

pub use dispatch::WorkerApi;
pub use manager::{Disposition, Manager, ManagerConfig, ManagerError};
pub use queue::{QueueConfig, QueueError, QueuedRequest, WorkQueue};
pub use request::{RegistrationAttrs, WorkRequest};
pub use worker::{ProvisioningWorker, WorkerConfig};

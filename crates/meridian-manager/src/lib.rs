//! Orchestration layer for the meridian application manager.
//!
//! This crate wraps the pure domain model from `meridian-core` with
//! everything a running service needs: persistence, the scheduling hand-off,
//! the orchestration engine and the HTTP API.
//!
//! # Architecture
//!
//! - [`deployment`]: the orchestration engine (descriptor lifecycle, deploy,
//!   undeploy, connections, target resolution)
//! - [`store`]: descriptor/instance persistence, remote service or in-memory
//! - [`queue`]: command hand-off to the scheduler
//! - [`devices`]: device group lookups for target resolution
//! - [`settings`]: per-organization setting lookups
//! - [`api`]: HTTP endpoints
//! - [`service`]: lifecycle wiring and graceful shutdown
//! - [`config`]: file and environment configuration
//!
//! Every external call the orchestration engine makes is bounded by the
//! configured call timeout, so a stalled backend turns into an error instead
//! of a hung request.

#![forbid(unsafe_code)]

pub mod api;
pub mod config;
pub mod deployment;
pub mod devices;
pub mod error;
pub mod queue;
pub mod service;
pub mod settings;
pub mod store;

// Re-export commonly used types at the crate root
pub use config::ManagerConfig;
pub use deployment::{ApplicationManager, ConnectionChecker};
pub use error::{ManagerError, ManagerResult};
pub use queue::{CommandQueue, HttpQueue, MemoryQueue};
pub use service::ManagerService;
pub use store::{ApplicationStore, ConnectionStore, MemoryStore, RemoteStore};

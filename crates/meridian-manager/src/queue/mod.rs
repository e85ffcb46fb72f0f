//! Scheduling hand-off queue.
//!
//! The orchestrator never places services itself. Accepted deploy and
//! undeploy requests are handed to the platform scheduler as commands on
//! this queue; delivery is at-least-once and nothing in this crate consumes
//! acknowledgments.

mod http;

pub use http::HttpQueue;

use std::collections::VecDeque;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use meridian_core::{InstanceId, OrganizationId};

use crate::config::{QueueBackend, QueueConfig};
use crate::error::{ManagerError, ManagerResult};

/// An outbound connection resolved against the deployed instance.
///
/// `source_service_name` is the service owning the outbound interface,
/// matched through the descriptor's security rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedConnection {
    pub target_instance_id: InstanceId,
    pub inbound_name: String,
    pub outbound_name: String,
    pub source_service_name: String,
}

/// Command asking the scheduler to place a newly created instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployCommand {
    /// Correlation ID minted by the orchestrator.
    pub request_id: String,
    pub organization_id: OrganizationId,
    pub app_instance_id: InstanceId,
    /// Instance name, echoed for scheduler-side logging.
    pub name: String,
    /// Connections the scheduler must wire once services are placed.
    #[serde(default)]
    pub outbound_connections: Vec<ResolvedConnection>,
}

/// Command asking the scheduler to tear an instance down.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UndeployCommand {
    /// Correlation ID minted by the orchestrator.
    pub request_id: String,
    pub organization_id: OrganizationId,
    pub app_instance_id: InstanceId,
}

/// Producer side of the scheduling hand-off queue.
#[async_trait]
pub trait CommandQueue: Send + Sync {
    /// Enqueue a deploy command.
    async fn enqueue_deploy(&self, command: DeployCommand) -> ManagerResult<()>;

    /// Enqueue an undeploy command.
    async fn enqueue_undeploy(&self, command: UndeployCommand) -> ManagerResult<()>;
}

/// Create a queue from configuration.
pub fn create_queue(config: &QueueConfig) -> ManagerResult<Arc<dyn CommandQueue>> {
    match config.backend {
        QueueBackend::Http => {
            let queue = HttpQueue::new(config)?;
            Ok(Arc::new(queue))
        }
        QueueBackend::Memory => Ok(Arc::new(MemoryQueue::default())),
    }
}

/// In-process queue for testing.
///
/// Commands are held in order of submission; tests drain them with the
/// `pop_*` helpers to assert on what the orchestrator handed off.
#[derive(Debug, Default)]
pub struct MemoryQueue {
    deploys: RwLock<VecDeque<DeployCommand>>,
    undeploys: RwLock<VecDeque<UndeployCommand>>,
}

impl MemoryQueue {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of pending deploy commands.
    pub fn deploy_count(&self) -> ManagerResult<usize> {
        Ok(self
            .deploys
            .read()
            .map_err(|_| ManagerError::internal("lock poisoned"))?
            .len())
    }

    /// Number of pending undeploy commands.
    pub fn undeploy_count(&self) -> ManagerResult<usize> {
        Ok(self
            .undeploys
            .read()
            .map_err(|_| ManagerError::internal("lock poisoned"))?
            .len())
    }

    /// Pop the oldest deploy command, if any.
    pub fn pop_deploy(&self) -> ManagerResult<Option<DeployCommand>> {
        Ok(self
            .deploys
            .write()
            .map_err(|_| ManagerError::internal("lock poisoned"))?
            .pop_front())
    }

    /// Pop the oldest undeploy command, if any.
    pub fn pop_undeploy(&self) -> ManagerResult<Option<UndeployCommand>> {
        Ok(self
            .undeploys
            .write()
            .map_err(|_| ManagerError::internal("lock poisoned"))?
            .pop_front())
    }
}

#[async_trait]
impl CommandQueue for MemoryQueue {
    async fn enqueue_deploy(&self, command: DeployCommand) -> ManagerResult<()> {
        self.deploys
            .write()
            .map_err(|_| ManagerError::internal("lock poisoned"))?
            .push_back(command);
        Ok(())
    }

    async fn enqueue_undeploy(&self, command: UndeployCommand) -> ManagerResult<()> {
        self.undeploys
            .write()
            .map_err(|_| ManagerError::internal("lock poisoned"))?
            .push_back(command);
        Ok(())
    }
}

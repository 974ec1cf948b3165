//! Capability interfaces of the systems the reconcilers talk to.
//!
//! Implementations live in separate crates (`kiln-jenkins`, `kiln-openstack`) or in
//! [`crate::registry`]. Every call is a single blocking round-trip without internal retry:
//! a failed call is retried by the next scheduled pass.

use async_trait::async_trait;

use kiln_model::{BlockedTask, LaunchedNode, ManagedNode, NodeType};

use crate::error::{CiError, ProviderError, RegistryError};

/// The CI system whose queue and agent fleet are managed.
#[async_trait]
pub trait CiGateway: Send + Sync + 'static {
    /// Current queue entries; `Ok(vec![])` means the queue is empty.
    async fn list_blocked_tasks(&self) -> Result<Vec<BlockedTask>, CiError>;

    /// Names of every agent known to the CI system.
    async fn list_agent_names(&self) -> Result<Vec<String>, CiError>;

    async fn get_node_idle(&self, name: &str) -> Result<bool, CiError>;

    async fn node_exists(&self, name: &str) -> Result<bool, CiError>;

    /// Labels configured on an agent; an unknown agent has no labels.
    async fn get_node_labels(&self, name: &str) -> Result<Vec<String>, CiError>;

    /// Label expression a job is pinned to.
    ///
    /// Fails with [`CiError::NotFound`] when the job configuration cannot be fetched
    /// (e.g. a matrix configuration), and returns `None` when the job declares no expression.
    async fn get_job_label_expression(&self, job_name: &str) -> Result<Option<String>, CiError>;

    async fn delete_node(&self, name: &str) -> Result<(), CiError>;
}

/// A cloud provider that hosts build nodes.
#[async_trait]
pub trait ProviderGateway: Send + Sync + 'static {
    /// Name this provider is configured under.
    fn name(&self) -> &str;

    /// Launch `count` nodes of `node_type`.
    async fn create_node(
        &self,
        node_type: &NodeType,
        count: u32,
    ) -> Result<Vec<LaunchedNode>, ProviderError>;

    /// Destroy the node with the given provider-assigned name.
    ///
    /// Fails with [`ProviderError::NodeNotFound`] when no such node exists.
    async fn destroy_node(&self, name: &str) -> Result<(), ProviderError>;

    /// Destroy every node the provider reports in an error state; returns how many.
    async fn purge_error_state_nodes(&self) -> Result<usize, ProviderError>;
}

/// The registry of nodes launched by the controller.
///
/// The registry owns its records and serialises concurrent writers; reconcilers only
/// request mutations through this interface.
#[async_trait]
pub trait RegistryGateway: Send + Sync + 'static {
    async fn list_nodes(&self) -> Result<Vec<ManagedNode>, RegistryError>;

    /// Record the node as idle; keeps an earlier idle timestamp.
    async fn mark_idle(&self, id: &str) -> Result<(), RegistryError>;

    /// Record the node as busy, clearing its idle timestamp.
    async fn mark_active(&self, id: &str) -> Result<(), RegistryError>;

    /// Record the agent name the node joined the CI system with.
    async fn set_ci_name(&self, id: &str, ci_name: &str) -> Result<(), RegistryError>;

    async fn delete(&self, id: &str) -> Result<(), RegistryError>;

    /// Ask for `count` more nodes of `node_type`; returns how many were launched.
    async fn create_request(&self, node_type: &NodeType, count: u32)
    -> Result<usize, RegistryError>;
}

use std::collections::HashMap;
use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use kiln_model::{ManagedNode, id_from_name, is_managed_name};

use crate::error::ProviderError;
use crate::gateway::{CiGateway, RegistryGateway};
use crate::metrics::{DestroyReason, MetricsHandle, PassOutcome, Procedure, noop};
use crate::reconcile::{Reconcile, ReconcileConfig};
use crate::router::ProviderRouter;

/// Mirrors the idle flag of managed agents into the registry and retires nodes idle
/// for longer than the configured timeout.
///
/// Only agents following the `<type>__<id>` naming convention are considered; anything
/// else in the CI system is left alone.
pub struct IdleReporter {
    ci: Arc<dyn CiGateway>,
    registry: Arc<dyn RegistryGateway>,
    providers: ProviderRouter,
    config: ReconcileConfig,
    metrics: MetricsHandle,
}

impl IdleReporter {
    pub fn new(
        ci: Arc<dyn CiGateway>,
        registry: Arc<dyn RegistryGateway>,
        providers: ProviderRouter,
        config: ReconcileConfig,
    ) -> Self {
        Self {
            ci,
            registry,
            providers,
            config,
            metrics: noop(),
        }
    }

    pub fn with_metrics(mut self, metrics: MetricsHandle) -> Self {
        self.metrics = metrics;
        self
    }

    pub async fn report_idle_state(&self) -> PassOutcome {
        self.report_idle_state_at(SystemTime::now()).await
    }

    pub async fn report_idle_state_at(&self, now: SystemTime) -> PassOutcome {
        let outcome = self.run(now).await;
        self.metrics.record_pass(Procedure::IdleCheck, outcome);
        outcome
    }

    async fn run(&self, now: SystemTime) -> PassOutcome {
        let agents = match self.ci.list_agent_names().await {
            Ok(agents) => agents,
            Err(e) => {
                warn!(error = %e, "idle check: failed to list agents, skipping pass");
                return PassOutcome::Aborted;
            }
        };
        let nodes = match self.registry.list_nodes().await {
            Ok(nodes) => nodes,
            Err(e) => {
                warn!(error = %e, "idle check: failed to list registry, skipping pass");
                return PassOutcome::Aborted;
            }
        };
        let by_id: HashMap<&str, &ManagedNode> =
            nodes.iter().map(|n| (n.identifier.as_str(), n)).collect();

        let managed: Vec<&str> = agents
            .iter()
            .map(String::as_str)
            .filter(|name| is_managed_name(name))
            .collect();
        if managed.is_empty() {
            return PassOutcome::Empty;
        }

        for name in managed {
            let Some(node) = id_from_name(name).and_then(|id| by_id.get(id)) else {
                debug!(agent = name, "idle check: agent not tracked by registry");
                continue;
            };
            self.check(node, name, now).await;
        }
        PassOutcome::Completed
    }

    async fn check(&self, node: &ManagedNode, name: &str, now: SystemTime) {
        let id = node.identifier.as_str();
        if node.ci_name.as_deref() != Some(name) {
            if let Err(e) = self.registry.set_ci_name(id, name).await {
                warn!(node = id, agent = name, error = %e, "idle check: failed to record agent name");
            }
        }

        let idle = match self.ci.get_node_idle(name).await {
            Ok(idle) => idle,
            Err(e) => {
                warn!(agent = name, error = %e, "idle check: failed to read idle state");
                return;
            }
        };

        if !idle {
            if node.idle_since.is_some() {
                debug!(node = id, "idle check: node became active");
                if let Err(e) = self.registry.mark_active(id).await {
                    warn!(node = id, error = %e, "idle check: failed to mark active");
                }
            }
            return;
        }

        let Some(idle_for) = node.idle_for(now) else {
            debug!(node = id, "idle check: node became idle");
            if let Err(e) = self.registry.mark_idle(id).await {
                warn!(node = id, error = %e, "idle check: failed to mark idle");
            }
            return;
        };
        if let Some(timeout) = self.config.idle_timeout {
            if idle_for > timeout {
                self.retire(node, name).await;
            }
        }
    }

    /// Remove the agent from the CI system, then destroy it at its provider.
    async fn retire(&self, node: &ManagedNode, name: &str) {
        let id = node.identifier.as_str();
        info!(node = id, agent = name, "idle check: retiring idle node");
        if let Err(e) = self.ci.delete_node(name).await {
            warn!(agent = name, error = %e, "idle check: failed to remove agent from CI");
            return;
        }
        let Some(provider) = self.providers.get(&node.provider) else {
            warn!(node = id, provider = %node.provider, "idle check: provider not configured");
            return;
        };
        match provider.destroy_node(&node.cloud_name).await {
            Ok(()) => self.metrics.record_destroyed(provider.name(), DestroyReason::Idle, 1),
            Err(ProviderError::NodeNotFound(_)) => {
                if let Err(e) = self.registry.delete(id).await {
                    warn!(node = id, error = %e, "idle check: failed to delete registry entry");
                }
            }
            Err(e) => warn!(node = id, error = %e, "idle check: failed to destroy idle node"),
        }
    }
}

#[async_trait]
impl Reconcile for IdleReporter {
    fn procedure(&self) -> Procedure {
        Procedure::IdleCheck
    }

    async fn reconcile(&self) -> PassOutcome {
        self.report_idle_state().await
    }
}

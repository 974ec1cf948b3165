use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use kiln_model::ManagedNode;

use crate::error::ProviderError;
use crate::gateway::{CiGateway, RegistryGateway};
use crate::metrics::{DestroyReason, MetricsHandle, PassOutcome, Procedure, noop};
use crate::reconcile::{Reconcile, ReconcileConfig};
use crate::router::ProviderRouter;

/// Destroys nodes that never joined (or dropped out of) the CI system within the grace
/// period, then lets every provider sweep its nodes in error state.
///
/// Registry entries are only removed once the provider confirms the node is gone.
pub struct OrphanReaper {
    ci: Arc<dyn CiGateway>,
    registry: Arc<dyn RegistryGateway>,
    providers: ProviderRouter,
    config: ReconcileConfig,
    metrics: MetricsHandle,
}

impl OrphanReaper {
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

    pub async fn reap_orphans(&self) -> PassOutcome {
        self.reap_orphans_at(SystemTime::now()).await
    }

    pub async fn reap_orphans_at(&self, now: SystemTime) -> PassOutcome {
        let outcome = self.run(now).await;
        self.metrics.record_pass(Procedure::OrphanReap, outcome);
        outcome
    }

    async fn run(&self, now: SystemTime) -> PassOutcome {
        let nodes = match self.registry.list_nodes().await {
            Ok(nodes) => nodes,
            Err(e) => {
                warn!(error = %e, "orphan reap: failed to list registry, skipping pass");
                return PassOutcome::Aborted;
            }
        };

        for node in &nodes {
            if self.is_healthy(node).await {
                continue;
            }
            let age = node.age(now);
            if age <= self.config.orphan_grace {
                debug!(node = %node.identifier, age_secs = age.as_secs(), "orphan reap: still provisioning");
                continue;
            }
            self.reap(node).await;
        }

        self.purge().await;

        if nodes.is_empty() {
            PassOutcome::Empty
        } else {
            PassOutcome::Completed
        }
    }

    /// Joined and still known to the CI system. A failed lookup counts as healthy.
    async fn is_healthy(&self, node: &ManagedNode) -> bool {
        let ci_name = match (node.state(), node.ci_name.as_deref()) {
            (state, Some(ci_name)) if state.is_registered() => ci_name,
            _ => return false,
        };
        match self.ci.node_exists(ci_name).await {
            Ok(exists) => exists,
            Err(e) => {
                warn!(agent = ci_name, error = %e, "orphan reap: failed to look up agent");
                true
            }
        }
    }

    async fn reap(&self, node: &ManagedNode) {
        let id = node.identifier.as_str();
        let Some(provider) = self.providers.get(&node.provider) else {
            warn!(node = id, provider = %node.provider, "orphan reap: provider not configured");
            return;
        };

        info!(
            node = id,
            cloud_name = %node.cloud_name,
            state = ?node.state(),
            "orphan reap: destroying orphaned node"
        );
        match provider.destroy_node(&node.cloud_name).await {
            Ok(()) => {
                self.metrics
                    .record_destroyed(provider.name(), DestroyReason::Orphaned, 1);
            }
            Err(ProviderError::NodeNotFound(_)) => {
                info!(node = id, "orphan reap: node already gone, removing from registry");
                if let Err(e) = self.registry.delete(id).await {
                    warn!(node = id, error = %e, "orphan reap: failed to delete registry entry");
                }
            }
            Err(e) => error!(node = id, error = %e, "orphan reap: failed to destroy node"),
        }
    }

    async fn purge(&self) {
        for provider in self.providers.iter() {
            match provider.purge_error_state_nodes().await {
                Ok(0) => {}
                Ok(purged) => {
                    info!(provider = provider.name(), purged, "orphan reap: purged nodes in error state");
                    self.metrics
                        .record_destroyed(provider.name(), DestroyReason::ErrorState, purged);
                }
                Err(e) => warn!(provider = provider.name(), error = %e, "orphan reap: purge failed"),
            }
        }
    }
}

#[async_trait]
impl Reconcile for OrphanReaper {
    fn procedure(&self) -> Procedure {
        Procedure::OrphanReap
    }

    async fn reconcile(&self) -> PassOutcome {
        self.reap_orphans().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CiError, RegistryError};
    use crate::testing::{FakeCi, FakeProvider, FakeRegistry, managed};
    use std::time::Duration;

    struct Fixture {
        ci: Arc<FakeCi>,
        registry: Arc<FakeRegistry>,
        provider: Arc<FakeProvider>,
        reaper: OrphanReaper,
    }

    fn fixture() -> Fixture {
        let ci = Arc::new(FakeCi::default());
        let registry = Arc::new(FakeRegistry::default());
        let provider = Arc::new(FakeProvider::new("openstack"));
        let router = ProviderRouter::new().with(provider.clone());
        let reaper = OrphanReaper::new(
            ci.clone(),
            registry.clone(),
            router,
            ReconcileConfig::default(),
        );
        Fixture { ci, registry, provider, reaper }
    }

    fn aged(id: &str, now: SystemTime, secs: u64) -> ManagedNode {
        managed(id, "centos6", "openstack", now - Duration::from_secs(secs))
    }

    fn destroys(provider: &FakeProvider) -> Vec<String> {
        provider
            .calls()
            .into_iter()
            .filter(|c| c.starts_with("destroy_node"))
            .collect()
    }

    #[tokio::test]
    async fn destroys_only_past_grace_period() {
        let f = fixture();
        let now = SystemTime::now();
        f.registry.insert(aged("old", now, 901));
        f.registry.insert(aged("young", now, 899));
        f.provider.add_node("centos6__old");
        f.provider.add_node("centos6__young");

        assert_eq!(f.reaper.reap_orphans_at(now).await, PassOutcome::Completed);

        assert_eq!(destroys(&f.provider), vec!["destroy_node:centos6__old"]);
        // destruction is confirmed later; the entry stays for now
        assert!(f.registry.node("old").is_some());
    }

    #[tokio::test]
    async fn grace_period_boundary_is_exclusive() {
        let f = fixture();
        let now = SystemTime::now();
        f.registry.insert(aged("edge", now, 900));

        f.reaper.reap_orphans_at(now).await;

        assert!(destroys(&f.provider).is_empty());
    }

    #[tokio::test]
    async fn healthy_registered_node_is_kept() {
        let f = fixture();
        let now = SystemTime::now();
        let mut node = aged("abc", now, 5000);
        node.ci_name = Some("centos6__abc".into());
        f.registry.insert(node);
        f.ci.add_agent("centos6__abc", false);

        f.reaper.reap_orphans_at(now).await;

        assert!(destroys(&f.provider).is_empty());
    }

    #[tokio::test]
    async fn registered_node_missing_from_ci_is_reaped() {
        let f = fixture();
        let now = SystemTime::now();
        let mut node = aged("abc", now, 5000);
        node.ci_name = Some("centos6__abc".into());
        f.registry.insert(node);
        f.provider.add_node("centos6__abc");

        f.reaper.reap_orphans_at(now).await;

        assert_eq!(destroys(&f.provider), vec!["destroy_node:centos6__abc"]);
    }

    #[tokio::test]
    async fn ci_lookup_failure_skips_node() {
        let f = fixture();
        let now = SystemTime::now();
        let mut node = aged("abc", now, 5000);
        node.ci_name = Some("centos6__abc".into());
        f.registry.insert(node);
        f.ci.fail_exists(CiError::Transport("timeout".into()));

        f.reaper.reap_orphans_at(now).await;

        assert!(destroys(&f.provider).is_empty());
    }

    #[tokio::test]
    async fn repeated_destroy_ends_in_registry_deletion() {
        let f = fixture();
        let now = SystemTime::now();
        f.registry.insert(aged("abc", now, 1000));
        f.provider.add_node("centos6__abc");

        f.reaper.reap_orphans_at(now).await;
        assert!(f.registry.node("abc").is_some());

        f.reaper.reap_orphans_at(now).await;
        assert!(f.registry.node("abc").is_none());
        assert_eq!(destroys(&f.provider).len(), 2);
        assert_eq!(f.registry.calls(), vec!["delete:abc"]);

        assert_eq!(f.reaper.reap_orphans_at(now).await, PassOutcome::Empty);
    }

    #[tokio::test]
    async fn unexpected_destroy_error_leaves_registry_untouched() {
        let f = fixture();
        let now = SystemTime::now();
        f.registry.insert(aged("abc", now, 1000));
        f.provider
            .fail_destroy("centos6__abc", ProviderError::Transport("503".into()));

        f.reaper.reap_orphans_at(now).await;

        assert!(f.registry.node("abc").is_some());
        assert!(f.registry.calls().is_empty());
    }

    #[tokio::test]
    async fn purges_every_provider_after_reaping() {
        let f = fixture();
        f.provider.set_purge_count(2);

        assert_eq!(f.reaper.reap_orphans().await, PassOutcome::Empty);
        assert_eq!(f.provider.calls(), vec!["purge_error_state_nodes"]);
    }

    #[tokio::test]
    async fn purge_failure_is_not_fatal() {
        let f = fixture();
        let now = SystemTime::now();
        f.registry.insert(aged("abc", now, 1000));
        f.provider.fail_purge(ProviderError::Transport("503".into()));

        assert_eq!(f.reaper.reap_orphans_at(now).await, PassOutcome::Completed);
        assert_eq!(
            f.provider.calls(),
            vec!["destroy_node:centos6__abc", "purge_error_state_nodes"]
        );
    }

    #[tokio::test]
    async fn registry_failure_aborts_without_purging() {
        let f = fixture();
        f.registry
            .fail_list(RegistryError::Unavailable("down".into()));

        assert_eq!(f.reaper.reap_orphans().await, PassOutcome::Aborted);
        assert!(f.provider.calls().is_empty());
    }
}

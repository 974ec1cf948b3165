use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use kiln_model::{BlockedTask, Catalog, Demand};

use crate::classify::{Classification, QueueClassifier};
use crate::gateway::{CiGateway, RegistryGateway};
use crate::metrics::{MetricsHandle, PassOutcome, Procedure, noop};
use crate::reconcile::Reconcile;

/// Queue-driven provisioning: one creation request per needed node type and pass.
pub struct Provisioner {
    classifier: QueueClassifier,
    ci: Arc<dyn CiGateway>,
    registry: Arc<dyn RegistryGateway>,
    metrics: MetricsHandle,
}

impl Provisioner {
    pub fn new(
        catalog: Arc<Catalog>,
        ci: Arc<dyn CiGateway>,
        registry: Arc<dyn RegistryGateway>,
    ) -> Self {
        Self {
            classifier: QueueClassifier::new(catalog, ci.clone()),
            ci,
            registry,
            metrics: noop(),
        }
    }

    pub fn with_metrics(mut self, metrics: MetricsHandle) -> Self {
        self.metrics = metrics;
        self
    }

    /// Collect demand from one queue snapshot and request the missing capacity.
    pub async fn provision(&self) -> PassOutcome {
        let outcome = self.run().await;
        self.metrics.record_pass(Procedure::Provision, outcome);
        outcome
    }

    async fn run(&self) -> PassOutcome {
        let tasks = match self.ci.list_blocked_tasks().await {
            Ok(tasks) => tasks,
            Err(e) => {
                warn!(error = %e, "provision: failed to read the queue, skipping pass");
                return PassOutcome::Aborted;
            }
        };
        if tasks.is_empty() {
            debug!("provision: queue is empty");
            return PassOutcome::Empty;
        }

        let demand = self.collect(&tasks).await;
        if demand.is_empty() {
            debug!(queued = tasks.len(), "provision: nothing to create");
            return PassOutcome::Completed;
        }

        debug!(
            queued = tasks.len(),
            node_types = demand.len(),
            nodes = demand.total(),
            "provision: demand collected"
        );
        for (node_type, count) in demand.iter() {
            let Some(node) = self.classifier.catalog().get(node_type) else {
                continue;
            };
            match self.registry.create_request(node, count).await {
                Ok(launched) => {
                    info!(node_type, requested = count, launched, "provision: creation requested");
                    self.metrics.record_requested(node_type, count);
                }
                Err(e) => {
                    error!(node_type, requested = count, error = %e, "provision: creation failed");
                }
            }
        }
        PassOutcome::Completed
    }

    async fn collect(&self, tasks: &[BlockedTask]) -> Demand {
        let mut demand = Demand::new();
        for task in tasks {
            match self.classifier.classify(task).await {
                Classification::Needs(node_type) => {
                    debug!(task = task.id, %node_type, "provision: task needs a node");
                    demand.add(node_type);
                }
                Classification::Unresolved => self.metrics.record_unresolved(),
                Classification::NotStuck => {}
            }
        }
        demand
    }
}

#[async_trait]
impl Reconcile for Provisioner {
    fn procedure(&self) -> Procedure {
        Procedure::Provision
    }

    async fn reconcile(&self) -> PassOutcome {
        self.provision().await
    }
}

use std::{
    collections::HashMap,
    sync::{Arc, PoisonError, RwLock},
    time::{Duration, SystemTime},
};

use async_trait::async_trait;
use tracing::{debug, info};

use kiln_model::{ManagedNode, NodeId, NodeType};

use crate::error::RegistryError;
use crate::gateway::RegistryGateway;
use crate::router::ProviderRouter;

/// When and how many nodes a creation request launches.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CreationPolicy {
    /// Share of the requested count actually launched; nodes freed by finishing builds
    /// absorb the rest.
    pub buffer_ratio: f64,
    /// Nodes younger than this count as already on their way.
    pub recent_window: Duration,
}

impl Default for CreationPolicy {
    fn default() -> Self {
        Self {
            buffer_ratio: 0.75,
            recent_window: Duration::from_secs(360),
        }
    }
}

impl CreationPolicy {
    /// Number of nodes to launch for `count` waiting tasks; at least one.
    pub fn buffered(&self, count: u32) -> u32 {
        let scaled = (f64::from(count) * self.buffer_ratio).round();
        (scaled as u32).max(1)
    }
}

/// In-memory registry of launched nodes.
///
/// Writers are serialised by a lock that is never held across a provider call.
#[derive(Clone)]
pub struct NodeRegistry {
    inner: Arc<RwLock<RegistryInner>>,
    providers: ProviderRouter,
    policy: CreationPolicy,
}

struct RegistryInner {
    /// Nodes indexed by identifier.
    nodes: HashMap<NodeId, ManagedNode>,
    /// Index: node type -> identifiers of nodes of that type.
    by_type: HashMap<String, Vec<NodeId>>,
}

impl NodeRegistry {
    pub fn new(providers: ProviderRouter) -> Self {
        Self {
            inner: Arc::new(RwLock::new(RegistryInner {
                nodes: HashMap::new(),
                by_type: HashMap::new(),
            })),
            providers,
            policy: CreationPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: CreationPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Track a node.
    pub fn insert(&self, node: ManagedNode) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let id = node.identifier.clone();
        inner.by_type.entry(node.node_type.clone()).or_default().push(id.clone());
        inner.nodes.insert(id, node);
    }

    pub fn get(&self, id: &str) -> Option<ManagedNode> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.nodes.get(id).cloned()
    }

    pub fn list_by_type(&self, node_type: &str) -> Vec<ManagedNode> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner
            .by_type
            .get(node_type)
            .map(|ids| ids.iter().filter_map(|id| inner.nodes.get(id).cloned()).collect())
            .unwrap_or_default()
    }

    pub fn list_all(&self) -> Vec<ManagedNode> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.nodes.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn update(&self, id: &str, f: impl FnOnce(&mut ManagedNode)) -> Result<(), RegistryError> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let node = inner
            .nodes
            .get_mut(id)
            .ok_or_else(|| RegistryError::NodeNotFound(id.to_string()))?;
        f(node);
        Ok(())
    }

    fn remove(&self, id: &str) -> Option<ManagedNode> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let node = inner.nodes.remove(id)?;
        if let Some(ids) = inner.by_type.get_mut(&node.node_type) {
            ids.retain(|known| known != id);
        }
        Some(node)
    }

    /// Nodes of `node_type` created within the recent window.
    fn recent(&self, node_type: &str, now: SystemTime) -> (usize, usize) {
        let existing = self.list_by_type(node_type);
        let recent = existing
            .iter()
            .filter(|n| n.age(now) < self.policy.recent_window)
            .count();
        (existing.len(), recent)
    }

    /// Creation request evaluated at `now`.
    ///
    /// Nothing is launched when at least `count` nodes of the type were created within the
    /// recent window. Otherwise the buffered count is launched at the type's provider and
    /// recorded as pending.
    pub async fn create_request_at(
        &self,
        node_type: &NodeType,
        count: u32,
        now: SystemTime,
    ) -> Result<usize, RegistryError> {
        let (existing, recent) = self.recent(&node_type.name, now);
        if existing > 0 && recent >= count as usize {
            info!(
                node_type = %node_type.name,
                needed = count,
                recent,
                "registry: enough nodes created recently, not creating"
            );
            return Ok(0);
        }

        let provider = self
            .providers
            .get(&node_type.provider)
            .ok_or_else(|| RegistryError::UnknownProvider(node_type.provider.clone()))?;
        let buffered = self.policy.buffered(count);
        debug!(node_type = %node_type.name, needed = count, buffered, "registry: creating nodes");

        let launched = provider.create_node(node_type, buffered).await?;
        let created = launched.len();
        for node in launched {
            self.insert(ManagedNode {
                identifier: node.identifier,
                node_type: node_type.name.clone(),
                provider: node_type.provider.clone(),
                cloud_name: node.cloud_name,
                provider_id: node.provider_id,
                ci_name: None,
                created_at: now,
                idle_since: None,
            });
        }
        Ok(created)
    }
}

#[async_trait]
impl RegistryGateway for NodeRegistry {
    async fn list_nodes(&self) -> Result<Vec<ManagedNode>, RegistryError> {
        Ok(self.list_all())
    }

    async fn mark_idle(&self, id: &str) -> Result<(), RegistryError> {
        self.update(id, |node| {
            node.idle_since.get_or_insert_with(SystemTime::now);
        })
    }

    async fn mark_active(&self, id: &str) -> Result<(), RegistryError> {
        self.update(id, |node| node.idle_since = None)
    }

    async fn set_ci_name(&self, id: &str, ci_name: &str) -> Result<(), RegistryError> {
        self.update(id, |node| node.ci_name = Some(ci_name.to_string()))
    }

    async fn delete(&self, id: &str) -> Result<(), RegistryError> {
        if self.remove(id).is_some() {
            debug!(node = id, "registry: node removed");
        }
        Ok(())
    }

    async fn create_request(
        &self,
        node_type: &NodeType,
        count: u32,
    ) -> Result<usize, RegistryError> {
        self.create_request_at(node_type, count, SystemTime::now()).await
    }
}

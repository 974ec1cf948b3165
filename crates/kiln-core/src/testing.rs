//! In-memory gateways for unit tests. Every call is appended to a log as `op:arg`.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::SystemTime;

use async_trait::async_trait;

use kiln_model::{BlockedTask, LaunchedNode, ManagedNode, NodeType};

use crate::error::{CiError, ProviderError, RegistryError};
use crate::gateway::{CiGateway, ProviderGateway, RegistryGateway};

#[derive(Default)]
struct CiState {
    queue: Option<Result<Vec<BlockedTask>, CiError>>,
    agents: Vec<String>,
    agents_error: Option<CiError>,
    idle: HashMap<String, bool>,
    labels: HashMap<String, Vec<String>>,
    jobs: HashMap<String, Option<String>>,
    job_error: Option<CiError>,
    exists_error: Option<CiError>,
    calls: Vec<String>,
}

#[derive(Default)]
pub struct FakeCi {
    state: Mutex<CiState>,
}

impl FakeCi {
    fn with<R>(&self, f: impl FnOnce(&mut CiState) -> R) -> R {
        let mut guard = self.state.lock().unwrap();
        f(&mut guard)
    }

    pub fn set_queue(&self, queue: Result<Vec<BlockedTask>, CiError>) {
        self.with(|s| s.queue = Some(queue));
    }

    pub fn add_agent(&self, name: &str, idle: bool) {
        self.with(|s| {
            s.agents.push(name.to_string());
            s.idle.insert(name.to_string(), idle);
        });
    }

    pub fn set_idle(&self, name: &str, idle: bool) {
        self.with(|s| s.idle.insert(name.to_string(), idle));
    }

    pub fn fail_agents(&self, err: CiError) {
        self.with(|s| s.agents_error = Some(err));
    }

    pub fn fail_exists(&self, err: CiError) {
        self.with(|s| s.exists_error = Some(err));
    }

    pub fn set_labels(&self, name: &str, labels: &[&str]) {
        self.with(|s| {
            s.labels
                .insert(name.to_string(), labels.iter().map(|l| l.to_string()).collect())
        });
    }

    pub fn set_job_expression(&self, job: &str, expr: Option<&str>) {
        self.with(|s| s.jobs.insert(job.to_string(), expr.map(str::to_string)));
    }

    pub fn fail_job_expression(&self, err: CiError) {
        self.with(|s| s.job_error = Some(err));
    }

    pub fn calls(&self) -> Vec<String> {
        self.with(|s| s.calls.clone())
    }

    fn record(&self, call: String) {
        self.with(|s| s.calls.push(call));
    }
}

#[async_trait]
impl CiGateway for FakeCi {
    async fn list_blocked_tasks(&self) -> Result<Vec<BlockedTask>, CiError> {
        self.record("list_blocked_tasks".into());
        self.with(|s| s.queue.clone().unwrap_or_else(|| Ok(Vec::new())))
    }

    async fn list_agent_names(&self) -> Result<Vec<String>, CiError> {
        self.record("list_agent_names".into());
        self.with(|s| match &s.agents_error {
            Some(e) => Err(e.clone()),
            None => Ok(s.agents.clone()),
        })
    }

    async fn get_node_idle(&self, name: &str) -> Result<bool, CiError> {
        self.record(format!("get_node_idle:{name}"));
        self.with(|s| s.idle.get(name).copied())
            .ok_or_else(|| CiError::NotFound(name.to_string()))
    }

    async fn node_exists(&self, name: &str) -> Result<bool, CiError> {
        self.record(format!("node_exists:{name}"));
        self.with(|s| match &s.exists_error {
            Some(e) => Err(e.clone()),
            None => Ok(s.agents.iter().any(|a| a == name)),
        })
    }

    async fn get_node_labels(&self, name: &str) -> Result<Vec<String>, CiError> {
        self.record(format!("get_node_labels:{name}"));
        Ok(self.with(|s| s.labels.get(name).cloned().unwrap_or_default()))
    }

    async fn get_job_label_expression(&self, job_name: &str) -> Result<Option<String>, CiError> {
        self.record(format!("get_job_label_expression:{job_name}"));
        self.with(|s| {
            if let Some(e) = &s.job_error {
                return Err(e.clone());
            }
            s.jobs
                .get(job_name)
                .cloned()
                .ok_or_else(|| CiError::NotFound(job_name.to_string()))
        })
    }

    async fn delete_node(&self, name: &str) -> Result<(), CiError> {
        self.record(format!("delete_node:{name}"));
        self.with(|s| {
            s.agents.retain(|a| a != name);
            s.idle.remove(name);
        });
        Ok(())
    }
}

#[derive(Default)]
struct ProviderState {
    existing: HashSet<String>,
    destroy_errors: HashMap<String, ProviderError>,
    create_errors: HashMap<String, ProviderError>,
    purge_error: Option<ProviderError>,
    purge_count: usize,
    launched: usize,
    calls: Vec<String>,
}

pub struct FakeProvider {
    name: String,
    state: Mutex<ProviderState>,
}

impl FakeProvider {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: Mutex::new(ProviderState::default()),
        }
    }

    fn with<R>(&self, f: impl FnOnce(&mut ProviderState) -> R) -> R {
        let mut guard = self.state.lock().unwrap();
        f(&mut guard)
    }

    /// Nodes that exist at the provider; destroying anything else is `NodeNotFound`.
    pub fn add_node(&self, cloud_name: &str) {
        self.with(|s| s.existing.insert(cloud_name.to_string()));
    }

    pub fn fail_destroy(&self, cloud_name: &str, err: ProviderError) {
        self.with(|s| s.destroy_errors.insert(cloud_name.to_string(), err));
    }

    pub fn fail_create(&self, node_type: &str, err: ProviderError) {
        self.with(|s| s.create_errors.insert(node_type.to_string(), err));
    }

    pub fn fail_purge(&self, err: ProviderError) {
        self.with(|s| s.purge_error = Some(err));
    }

    pub fn set_purge_count(&self, count: usize) {
        self.with(|s| s.purge_count = count);
    }

    pub fn calls(&self) -> Vec<String> {
        self.with(|s| s.calls.clone())
    }
}

#[async_trait]
impl ProviderGateway for FakeProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn create_node(
        &self,
        node_type: &NodeType,
        count: u32,
    ) -> Result<Vec<LaunchedNode>, ProviderError> {
        self.with(|s| {
            s.calls.push(format!("create_node:{}:{count}", node_type.name));
            if let Some(e) = s.create_errors.get(&node_type.name) {
                return Err(e.clone());
            }
            let mut launched = Vec::new();
            for _ in 0..count {
                s.launched += 1;
                let id = format!("id{}", s.launched);
                let cloud_name = kiln_model::agent_name(&node_type.name, &id);
                s.existing.insert(cloud_name.clone());
                launched.push(LaunchedNode {
                    identifier: id,
                    cloud_name,
                    provider_id: Some(format!("srv-{}", s.launched)),
                });
            }
            Ok(launched)
        })
    }

    async fn destroy_node(&self, name: &str) -> Result<(), ProviderError> {
        self.with(|s| {
            s.calls.push(format!("destroy_node:{name}"));
            if let Some(e) = s.destroy_errors.get(name) {
                return Err(e.clone());
            }
            if s.existing.remove(name) {
                Ok(())
            } else {
                Err(ProviderError::NodeNotFound(name.to_string()))
            }
        })
    }

    async fn purge_error_state_nodes(&self) -> Result<usize, ProviderError> {
        self.with(|s| {
            s.calls.push("purge_error_state_nodes".into());
            match &s.purge_error {
                Some(e) => Err(e.clone()),
                None => Ok(s.purge_count),
            }
        })
    }
}

#[derive(Default)]
struct RegistryState {
    nodes: Vec<ManagedNode>,
    list_error: Option<RegistryError>,
    create_errors: HashMap<String, RegistryError>,
    calls: Vec<String>,
}

/// Registry double that applies mutations, so consecutive passes observe them.
#[derive(Default)]
pub struct FakeRegistry {
    state: Mutex<RegistryState>,
}

impl FakeRegistry {
    fn with<R>(&self, f: impl FnOnce(&mut RegistryState) -> R) -> R {
        let mut guard = self.state.lock().unwrap();
        f(&mut guard)
    }

    pub fn insert(&self, node: ManagedNode) {
        self.with(|s| s.nodes.push(node));
    }

    pub fn fail_list(&self, err: RegistryError) {
        self.with(|s| s.list_error = Some(err));
    }

    pub fn fail_create(&self, node_type: &str, err: RegistryError) {
        self.with(|s| s.create_errors.insert(node_type.to_string(), err));
    }

    pub fn node(&self, id: &str) -> Option<ManagedNode> {
        self.with(|s| s.nodes.iter().find(|n| n.identifier == id).cloned())
    }

    pub fn calls(&self) -> Vec<String> {
        self.with(|s| s.calls.clone())
    }

    fn mutate(
        &self,
        call: String,
        id: &str,
        f: impl FnOnce(&mut ManagedNode),
    ) -> Result<(), RegistryError> {
        self.with(|s| {
            s.calls.push(call);
            let node = s
                .nodes
                .iter_mut()
                .find(|n| n.identifier == id)
                .ok_or_else(|| RegistryError::NodeNotFound(id.to_string()))?;
            f(node);
            Ok(())
        })
    }
}

#[async_trait]
impl RegistryGateway for FakeRegistry {
    async fn list_nodes(&self) -> Result<Vec<ManagedNode>, RegistryError> {
        self.with(|s| match &s.list_error {
            Some(e) => Err(e.clone()),
            None => Ok(s.nodes.clone()),
        })
    }

    async fn mark_idle(&self, id: &str) -> Result<(), RegistryError> {
        self.mutate(format!("mark_idle:{id}"), id, |n| {
            n.idle_since.get_or_insert_with(SystemTime::now);
        })
    }

    async fn mark_active(&self, id: &str) -> Result<(), RegistryError> {
        self.mutate(format!("mark_active:{id}"), id, |n| n.idle_since = None)
    }

    async fn set_ci_name(&self, id: &str, ci_name: &str) -> Result<(), RegistryError> {
        self.mutate(format!("set_ci_name:{id}:{ci_name}"), id, |n| {
            n.ci_name = Some(ci_name.to_string())
        })
    }

    async fn delete(&self, id: &str) -> Result<(), RegistryError> {
        self.with(|s| {
            s.calls.push(format!("delete:{id}"));
            s.nodes.retain(|n| n.identifier != id);
        });
        Ok(())
    }

    async fn create_request(
        &self,
        node_type: &NodeType,
        count: u32,
    ) -> Result<usize, RegistryError> {
        self.with(|s| {
            s.calls.push(format!("create_request:{}:{count}", node_type.name));
            match s.create_errors.get(&node_type.name) {
                Some(e) => Err(e.clone()),
                None => Ok(count as usize),
            }
        })
    }
}

/// A registry record of the given type, created `created_at`.
pub fn managed(id: &str, node_type: &str, provider: &str, created_at: SystemTime) -> ManagedNode {
    ManagedNode {
        identifier: id.to_string(),
        node_type: node_type.to_string(),
        provider: provider.to_string(),
        cloud_name: kiln_model::agent_name(node_type, id),
        provider_id: None,
        ci_name: None,
        created_at,
        idle_since: None,
    }
}

use std::collections::BTreeMap;

/// Pending node requests per node type, built fresh for every provisioning pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Demand(BTreeMap<String, u32>);

impl Demand {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Count one more blocked task needing `node_type`.
    pub fn add(&mut self, node_type: impl Into<String>) {
        *self.0.entry(node_type.into()).or_insert(0) += 1;
    }

    pub fn get(&self, node_type: &str) -> u32 {
        self.0.get(node_type).copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of distinct node types requested.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Total number of requests across all node types.
    pub fn total(&self) -> u32 {
        self.0.values().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

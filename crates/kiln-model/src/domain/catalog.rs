use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::{ModelError, NodeType, SCRIPT_UUID_PLACEHOLDER};

/// Ordered catalog of configured node types.
///
/// Declaration order is significant: whenever several node types qualify for a request,
/// the one declared first wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Catalog(Vec<NodeType>);

impl Catalog {
    pub fn new(nodes: Vec<NodeType>) -> Self {
        Self(nodes)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over node types in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &NodeType> {
        self.0.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|n| n.name.as_str())
    }

    pub fn get(&self, name: &str) -> Option<&NodeType> {
        self.0.iter().find(|n| n.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Look up a catalog key.
    ///
    /// Returns the key itself when present verbatim. With `fallback`, returns the first
    /// catalog key embedded anywhere in `key`, so synthetic names such as
    /// `10.0.0.1__centos6__huge` still map to `centos6`.
    pub fn get_key(&self, key: &str, fallback: bool) -> Option<&str> {
        if key.is_empty() {
            return None;
        }
        if let Some(node) = self.get(key) {
            return Some(node.name.as_str());
        }
        if !fallback {
            return None;
        }
        self.names().find(|name| key.contains(name))
    }

    /// First node type advertising `label`.
    pub fn match_label(&self, label: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|n| n.has_label(label))
            .map(|n| n.name.as_str())
    }

    /// First node type advertising *all* of `labels`. An empty set matches nothing.
    pub fn match_labels<S: AsRef<str>>(&self, labels: &[S]) -> Option<&str> {
        if labels.is_empty() {
            return None;
        }
        self.0
            .iter()
            .find(|n| n.has_labels(labels))
            .map(|n| n.name.as_str())
    }

    /// Check the invariants an operator-supplied catalog must hold.
    pub fn validate(&self) -> Result<(), ModelError> {
        let mut seen = HashSet::new();
        for node in &self.0 {
            if node.name.trim().is_empty() {
                return Err(ModelError::EmptyName);
            }
            if !seen.insert(node.name.as_str()) {
                return Err(ModelError::DuplicateNodeType(node.name.clone()));
            }
            if node.provider.trim().is_empty() {
                return Err(ModelError::EmptyProvider(node.name.clone()));
            }
            if !node.script.contains(SCRIPT_UUID_PLACEHOLDER) {
                return Err(ModelError::MissingScriptPlaceholder {
                    node: node.name.clone(),
                    placeholder: SCRIPT_UUID_PLACEHOLDER,
                });
            }
        }
        Ok(())
    }
}

impl From<Vec<NodeType>> for Catalog {
    fn from(nodes: Vec<NodeType>) -> Self {
        Self::new(nodes)
    }
}

use serde::{Deserialize, Serialize};

/// Lifecycle state of a managed node, derived from its registry record.
///
/// `Pending -> (Idle | Active)`; a node is registered once it is either idle or active.
/// Removal is the absence of a record, so it has no variant here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeState {
    /// Created at the provider, not yet seen in the CI system.
    Pending,
    /// Registered and currently without work.
    Idle,
    /// Registered and building (or not yet reported idle).
    Active,
}

impl NodeState {
    /// Returns `true` once the node has joined the CI system.
    pub fn is_registered(&self) -> bool {
        matches!(self, NodeState::Idle | NodeState::Active)
    }
}

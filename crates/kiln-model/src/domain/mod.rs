mod node_type;
pub use node_type::{NodeType, SCRIPT_UUID_PLACEHOLDER};

mod catalog;
pub use catalog::Catalog;

mod blocked_task;
pub use blocked_task::{BlockedTask, job_from_url};

mod node_state;
pub use node_state::NodeState;

mod managed_node;
pub use managed_node::{LaunchedNode, ManagedNode};

mod demand;
pub use demand::Demand;

/// Registry identifier of a managed node (a v4 uuid rendered as a string).
pub type NodeId = String;

/// Name of a configured provider (the key of its `[providers.*]` table).
pub type ProviderName = String;

use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

use crate::{NodeId, NodeState, ProviderName, time_serde};

/// Registry record of a node launched by the controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagedNode {
    /// Registry identifier.
    pub identifier: NodeId,
    /// Catalog key the node was launched from.
    pub node_type: String,
    /// Provider the node lives in.
    pub provider: ProviderName,
    /// Name assigned at the provider.
    pub cloud_name: String,
    /// Provider-side identifier, when the provider reported one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,
    /// Agent name in the CI system, known once the node joined.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ci_name: Option<String>,
    #[serde(with = "time_serde")]
    pub created_at: SystemTime,
    /// First time the node was observed idle; cleared when seen active.
    #[serde(default, with = "time_serde::option")]
    pub idle_since: Option<SystemTime>,
}

impl ManagedNode {
    pub fn state(&self) -> NodeState {
        match (&self.ci_name, self.idle_since) {
            (None, _) => NodeState::Pending,
            (Some(_), Some(_)) => NodeState::Idle,
            (Some(_), None) => NodeState::Active,
        }
    }

    /// Time since creation; zero if the clock went backwards.
    pub fn age(&self, now: SystemTime) -> Duration {
        now.duration_since(self.created_at).unwrap_or_default()
    }

    /// How long the node has been idle, if it is.
    pub fn idle_for(&self, now: SystemTime) -> Option<Duration> {
        self.idle_since
            .map(|since| now.duration_since(since).unwrap_or_default())
    }
}

/// A node the provider has just launched, before it is recorded in the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchedNode {
    pub identifier: NodeId,
    pub cloud_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::UNIX_EPOCH;

    fn node(created: u64) -> ManagedNode {
        ManagedNode {
            identifier: "abc".into(),
            node_type: "centos6".into(),
            provider: "openstack".into(),
            cloud_name: "centos6__abc".into(),
            provider_id: None,
            ci_name: None,
            created_at: UNIX_EPOCH + Duration::from_secs(created),
            idle_since: None,
        }
    }

    #[test]
    fn state_is_derived() {
        let mut n = node(0);
        assert_eq!(n.state(), NodeState::Pending);
        assert!(!n.state().is_registered());

        n.ci_name = Some("centos6__abc".into());
        assert_eq!(n.state(), NodeState::Active);

        n.idle_since = Some(UNIX_EPOCH);
        assert_eq!(n.state(), NodeState::Idle);
        assert!(n.state().is_registered());
    }

    #[test]
    fn age_saturates_at_zero() {
        let n = node(1_000);
        assert_eq!(n.age(UNIX_EPOCH + Duration::from_secs(1_901)), Duration::from_secs(901));
        assert_eq!(n.age(UNIX_EPOCH), Duration::ZERO);
    }

    #[test]
    fn serde_roundtrip_keeps_timestamps() {
        let mut n = node(1_700_000_000);
        n.idle_since = Some(UNIX_EPOCH + Duration::from_secs(1_700_000_100));

        let json = serde_json::to_string(&n).unwrap();
        assert!(json.contains("\"createdAt\":1700000000"));
        assert!(!json.contains("ciName"));

        let back: ManagedNode = serde_json::from_str(&json).unwrap();
        assert_eq!(back, n);
    }
}

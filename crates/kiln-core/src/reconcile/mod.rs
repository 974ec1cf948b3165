//! The three periodic reconciliation procedures.
//!
//! Each procedure is a single pass over fresh snapshots of the external systems. A pass
//! never fails: external errors are logged and degrade to skipping the affected step, and
//! the next scheduled pass retries. Passes of the same or different procedures may overlap;
//! every mutation they request is idempotent.

mod idle;
mod orphan;
mod provision;

pub use idle::IdleReporter;
pub use orphan::OrphanReaper;
pub use provision::Provisioner;

use std::time::Duration;

use async_trait::async_trait;

use crate::metrics::{PassOutcome, Procedure};

/// Default age after which a node that never joined the CI system is destroyed.
pub const DEFAULT_ORPHAN_GRACE: Duration = Duration::from_secs(900);
/// Default time a node may stay idle before it is retired.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(2400);

/// A periodic reconciliation procedure.
#[async_trait]
pub trait Reconcile: Send + Sync + 'static {
    fn procedure(&self) -> Procedure;

    /// Run one pass to completion.
    async fn reconcile(&self) -> PassOutcome;
}

/// Thresholds shared by the reconcilers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileConfig {
    /// Nodes younger than this are still provisioning and never reaped.
    pub orphan_grace: Duration,
    /// Idle nodes are retired after this long; `None` keeps them forever.
    pub idle_timeout: Option<Duration>,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            orphan_grace: DEFAULT_ORPHAN_GRACE,
            idle_timeout: Some(DEFAULT_IDLE_TIMEOUT),
        }
    }
}

impl ReconcileConfig {
    pub fn with_orphan_grace(mut self, grace: Duration) -> Self {
        self.orphan_grace = grace;
        self
    }

    pub fn with_idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.idle_timeout = timeout;
        self
    }
}

use std::sync::Arc;

/// The three reconciliation procedures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Procedure {
    Provision,
    IdleCheck,
    OrphanReap,
}

impl Procedure {
    pub fn as_str(&self) -> &'static str {
        match self {
            Procedure::Provision => "provision",
            Procedure::IdleCheck => "idle_check",
            Procedure::OrphanReap => "orphan_reap",
        }
    }

    /// Supervisor slot name of the procedure's periodic task.
    pub fn slot(&self) -> &'static str {
        match self {
            Procedure::Provision => "kiln-provision",
            Procedure::IdleCheck => "kiln-idle-check",
            Procedure::OrphanReap => "kiln-orphan-reap",
        }
    }
}

/// How a reconciliation pass ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassOutcome {
    /// The pass looked at a non-empty snapshot.
    Completed,
    /// The snapshot was empty; nothing to do.
    Empty,
    /// An external query failed; nothing was mutated.
    Aborted,
}

impl PassOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            PassOutcome::Completed => "completed",
            PassOutcome::Empty => "empty",
            PassOutcome::Aborted => "aborted",
        }
    }
}

/// Why a node was destroyed at the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DestroyReason {
    /// Never joined the CI system within the grace period.
    Orphaned,
    /// Idle beyond the idle timeout.
    Idle,
    /// Found in error state by a provider purge.
    ErrorState,
}

impl DestroyReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DestroyReason::Orphaned => "orphaned",
            DestroyReason::Idle => "idle",
            DestroyReason::ErrorState => "error_state",
        }
    }
}

/// Sink for reconciliation metrics.
pub trait MetricsBackend: Send + Sync + 'static {
    fn record_pass(&self, procedure: Procedure, outcome: PassOutcome);
    fn record_requested(&self, node_type: &str, count: u32);
    fn record_unresolved(&self);
    fn record_destroyed(&self, provider: &str, reason: DestroyReason, count: usize);
}

pub type MetricsHandle = Arc<dyn MetricsBackend>;

/// Backend that drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl MetricsBackend for NoopMetrics {
    fn record_pass(&self, _: Procedure, _: PassOutcome) {}
    fn record_requested(&self, _: &str, _: u32) {}
    fn record_unresolved(&self) {}
    fn record_destroyed(&self, _: &str, _: DestroyReason, _: usize) {}
}

pub fn noop() -> MetricsHandle {
    Arc::new(NoopMetrics)
}

//! Reconciliation core of the kiln build-agent autoscaler.
//!
//! The crate turns blocked-queue reasons reported by the CI system into node-type demand
//! ([`resolve`], [`classify`]), and runs three periodic reconciliation procedures on top of it
//! ([`reconcile`]): queue-driven provisioning, idle reporting and orphan reaping.
//! External systems are reached only through the traits in [`gateway`].

pub mod error;
pub use error::{CiError, CoreError, ExprError, ProviderError, RegistryError};

pub mod gateway;
pub use gateway::{CiGateway, ProviderGateway, RegistryGateway};

pub mod resolve;
pub use resolve::{LabelExpr, ReasonKind, Resolution, is_stuck, resolve};

pub mod classify;
pub use classify::{Classification, QueueClassifier};

pub mod metrics;
pub use metrics::{DestroyReason, MetricsBackend, MetricsHandle, NoopMetrics, PassOutcome, Procedure};

pub mod reconcile;
pub use reconcile::{IdleReporter, OrphanReaper, Provisioner, Reconcile, ReconcileConfig};

pub mod router;
pub use router::ProviderRouter;

pub mod registry;
pub use registry::{CreationPolicy, NodeRegistry};

pub mod scheduler;
pub use scheduler::{Schedule, Scheduler, reconcile_task};

#[cfg(test)]
pub(crate) mod testing;

//! Periodic execution of the reconcilers under a taskvisor supervisor.
//!
//! Every reconciler gets its own supervised task that ticks at a fixed interval. A tick
//! that fires while the previous pass is still running is delayed, and cancellation is
//! only observed between passes.

use std::sync::Arc;
use std::time::Duration;

use taskvisor::{
    BackoffPolicy, SupervisorConfig, RestartPolicy, Subscribe, Supervisor, TaskError,
    TaskFn, TaskRef, TaskSpec,
};
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::CoreError;
use crate::reconcile::Reconcile;

/// Intervals between passes of each procedure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    pub queue_interval: Duration,
    pub idle_interval: Duration,
    pub orphan_interval: Duration,
}

impl Default for Schedule {
    fn default() -> Self {
        Self {
            queue_interval: Duration::from_secs(30),
            idle_interval: Duration::from_secs(30),
            orphan_interval: Duration::from_secs(120),
        }
    }
}

/// Reconcilers paired with their intervals.
#[derive(Default)]
pub struct Scheduler {
    entries: Vec<(Arc<dyn Reconcile>, Duration)>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, reconciler: Arc<dyn Reconcile>, every: Duration) -> Self {
        self.entries.push((reconciler, every));
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Supervised task specs, one per reconciler.
    pub fn specs(&self) -> Vec<TaskSpec> {
        self.entries
            .iter()
            .map(|(reconciler, every)| {
                TaskSpec::new(
                    reconcile_task(Arc::clone(reconciler), *every),
                    RestartPolicy::OnFailure,
                    BackoffPolicy::default(),
                    None,
                )
            })
            .collect()
    }

    /// Run until the supervisor shuts down (on SIGINT/SIGTERM).
    pub async fn run(self, subscribers: Vec<Arc<dyn Subscribe>>) -> Result<(), CoreError> {
        if self.entries.is_empty() {
            return Err(CoreError::Config("no reconcilers scheduled".into()));
        }
        let specs = self.specs();
        info!(tasks = specs.len(), "scheduler: starting reconcilers");

        let sup = Supervisor::builder(SupervisorConfig::default())
            .with_subscribers(subscribers)
            .build();
        sup.run(specs)
            .await
            .map_err(|e| CoreError::Supervisor(e.to_string()))
    }
}

/// Supervised task running `reconciler` every `every` until cancelled.
pub fn reconcile_task(reconciler: Arc<dyn Reconcile>, every: Duration) -> TaskRef {
    let slot = reconciler.procedure().slot();

    TaskFn::arc(slot, move |ctx: CancellationToken| {
        let reconciler = Arc::clone(&reconciler);
        async move { drive(reconciler, every, ctx).await }
    })
}

async fn drive(
    reconciler: Arc<dyn Reconcile>,
    every: Duration,
    ctx: CancellationToken,
) -> Result<(), TaskError> {
    let procedure = reconciler.procedure();
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ctx.cancelled() => return Err(TaskError::Canceled),
            _ = ticker.tick() => {}
        }
        let outcome = reconciler.reconcile().await;
        debug!(
            procedure = procedure.as_str(),
            outcome = outcome.as_str(),
            "scheduler: pass finished"
        );
    }
}

use std::borrow::Borrow;

use taskvisor::{Event, EventKind};
use tracing::{debug, error, info, trace, warn};

const SLOT_PREFIX: &str = "kiln-";

/// Accessors over a supervisor event with placeholders for absent fields.
pub trait View {
    fn task(&self) -> &str;
    /// The reconcile procedure behind the task's `kiln-` slot name.
    fn procedure(&self) -> &str {
        let task = self.task();
        task.strip_prefix(SLOT_PREFIX).unwrap_or(task)
    }
    fn reason(&self) -> Option<&str>;
    fn attempt(&self) -> u32;
    fn delay_ms(&self) -> u32;
    fn timeout_ms(&self) -> u32;
    fn kind(&self) -> EventKind;
}

impl<T: Borrow<Event>> View for T {
    fn task(&self) -> &str {
        self.borrow().task.as_deref().unwrap_or("unknown")
    }
    fn reason(&self) -> Option<&str> {
        self.borrow().reason.as_deref()
    }
    fn attempt(&self) -> u32 {
        self.borrow().attempt.unwrap_or(0)
    }
    fn delay_ms(&self) -> u32 {
        self.borrow().delay_ms.unwrap_or(0)
    }
    fn timeout_ms(&self) -> u32 {
        self.borrow().timeout_ms.unwrap_or(0)
    }
    fn kind(&self) -> EventKind {
        self.borrow().kind
    }
}

pub fn message_for(kind: EventKind) -> &'static str {
    match kind {
        EventKind::TaskAddRequested => "scheduler: loop registration requested",
        EventKind::TaskAdded => "scheduler: loop registered",
        EventKind::TaskRemoveRequested => "scheduler: loop removal requested",
        EventKind::TaskRemoved => "scheduler: loop removed",

        EventKind::ShutdownRequested => "scheduler: shutdown requested",
        EventKind::AllStoppedWithinGrace => "scheduler: all loops stopped",
        EventKind::GraceExceeded => "scheduler: loops still running after grace period",

        EventKind::SubscriberOverflow => "scheduler: event dropped, subscriber queue full",
        EventKind::SubscriberPanicked => "scheduler: event subscriber panicked",

        EventKind::ActorExhausted => "scheduler: loop will not be restarted",
        EventKind::ActorDead => "scheduler: loop died",

        EventKind::TaskStarting => "scheduler: loop starting",
        EventKind::TaskStopped => "scheduler: loop stopped",
        EventKind::TaskFailed => "scheduler: loop failed",
        EventKind::TimeoutHit => "scheduler: loop timed out",
        EventKind::BackoffScheduled => "scheduler: loop restart scheduled",

        EventKind::ControllerRejected => "scheduler: submission rejected",
        EventKind::ControllerSubmitted => "scheduler: submission accepted",
        EventKind::ControllerSlotTransition => "scheduler: slot transition",
    }
}

pub fn log_event<E: View>(e: E) {
    let msg = message_for(e.kind());
    let procedure = e.procedure();
    let reason = e.reason().unwrap_or("none");

    match e.kind() {
        EventKind::TaskAddRequested
        | EventKind::TaskRemoveRequested
        | EventKind::TaskRemoved
        | EventKind::TaskStopped
        | EventKind::ControllerSubmitted => trace!(procedure, "{msg}"),
        EventKind::TaskAdded | EventKind::ControllerSlotTransition => debug!(procedure, "{msg}"),

        EventKind::ShutdownRequested | EventKind::AllStoppedWithinGrace => info!("{msg}"),
        EventKind::GraceExceeded => warn!("{msg}"),

        EventKind::TaskStarting => info!(procedure, attempt = e.attempt(), "{msg}"),
        EventKind::BackoffScheduled => debug!(
            procedure,
            attempt = e.attempt(),
            delay_ms = e.delay_ms(),
            reason,
            "{msg}"
        ),
        EventKind::TimeoutHit => warn!(procedure, timeout_ms = e.timeout_ms(), "{msg}"),
        EventKind::ControllerRejected => warn!(procedure, reason, "{msg}"),

        EventKind::TaskFailed => error!(procedure, attempt = e.attempt(), reason, "{msg}"),
        EventKind::ActorExhausted
        | EventKind::ActorDead
        | EventKind::SubscriberOverflow
        | EventKind::SubscriberPanicked => error!(procedure, reason, "{msg}"),
    }
}

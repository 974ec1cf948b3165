use async_trait::async_trait;
use taskvisor::{Event, Subscribe};

use crate::LoggerConfig;
use crate::subscriber::view::log_event;

const DEFAULT_QUEUE: usize = 1024;

/// Logs every supervisor event of the reconcile loops.
#[derive(Debug)]
pub struct Journal {
    queue: usize,
}

impl Journal {
    pub fn new() -> Self {
        Self::with_queue(DEFAULT_QUEUE)
    }

    /// A zero-sized queue is bumped to one slot.
    pub fn with_queue(queue: usize) -> Self {
        Self { queue: queue.max(1) }
    }

    pub fn from_config(cfg: &LoggerConfig) -> Self {
        Self::with_queue(cfg.event_queue)
    }
}

impl Default for Journal {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Subscribe for Journal {
    async fn on_event(&self, event: &Event) {
        log_event(event);
    }

    fn name(&self) -> &'static str {
        "kiln-journal"
    }

    fn queue_capacity(&self) -> usize {
        self.queue
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_follows_logging_section() {
        let mut cfg = LoggerConfig::default();
        assert_eq!(Journal::from_config(&cfg).queue_capacity(), 1024);

        cfg.event_queue = 64;
        assert_eq!(Journal::from_config(&cfg).queue_capacity(), 64);

        cfg.event_queue = 0;
        assert_eq!(Journal::from_config(&cfg).queue_capacity(), 1);
    }
}

//! # Notify Configuration
//!
//! Tuning for the dispatcher and scheduler. The daemon fills this from the
//! environment; tests use the defaults.

use std::time::Duration;

/// Dispatcher and scheduler settings.
#[derive(Debug, Clone)]
pub struct NotifyConfig {
    /// Worker tasks draining the SMS queue.
    pub workers: usize,

    /// Bound of the SMS queue; events beyond it are dropped.
    pub queue_capacity: usize,

    /// Per-request timeout for provider calls.
    pub provider_timeout: Duration,

    /// How often the scheduler looks for due repairs.
    pub scheduler_tick: Duration,

    /// Local hour at or after which the daily broadcast runs.
    pub broadcast_hour: u32,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        NotifyConfig {
            workers: 4,
            queue_capacity: 1024,
            provider_timeout: Duration::from_secs(10),
            scheduler_tick: Duration::from_secs(60),
            broadcast_hour: 8,
        }
    }
}

impl NotifyConfig {
    /// At least one worker and a non-empty queue.
    pub fn normalized(mut self) -> Self {
        self.workers = self.workers.max(1);
        self.queue_capacity = self.queue_capacity.max(1);
        self.broadcast_hour = self.broadcast_hour.min(23);
        self
    }
}

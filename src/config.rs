use std::time::Duration;

/// Trailing log window kept when retrying an oversized persist.
const LOG_RETRY_BYTES: usize = 65_536;

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Interval at which the dispatch loop re-raises its own ready signal.
    /// Recovers from dropped signals and from capacity freed outside the
    /// scheduler's view.
    pub poll_interval: Duration,
    /// Log bytes kept when a terminal persist fails and is retried once.
    pub log_retry_bytes: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(60),
            log_retry_bytes: LOG_RETRY_BYTES,
        }
    }
}

impl SchedulerConfig {
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

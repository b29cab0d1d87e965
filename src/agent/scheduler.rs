use chrono::{DateTime, Utc};
use rand::Rng;
use std::time::Duration;
use tokio::time::sleep;

/// Polling scheduler with jitter
///
/// A fixed interval is easy to pick out on the network, so each wait is drawn
/// uniformly from `[interval / 2, interval * 3 / 2)`. The mean stays at
/// `interval`.
#[derive(Debug, Clone, Copy)]
pub struct PollingScheduler {
    base_interval: Duration,
}

impl PollingScheduler {
    /// Create a new polling scheduler around `base_interval`
    pub fn new(base_interval: Duration) -> Self {
        Self { base_interval }
    }

    pub fn base_interval(&self) -> Duration {
        self.base_interval
    }

    /// Calculate the next sleep interval with jitter
    pub fn next_wait(&self) -> Duration {
        let nanos = u64::try_from(self.base_interval.as_nanos()).unwrap_or(u64::MAX);
        if nanos == 0 {
            return Duration::ZERO;
        }

        let offset = rand::thread_rng().gen_range(0..nanos);
        Duration::from_nanos(nanos / 2 + offset)
    }

    /// Wall-clock time after waiting `wait`
    pub fn next_poll_time(wait: Duration) -> DateTime<Utc> {
        let wait = chrono::Duration::from_std(wait).unwrap_or(chrono::Duration::MAX);
        Utc::now().checked_add_signed(wait).unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Sleep for `wait`
    pub async fn sleep(wait: Duration) {
        tracing::debug!("Sleeping for {} seconds until next poll", wait.as_secs());
        sleep(wait).await;
    }
}

impl Default for PollingScheduler {
    fn default() -> Self {
        Self::new(Duration::from_secs(60))
    }
}

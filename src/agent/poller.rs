use anyhow::Context;
use std::time::Duration;
use thiserror::Error;

use super::fetcher::{ConditionalFetcher, FetchError};
use super::scheduler::PollingScheduler;

/// Operation tag for errors from fetching the cloud config
pub const FETCH_CLOUD_CONFIG_OP: &str = "fetch-cloud-config";

/// Operation tag for errors from merging fetched bytes
pub const MERGE_CLOUD_CONFIG_OP: &str = "merge-cloud-config";

/// A config object that knows where its cloud copy lives and can merge it in
pub trait CloudConfigSource {
    /// Primary cloud config URL, empty if none is configured
    fn cloud_config_url(&self) -> &str;

    /// Alternate (fronted) cloud config URL, may be empty
    fn fronted_cloud_config_url(&self) -> &str;

    /// Merge raw config bytes fetched from the cloud
    fn update_from_bytes(&mut self, bytes: &[u8]) -> anyhow::Result<()>;
}

/// What the owner of the config should do after a poll
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub enum ConfigUpdate {
    /// Nothing new, leave the config alone
    NoChange,
    /// Merge these raw config bytes
    Merge(Vec<u8>),
}

impl ConfigUpdate {
    pub fn is_no_change(&self) -> bool {
        matches!(self, ConfigUpdate::NoChange)
    }

    /// Apply the update to `config`
    ///
    /// Returns whether anything was merged. Callers must not apply two
    /// updates to the same config concurrently.
    pub fn apply<C: CloudConfigSource + ?Sized>(self, config: &mut C) -> anyhow::Result<bool> {
        match self {
            ConfigUpdate::NoChange => Ok(false),
            ConfigUpdate::Merge(bytes) => {
                tracing::debug!("Merging cloud configuration");
                config.update_from_bytes(&bytes).context(MERGE_CLOUD_CONFIG_OP)?;
                Ok(true)
            }
        }
    }
}

/// A failed poll, tagged with the operation that failed
#[derive(Debug, Error)]
#[error("{op}")]
pub struct PollError {
    pub op: &'static str,
    #[source]
    pub source: FetchError,
}

/// Result of one poll cycle
#[derive(Debug)]
pub struct PollOutcome {
    /// How long to wait before the next poll, always set
    pub wait: Duration,
    /// The update to apply, or why the fetch failed
    pub result: Result<ConfigUpdate, PollError>,
}

/// Polls the cloud config once per cycle
///
/// The poller never touches the live config. It reads the URLs from the
/// current snapshot and hands back a [`ConfigUpdate`] for the owner to apply.
pub struct ConfigPoller {
    fetcher: ConditionalFetcher,
    scheduler: PollingScheduler,
}

impl ConfigPoller {
    pub fn new(fetcher: ConditionalFetcher, scheduler: PollingScheduler) -> Self {
        Self { fetcher, scheduler }
    }

    pub fn fetcher(&self) -> &ConditionalFetcher {
        &self.fetcher
    }

    /// Run one poll cycle against `current`
    ///
    /// Nothing is fetched when `current` has no cloud config URL or when
    /// `sticky` is set. A failed fetch is reported in the outcome; the caller
    /// should simply try again after `wait`.
    pub async fn poll_once<C: CloudConfigSource + ?Sized>(&mut self, current: &C, sticky: bool) -> PollOutcome {
        tracing::debug!("Polling for config");

        let wait = self.scheduler.next_wait();
        let result = self.fetch_update(current, sticky).await;

        PollOutcome { wait, result }
    }

    async fn fetch_update<C: CloudConfigSource + ?Sized>(
        &mut self,
        current: &C,
        sticky: bool,
    ) -> Result<ConfigUpdate, PollError> {
        let url = current.cloud_config_url();
        if url.is_empty() {
            tracing::debug!("No cloud config URL");
            return Ok(ConfigUpdate::NoChange);
        }

        if sticky {
            tracing::debug!("Not downloading remote config with sticky config flag set");
            return Ok(ConfigUpdate::NoChange);
        }

        let fetched = self
            .fetcher
            .fetch(url, current.fronted_cloud_config_url())
            .await
            .map_err(|source| PollError {
                op: FETCH_CLOUD_CONFIG_OP,
                source,
            })?;

        match fetched {
            Some(bytes) => Ok(ConfigUpdate::Merge(bytes)),
            None => {
                tracing::debug!("Config not modified");
                Ok(ConfigUpdate::NoChange)
            }
        }
    }
}

use anyhow::Result;
use std::future::Future;
use std::sync::Arc;

use super::{
    AgentConfig, ConditionalFetcher, ConfigPoller, PollOutcome, PollingScheduler, ReqwestTransport,
    StaticIdentity,
};
use crate::live::LiveConfig;

/// Build a poller wired to the real HTTP transport
pub fn build_poller(config: &AgentConfig) -> Result<ConfigPoller> {
    let transport = ReqwestTransport::new(config.agent.request_timeout())?;
    let identity = StaticIdentity::from(&config.identity);

    let fetcher = ConditionalFetcher::new(Arc::new(identity), Arc::new(transport))
        .with_headers(&config.headers)?;

    Ok(ConfigPoller::new(
        fetcher,
        PollingScheduler::new(config.agent.poll_interval()),
    ))
}

/// Run the agent daemon in a loop until Ctrl-C
pub async fn run_agent_daemon(config: AgentConfig) -> Result<()> {
    tracing::info!("Starting agent daemon");
    tracing::info!("Cloud config URL: {}", config.cloud.config_url);
    tracing::info!("Fronted config URL: {}", config.cloud.fronted_url);
    tracing::info!(
        "Poll interval: {} seconds (±50% jitter)",
        config.agent.poll_interval
    );

    if config.agent.sticky {
        tracing::info!("Sticky config enabled, remote config will not be fetched");
    }

    let mut poller = build_poller(&config)?;
    let mut live = LiveConfig::from_agent_config(&config);

    run_poll_loop(&mut poller, &mut live, config.agent.sticky, shutdown_signal()).await;
    Ok(())
}

/// Poll and apply until `shutdown` completes
///
/// `shutdown` is raced against both the fetch and the sleep, so a signal
/// during a slow request still stops the loop.
pub async fn run_poll_loop<F>(
    poller: &mut ConfigPoller,
    live: &mut LiveConfig,
    sticky: bool,
    shutdown: F,
) where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    loop {
        let outcome = tokio::select! {
            outcome = poller.poll_once(&*live, sticky) => outcome,
            _ = &mut shutdown => break,
        };
        let wait = outcome.wait;
        apply_outcome(live, outcome);

        let next_check = PollingScheduler::next_poll_time(wait);
        tracing::debug!("Next check at: {}", next_check.format("%Y-%m-%d %H:%M:%S %Z"));

        tokio::select! {
            _ = PollingScheduler::sleep(wait) => {}
            _ = &mut shutdown => break,
        }
    }

    tracing::info!("Shutting down agent daemon");
}

/// Resolves on the first Ctrl-C
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}

/// Poll once and apply the result to `live`
///
/// Returns whether the config changed.
pub async fn check_and_apply_once(
    poller: &mut ConfigPoller,
    live: &mut LiveConfig,
    sticky: bool,
) -> Result<bool> {
    let outcome = poller.poll_once(&*live, sticky).await;
    let update = outcome.result?;
    update.apply(live)
}

/// Apply a poll outcome, logging failures
///
/// A failed cycle never stops the daemon, the next poll is the retry.
fn apply_outcome(live: &mut LiveConfig, outcome: PollOutcome) {
    let update = match outcome.result {
        Ok(update) => update,
        Err(e) => {
            tracing::error!("Failed to fetch cloud config: {:#}", anyhow::Error::new(e));
            return;
        }
    };

    match update.apply(live) {
        Ok(true) => tracing::info!("Cloud config updated and applied successfully"),
        Ok(false) => tracing::debug!("Cloud config unchanged"),
        Err(e) => tracing::error!("Failed to apply cloud config: {:#}", e),
    }
}

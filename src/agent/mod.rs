// Agent module for cloud config polling
//
// The agent periodically fetches a gzipped YAML config over HTTP. It uses
// conditional requests so an unchanged config is never downloaded twice, and
// names a fronted URL so a local proxy can race an alternate delivery path.

mod config;
mod daemon;
mod fetcher;
mod identity;
mod poller;
mod scheduler;
mod transport;

#[cfg(test)]
mod test_support;

pub use config::{
    AgentConfig, AgentSettings, CloudSettings, DEFAULT_CLOUD_CONFIG_URL,
    DEFAULT_FRONTED_CLOUD_CONFIG_URL, IdentityConfig, LoggingConfig, WireHeaders,
    get_agent_config_path,
};
pub use daemon::{build_poller, check_and_apply_once, run_agent_daemon, run_poll_loop};
pub use fetcher::{ConditionalFetcher, FetchError};
pub use identity::{AnonymousIdentity, StaticIdentity, UserIdentity};
pub use poller::{
    CloudConfigSource, ConfigPoller, ConfigUpdate, FETCH_CLOUD_CONFIG_OP, MERGE_CLOUD_CONFIG_OP,
    PollError, PollOutcome,
};
pub use scheduler::PollingScheduler;
pub use transport::{HttpTransport, ReqwestTransport, TransportError};

use anyhow::{Context, Result};
use std::path::Path;

use cloudconf_agent::agent::{self, AgentConfig, CloudConfigSource, CloudSettings, IdentityConfig};
use cloudconf_agent::live::LiveConfig;

use crate::cli::{Args, Commands};

use super::utils::{format_duration, init_logging, redact};

/// Dispatch a parsed command line
pub fn run_agent_command(args: Args) -> Result<()> {
    let config_path = match args.config {
        Some(path) => path,
        None => agent::get_agent_config_path()?,
    };

    match args.command {
        Commands::Setup { url, fronted_url, poll_interval, user_id, token } => {
            init_logging(args.verbose, None);
            setup(&config_path, url, fronted_url, poll_interval, user_id, token)
        }
        Commands::Start => {
            let config = load_config(&config_path)?;
            init_logging(args.verbose, Some(&config.logging.level));
            start(config)
        }
        Commands::CheckNow { sticky } => {
            let config = load_config(&config_path)?;
            init_logging(args.verbose, Some(&config.logging.level));
            check_now(config, sticky)
        }
        Commands::ShowConfig => {
            let config = load_config(&config_path)?;
            show_config(&config_path, &config);
            Ok(())
        }
    }
}

fn load_config(path: &Path) -> Result<AgentConfig> {
    AgentConfig::load(path).with_context(|| {
        format!(
            "Agent not configured. Run: cloudconf-agent setup --url <URL> (looked in {})",
            path.display()
        )
    })
}

/// Write the agent configuration
fn setup(
    config_path: &Path,
    url: String,
    fronted_url: String,
    poll_interval: u64,
    user_id: Option<String>,
    token: Option<String>,
) -> Result<()> {
    println!("Cloud Config Agent - Setup");
    println!("Version: {}", env!("CARGO_PKG_VERSION"));
    println!();

    let mut config = AgentConfig {
        cloud: CloudSettings {
            config_url: url,
            fronted_url,
        },
        identity: IdentityConfig { user_id, token },
        ..AgentConfig::default()
    };
    config.agent.poll_interval = poll_interval;

    config.validate().context("Invalid configuration")?;

    config.save(config_path)?;
    println!("✓ Configuration saved to: {}", config_path.display());
    println!();
    println!("Next steps:");
    println!("  cloudconf-agent check-now   # fetch once");
    println!("  cloudconf-agent start       # run the daemon");

    Ok(())
}

/// Run the agent daemon
fn start(config: AgentConfig) -> Result<()> {
    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    runtime.block_on(agent::run_agent_daemon(config))
}

/// Run a single poll cycle and print the result
fn check_now(config: AgentConfig, sticky: bool) -> Result<()> {
    let sticky = sticky || config.agent.sticky;
    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;

    runtime.block_on(async {
        let mut poller = agent::build_poller(&config)?;
        let mut live = LiveConfig::from_agent_config(&config);

        println!("Checking {}...", live.cloud_config_url());
        let applied = agent::check_and_apply_once(&mut poller, &mut live, sticky)
            .await
            .context("Cloud config check failed")?;

        if applied {
            println!("✓ Cloud config fetched");
            println!();
            print!("{}", live.to_yaml()?);
        } else if sticky {
            println!("Sticky config set, nothing fetched");
        } else {
            println!("Cloud config unchanged");
        }

        Ok::<(), anyhow::Error>(())
    })
}

/// Show the agent configuration
fn show_config(config_path: &Path, config: &AgentConfig) {
    println!("Config file:      {}", config_path.display());
    if config.cloud.config_url.is_empty() {
        println!("Cloud config URL: (none, remote fetching off)");
    } else {
        println!("Cloud config URL: {}", config.cloud.config_url);
    }
    if config.cloud.fronted_url.is_empty() {
        println!("Fronted URL:      (none)");
    } else {
        println!("Fronted URL:      {}", config.cloud.fronted_url);
    }
    println!(
        "Poll interval:    {} (±50% jitter)",
        format_duration(config.agent.poll_interval())
    );
    println!("Sticky:           {}", config.agent.sticky);
    println!(
        "User ID:          {}",
        config.identity.user_id.as_deref().unwrap_or("(none)")
    );
    println!(
        "Token:            {}",
        config.identity.token.as_deref().map(redact).unwrap_or_else(|| "(none)".to_string())
    );
}

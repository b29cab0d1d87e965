use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Cloud Config Agent
///
/// Periodically fetches the cloud config over HTTP, using conditional
/// requests and a jittered poll interval.
#[derive(Parser, Debug)]
#[command(name = "cloudconf-agent")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to the agent configuration file (defaults to the platform path)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write the agent configuration
    Setup {
        /// Primary cloud config URL
        #[arg(long)]
        url: String,

        /// Fronted cloud config URL (empty disables the fallback path)
        #[arg(long, default_value = "")]
        fronted_url: String,

        /// Polling interval in seconds
        #[arg(long, default_value = "60")]
        poll_interval: u64,

        /// User ID sent with each request
        #[arg(long)]
        user_id: Option<String>,

        /// Access token sent with each request
        #[arg(long)]
        token: Option<String>,
    },
    /// Start the agent daemon
    Start,
    /// Fetch the cloud config now (don't wait for next poll)
    CheckNow {
        /// Skip the remote fetch, as if sticky config were set
        #[arg(long)]
        sticky: bool,
    },
    /// Show the agent configuration
    ShowConfig,
}

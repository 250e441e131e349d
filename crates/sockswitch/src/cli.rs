//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use sockswitch_core::PlatformKind;

/// Point the desktop (or a browser) at a SOCKS5 proxy and answer its auth challenges
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Configuration file (.toml or .json)
    #[arg(
        short = 'c',
        long,
        value_name = "FILE",
        env = "SOCKSWITCH_CONFIG",
        default_value = "sockswitch.toml",
        global = true
    )]
    pub config: PathBuf,

    /// Override the state file location
    #[arg(long, value_name = "FILE", env = "SOCKSWITCH_STATE", global = true)]
    pub state: Option<PathBuf>,

    /// Override the proxy settings backend (detached, gsettings)
    #[arg(long, value_name = "NAME", global = true)]
    pub platform: Option<PlatformKind>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Route traffic through a SOCKS5 proxy (missing fields come from the saved state)
    Connect(ConnectArgs),
    /// Go back to direct connections
    Disconnect,
    /// Show connection status
    Status {
        /// Print the raw state record as JSON
        #[arg(long)]
        json: bool,
    },
    /// Dismiss the last recorded error
    ClearError,
    /// Forget the saved host, port and credentials
    Forget,
    /// Speak the JSON message protocol on stdin/stdout
    Serve,
}

#[derive(clap::Args, Debug, Default)]
pub struct ConnectArgs {
    /// Proxy host or IP
    #[arg(long)]
    pub host: Option<String>,

    /// Proxy port (1-65535)
    #[arg(short, long)]
    pub port: Option<String>,

    /// Username for proxy authentication
    #[arg(short, long)]
    pub username: Option<String>,

    /// Password for proxy authentication
    #[arg(long, env = "SOCKSWITCH_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,
}

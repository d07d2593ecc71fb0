//! touchlink CLI - client and test server for the remote input protocol
//!
//! # Commands
//!
//! - `touchlink discover` - List input servers advertised on the LAN
//! - `touchlink ping` - Connect and report round-trip latency
//! - `touchlink send` - Send a reliable key press + release
//! - `touchlink serve` - Run a responder that logs delivered input
//! - `touchlink config` - Show or edit the saved client configuration
//!
//! # Usage
//!
//! ```bash
//! # Find servers, then measure latency to one of them
//! touchlink discover --seconds 3
//! touchlink ping 192.168.1.20 --count 5
//!
//! # Remember a server so the address can be omitted
//! touchlink config --set-host 192.168.1.20
//! touchlink send space --extreme
//! ```

mod config;
mod discover;
mod ping;
mod send;
mod serve;

use anyhow::Result;
use clap::{Parser, Subcommand};

/// touchlink CLI - remote touch input over UDP
#[derive(Parser)]
#[command(name = "touchlink")]
#[command(about = "Client and test server for the touchlink input protocol")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List input servers advertised on the LAN
    Discover(discover::DiscoverArgs),

    /// Connect to a server and report round-trip latency
    Ping(ping::PingArgs),

    /// Send a reliable key press and release
    Send(send::SendArgs),

    /// Run a responder that acknowledges and logs input
    Serve(serve::ServeArgs),

    /// Show or edit the saved client configuration
    Config(config::ConfigArgs),
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Discover(args) => discover::execute(args),
        Commands::Ping(args) => ping::execute(args),
        Commands::Send(args) => send::execute(args),
        Commands::Serve(args) => serve::execute(args),
        Commands::Config(args) => config::execute(args),
    }
}

/// Split `host[:port]` using the saved config for whatever is missing
pub(crate) fn resolve_target(target: Option<&str>) -> Result<(String, u16)> {
    let saved = touchlink_core::ClientConfig::load().server;

    let Some(target) = target else {
        if saved.address().is_none() {
            anyhow::bail!("no server given and none saved; pass an address or run `touchlink config --set-host`");
        }
        return Ok((saved.host, saved.port));
    };

    // Bracketed IPv6 with port, or a single colon meaning host:port
    if let Some(rest) = target.strip_prefix('[') {
        if let Some((host, port)) = rest.split_once("]:") {
            return Ok((host.to_string(), parse_port(port)?));
        }
        return Ok((rest.trim_end_matches(']').to_string(), saved.port));
    }
    match target.rsplit_once(':') {
        Some((host, port)) if !host.contains(':') => Ok((host.to_string(), parse_port(port)?)),
        _ => Ok((target.to_string(), saved.port)),
    }
}

fn parse_port(port: &str) -> Result<u16> {
    port.parse()
        .map_err(|_| anyhow::anyhow!("invalid port '{}'", port))
}

/// Build a connected session with the saved input settings
pub(crate) fn connect(target: Option<&str>, extreme: bool) -> Result<touchlink_core::SessionController> {
    let (host, port) = resolve_target(target)?;
    let session = touchlink_core::SessionController::from_config(&touchlink_core::ClientConfig::load());
    if extreme {
        session.set_extreme_mode(true);
    }

    if !session.connect(&host, port) {
        anyhow::bail!("{}", session.state().status);
    }
    Ok(session)
}

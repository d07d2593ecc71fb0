//! Discover command - list input servers advertised on the LAN

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use touchlink_core::DiscoveryService;

/// Arguments for the discover command
#[derive(Args)]
pub struct DiscoverArgs {
    /// How long to browse before printing results
    #[arg(short, long, default_value = "3")]
    pub seconds: u64,

    /// Also list advertisements that have not resolved yet
    #[arg(long)]
    pub all: bool,
}

pub fn execute(args: DiscoverArgs) -> Result<()> {
    let mut discovery = DiscoveryService::new();
    discovery.start().context("Failed to start discovery")?;

    println!("Browsing for {} seconds...", args.seconds);
    std::thread::sleep(Duration::from_secs(args.seconds));

    let peers = if args.all {
        discovery.peers()
    } else {
        discovery.resolved_peers()
    };
    discovery.stop();

    if peers.is_empty() {
        println!("No servers found");
        return Ok(());
    }

    for peer in peers {
        if peer.is_resolved() {
            println!("  {:<32} {}:{}", peer.name, peer.host, peer.port);
        } else {
            println!("  {:<32} (resolving)", peer.name);
        }
    }
    Ok(())
}

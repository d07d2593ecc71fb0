//! Config command - show or edit the saved client configuration

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use touchlink_core::config::{config_path, ClientConfig};

#[derive(Clone, Copy, ValueEnum)]
pub enum Toggle {
    On,
    Off,
}

/// Arguments for the config command
#[derive(Args)]
pub struct ConfigArgs {
    /// Server host name or address
    #[arg(long)]
    pub set_host: Option<String>,

    /// Server port
    #[arg(long)]
    pub set_port: Option<u16>,

    /// Binary encoding with joystick throttling
    #[arg(long, value_enum)]
    pub extreme: Option<Toggle>,

    /// Joystick smoothing factor (0-1)
    #[arg(long)]
    pub smoothing: Option<f32>,
}

impl ConfigArgs {
    fn has_changes(&self) -> bool {
        self.set_host.is_some()
            || self.set_port.is_some()
            || self.extreme.is_some()
            || self.smoothing.is_some()
    }
}

pub fn execute(args: ConfigArgs) -> Result<()> {
    let mut config = ClientConfig::load();

    if args.has_changes() {
        if let Some(host) = args.set_host {
            config.server.host = host.trim().to_string();
        }
        if let Some(port) = args.set_port {
            config.server.port = port;
        }
        if let Some(toggle) = args.extreme {
            config.input.extreme_mode = matches!(toggle, Toggle::On);
        }
        if let Some(smoothing) = args.smoothing {
            if !(0.0..=1.0).contains(&smoothing) {
                anyhow::bail!("smoothing must be between 0 and 1");
            }
            config.input.smoothing = smoothing;
        }

        let path = config.save().context("Failed to save config")?;
        println!("Saved {}", path.display());
    }

    show(&config);
    Ok(())
}

fn show(config: &ClientConfig) {
    if let Some(path) = config_path() {
        println!("Config file: {}", path.display());
    }
    println!(
        "  server:       {}",
        config.server.address().unwrap_or_else(|| "(not set)".to_string())
    );
    println!("  extreme mode: {}", if config.input.extreme_mode { "on" } else { "off" });
    println!("  smoothing:    {:.2}", config.input.smoothing());
}

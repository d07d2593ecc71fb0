//! Send command - deliver a reliable key press and release

use std::time::{Duration, Instant};

use anyhow::Result;
use clap::Args;
use touchlink_core::Modifiers;

/// How long to wait for both acknowledgments
const ACK_WAIT: Duration = Duration::from_secs(1);

/// Arguments for the send command
#[derive(Args)]
pub struct SendArgs {
    /// Key name understood by the server (e.g. `space`, `q`, `mouse_left`)
    pub key: String,

    /// Server as host[:port] (defaults to the saved server)
    pub addr: Option<String>,

    /// Use binary frames instead of text records
    #[arg(long)]
    pub extreme: bool,

    /// Hold shift
    #[arg(long)]
    pub shift: bool,

    /// Hold control
    #[arg(long)]
    pub ctrl: bool,

    /// Hold alt
    #[arg(long)]
    pub alt: bool,

    /// Hold command
    #[arg(long)]
    pub cmd: bool,
}

pub fn execute(args: SendArgs) -> Result<()> {
    let modifiers = Modifiers {
        shift: args.shift,
        control: args.ctrl,
        alt: args.alt,
        command: args.cmd,
    };

    let session = crate::connect(args.addr.as_deref(), args.extreme)?;
    session.send_button(&args.key, true, modifiers);
    session.send_button(&args.key, false, modifiers);

    let deadline = Instant::now() + ACK_WAIT;
    while session.reliability_stats().pending > 0 && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(10));
    }

    let stats = session.reliability_stats();
    session.disconnect();

    if stats.acknowledged < 2 {
        anyhow::bail!(
            "server did not acknowledge '{}' ({} retransmissions)",
            args.key,
            stats.retransmissions
        );
    }

    if modifiers.is_empty() {
        println!("Sent '{}' ({} retransmissions)", args.key, stats.retransmissions);
    } else {
        println!("Sent {}+{} ({} retransmissions)", modifiers, args.key, stats.retransmissions);
    }
    Ok(())
}

//! Ping command - connect and report round-trip latency

use std::time::Duration;

use anyhow::Result;
use clap::Args;
use touchlink_core::link::HEARTBEAT_INTERVAL;
use touchlink_core::LinkState;

/// Arguments for the ping command
#[derive(Args)]
pub struct PingArgs {
    /// Server as host[:port] (defaults to the saved server)
    pub addr: Option<String>,

    /// Number of heartbeat periods to report
    #[arg(short, long, default_value = "4")]
    pub count: u32,

    /// Use binary frames instead of text records
    #[arg(long)]
    pub extreme: bool,
}

pub fn execute(args: PingArgs) -> Result<()> {
    let session = crate::connect(args.addr.as_deref(), args.extreme)?;
    println!(
        "Probing {} ({:?} encoding)",
        session.peer_addr().map(|a| a.to_string()).unwrap_or_default(),
        session.encoding()
    );

    let mut answered = 0;
    for _ in 0..args.count {
        let before = session.state().last_liveness;
        std::thread::sleep(HEARTBEAT_INTERVAL + Duration::from_millis(50));

        let state = session.state();
        match state.link {
            LinkState::Connected if state.last_liveness != before => {
                answered += 1;
                println!("  reply: {} ms", state.latency_ms);
            }
            LinkState::Connected => println!("  no reply"),
            _ => println!("  {}", state.status),
        }
    }

    session.disconnect();
    println!("{}/{} periods answered", answered, args.count);
    Ok(())
}

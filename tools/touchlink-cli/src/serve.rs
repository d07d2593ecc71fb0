//! Serve command - run a responder that acknowledges and logs input
//!
//! Plays the server role for testing clients without a desktop input
//! server: answers probes, acknowledges reliable messages and prints every
//! delivered event. Nothing is injected into the local machine.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use touchlink_core::link::InputHandler;
use touchlink_core::{Advertisement, Message, Responder};
use touchlink_shared::DEFAULT_PORT;

/// Arguments for the serve command
#[derive(Args)]
pub struct ServeArgs {
    /// UDP port to listen on
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Address to bind
    #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    pub bind: IpAddr,

    /// Advertise the responder over mDNS at this LAN address
    #[arg(long)]
    pub advertise: Option<IpAddr>,

    /// Instance name used when advertising
    #[arg(long, default_value = "TouchServer")]
    pub name: String,
}

/// Logs delivered input
struct InputLog;

impl InputHandler for InputLog {
    fn on_input(&mut self, from: SocketAddr, msg: Message) {
        match msg {
            Message::Joystick { x, y } => tracing::debug!(%from, x, y, "joystick"),
            Message::SkillDrag { key, dx, dy, .. } => tracing::debug!(%from, %key, dx, dy, "skill drag"),
            Message::ReliableButton {
                key,
                pressed,
                modifiers,
                ..
            } => {
                let state = if pressed { "down" } else { "up" };
                if modifiers.is_empty() {
                    tracing::info!(%from, "key {} {}", key, state);
                } else {
                    tracing::info!(%from, "key {}+{} {}", modifiers, key, state);
                }
            }
            Message::Button { key, pressed } => {
                tracing::info!(%from, "key {} {}", key, if pressed { "down" } else { "up" })
            }
            other => tracing::info!(%from, "{:?}", other),
        }
    }

    fn on_client_lost(&mut self, client: SocketAddr) {
        tracing::info!(%client, "Client lost, releasing held input");
    }
}

pub fn execute(args: ServeArgs) -> Result<()> {
    let addr = SocketAddr::new(args.bind, args.port);
    let responder = Responder::bind(addr, InputLog)
        .with_context(|| format!("Failed to listen on {}", addr))?;

    let _advertisement = match args.advertise {
        Some(ip) => Some(
            Advertisement::register(&args.name, ip, responder.local_addr().port())
                .context("Failed to advertise over mDNS")?,
        ),
        None => None,
    };

    println!("Listening on {} (Ctrl-C to stop)", responder.local_addr());
    while responder.is_running() {
        std::thread::sleep(Duration::from_millis(200));
    }

    anyhow::bail!("responder stopped unexpectedly")
}

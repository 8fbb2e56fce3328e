//! Loopback call binary
//!
//! Places a call between two in-process endpoints over real webrtc-rs peer
//! connections: acquire media, negotiate, hold the call, hang up.
//!
//! # Usage
//!
//! ```bash
//! # Host candidates only, hold for 5 seconds
//! cargo run --bin loopback_call -- --hold-secs 5
//!
//! # Use a STUN server and skip audio
//! cargo run --bin loopback_call -- \
//!   --stun-servers stun:stun.l.google.com:19302 \
//!   --no-audio
//! ```

use anyhow::Context;
use clap::Parser;
use peercall_webrtc::{CallClient, CallConfig, CallEvent, MediaConstraints, TurnServerConfig};
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Two-party loopback call
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON configuration file (CLI flags override its values)
    #[arg(long, env = "PEERCALL_CONFIG")]
    config: Option<std::path::PathBuf>,

    /// STUN servers (comma-separated; empty: host candidates only)
    #[arg(long, value_delimiter = ',', env = "PEERCALL_STUN_SERVERS")]
    stun_servers: Vec<String>,

    /// TURN servers (format: turn:host:port:username:password, comma-separated)
    #[arg(long, value_delimiter = ',', env = "PEERCALL_TURN_SERVERS")]
    turn_servers: Vec<String>,

    /// Do not acquire a video track
    #[arg(long, default_value_t = false)]
    no_video: bool,

    /// Do not acquire an audio track
    #[arg(long, default_value_t = false)]
    no_audio: bool,

    /// Negotiation timeout in milliseconds
    #[arg(long, env = "PEERCALL_NEGOTIATION_TIMEOUT_MS")]
    negotiation_timeout_ms: Option<u64>,

    /// How long to hold the call before hanging up (0: until Ctrl+C)
    #[arg(long, default_value_t = 3, env = "PEERCALL_HOLD_SECS")]
    hold_secs: u64,
}

/// Parse TURN server string (format: turn:host:port:username:password or turns:host:port:username:password)
fn parse_turn_server(s: &str) -> Result<TurnServerConfig, String> {
    let parts: Vec<&str> = s.split(':').collect();
    if parts.len() < 5 {
        return Err(format!(
            "Invalid TURN server format: '{}'. Expected: turn:host:port:username:password",
            s
        ));
    }

    let protocol = parts[0];
    if protocol != "turn" && protocol != "turns" {
        return Err(format!(
            "Invalid TURN protocol: '{}'. Expected 'turn' or 'turns'",
            protocol
        ));
    }

    // Password may contain colons
    Ok(TurnServerConfig {
        url: format!("{}:{}:{}", protocol, parts[1], parts[2]),
        username: parts[3].to_string(),
        credential: parts[4..].join(":"),
    })
}

fn build_config_from_args(args: &Args) -> anyhow::Result<CallConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            CallConfig::from_json_str(&json)?
        }
        None => CallConfig::default(),
    };

    if !args.stun_servers.is_empty() {
        config.stun_servers = args.stun_servers.clone();
    }

    for turn in &args.turn_servers {
        let turn_config = parse_turn_server(turn).map_err(anyhow::Error::msg)?;
        info!(
            "Adding TURN server: {} (user: {})",
            turn_config.url, turn_config.username
        );
        config.turn_servers.push(turn_config);
    }

    config.media = MediaConstraints {
        video: config.media.video && !args.no_video,
        audio: config.media.audio && !args.no_audio,
    };

    if let Some(timeout_ms) = args.negotiation_timeout_ms {
        config.negotiation_timeout_ms = timeout_ms;
    }

    config.validate()?;
    Ok(config)
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .thread_name("peercall-worker")
        .enable_all()
        .build()?;

    runtime.block_on(async_main(args))
}

async fn async_main(args: Args) -> anyhow::Result<()> {
    init_tracing();

    info!(version = env!("CARGO_PKG_VERSION"), "Loopback call starting");

    let config = build_config_from_args(&args)?;
    info!(
        stun_servers = ?config.stun_servers,
        turn_servers = config.turn_servers.len(),
        video = config.media.video,
        audio = config.media.audio,
        "Configuration loaded"
    );

    let client = CallClient::loopback(config)?;
    let mut events = client.subscribe();
    let reporter = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            if let CallEvent::NegotiationCompleted { setup_time } = event {
                info!("Call setup time: {:.3}s", setup_time.as_secs_f64());
            }
        }
    });

    client.start().await.context("Failed to start local media")?;
    client.call().await.context("Call failed")?;

    if args.hold_secs == 0 {
        info!("Call connected, press Ctrl+C to hang up");
        tokio::signal::ctrl_c().await?;
    } else {
        info!("Call connected, holding for {}s", args.hold_secs);
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(args.hold_secs)) => {}
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    warn!("Failed to listen for Ctrl+C: {}", e);
                }
            }
        }
    }

    client.hangup().await?;
    reporter.abort();

    if let Some((local, remote)) = client.endpoint_states() {
        info!("Final states: local={}, remote={}", local, remote);
    }
    Ok(())
}

/// Initialize tracing subscriber for logging
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

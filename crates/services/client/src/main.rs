//! Peercall client binary entry point
//!
//! Connects to a signaling relay, answers inbound calls, and optionally
//! places a call to a named peer.
//!
//! # Usage
//!
//! ```bash
//! # Wait for inbound calls
//! cargo run -p peercall-client -- --signaling-url ws://localhost:8765
//!
//! # Place a call to a peer
//! cargo run -p peercall-client -- \
//!   --signaling-url ws://localhost:8765 \
//!   --call peer-42
//!
//! # Configure STUN servers
//! cargo run -p peercall-client -- \
//!   --stun-servers stun:stun.l.google.com:19302
//! ```

use anyhow::Context;
use clap::Parser;
use peercall_core::{ConnectionManager, ManagerEvent, SignalingTransport};
use peercall_webrtc::{RtcConfig, WebRtcEngineFactory};
use peercall_websocket::{WebSocketConfig, WebSocketTransport};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

/// Peercall signaling client
///
/// Negotiates peer sessions over a WebSocket signaling relay. Without
/// `--call` the client waits for inbound offers and answers them.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// WebSocket signaling relay URL
    #[arg(
        long,
        default_value = "ws://localhost:8765",
        env = "PEERCALL_SIGNALING_URL"
    )]
    signaling_url: String,

    /// Peer to call on startup; omit to only answer inbound calls
    #[arg(long, env = "PEERCALL_CALL_PEER")]
    call: Option<String>,

    /// STUN/TURN servers (comma-separated)
    #[arg(
        long,
        value_delimiter = ',',
        default_value = "stun:stun.l.google.com:19302",
        env = "PEERCALL_STUN_SERVERS"
    )]
    stun_servers: Vec<String>,

    /// Signaling handshake deadline in milliseconds
    #[arg(long, default_value_t = 10_000, env = "PEERCALL_CONNECT_TIMEOUT_MS")]
    connect_timeout_ms: u64,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Ctrl+C sets the flag; the second press or the watchdog forces exit
    let shutdown_flag = Arc::new(AtomicBool::new(false));
    let shutdown_flag_handler = Arc::clone(&shutdown_flag);
    ctrlc::set_handler(move || {
        if shutdown_flag_handler.swap(true, Ordering::SeqCst) {
            eprintln!("shutdown already in progress, forcing exit");
            std::process::exit(1);
        }
        std::thread::spawn(|| {
            std::thread::sleep(Duration::from_secs(3));
            eprintln!("graceful shutdown timed out, forcing exit");
            std::process::exit(1);
        });
    })
    .context("failed to install Ctrl+C handler")?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(num_cpus::get())
        .thread_name("peercall-worker")
        .enable_all()
        .build()?;

    runtime.block_on(async_main(args, shutdown_flag))
}

async fn async_main(args: Args, shutdown_flag: Arc<AtomicBool>) -> anyhow::Result<()> {
    init_tracing();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        instance = %Uuid::new_v4(),
        signaling_url = %args.signaling_url,
        "peercall client starting"
    );

    let transport = Arc::new(
        WebSocketTransport::new(WebSocketConfig {
            url: args.signaling_url.clone(),
            connect_timeout_ms: args.connect_timeout_ms,
        })
        .context("invalid signaling configuration")?,
    );
    transport
        .connect()
        .await
        .context("failed to reach the signaling relay")?;

    let factory = Arc::new(
        WebRtcEngineFactory::new(RtcConfig {
            ice_servers: args.stun_servers.clone(),
            ..Default::default()
        })
        .context("invalid ICE configuration")?,
    );

    let (passthrough_tx, mut passthrough_rx) = tokio::sync::mpsc::unbounded_channel();
    let manager = ConnectionManager::with_passthrough(transport, factory, passthrough_tx);
    let mut events = manager
        .take_events()
        .context("manager event stream already taken")?;

    // Application-layer frames ride the same relay connection; this client
    // only logs them.
    tokio::spawn(async move {
        while let Some(frame) = passthrough_rx.recv().await {
            debug!(kind = %frame.kind, "application frame received");
        }
    });

    if let Some(peer_id) = &args.call {
        let handle = manager
            .start(peer_id.clone())
            .await
            .with_context(|| format!("failed to call {}", peer_id))?;
        info!(peer_id = %handle.peer_id(), "call placed, waiting for answer");
    } else {
        info!("waiting for inbound calls");
    }

    let mut poll = tokio::time::interval(Duration::from_millis(100));
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => log_event(event),
                None => {
                    warn!("manager event stream ended");
                    break;
                }
            },
            _ = poll.tick() => {
                if shutdown_flag.load(Ordering::SeqCst) {
                    info!("shutdown signal received");
                    break;
                }
            }
        }
    }

    manager.shutdown().await;
    info!("peercall client shut down");
    Ok(())
}

fn log_event(event: ManagerEvent) {
    match event {
        ManagerEvent::SessionConnected { peer_id } => {
            info!(peer_id = %peer_id, "session connected");
        }
        ManagerEvent::SessionFailed { peer_id, reason } => {
            error!(peer_id = %peer_id, reason = %reason, "session failed");
        }
        ManagerEvent::SessionClosed { peer_id } => {
            info!(peer_id = %peer_id, "session closed");
        }
        ManagerEvent::MessageRejected { peer_id, error } => {
            warn!(peer_id = %peer_id, error = %error, "inbound message rejected");
        }
        ManagerEvent::TransportDisconnected => {
            warn!("signaling relay connection lost");
        }
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

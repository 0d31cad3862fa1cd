//! TypingBridge host entry point.
//!
//! Wires the device link manager together and runs until interrupted:
//!
//! ```text
//! main()
//!  └─ load config + identity store
//!  └─ start services
//!       ├─ discovery worker   (blocking detection / open, own thread)
//!       ├─ control Ticker     (50 ms tick: rate, telemetry, reconnect check)
//!       └─ event pump         (Tokio task draining LinkEvents)
//! ```
//!
//! The keyboard hook, the device-side layer channel, and the PC resource
//! sampler are external collaborators behind the `KeySource`, `LayerSource`
//! and `PcStatsSampler` traits; a deployment embeds this crate and supplies
//! its platform implementations through `application::pumps`.  The headless
//! binary runs the link manager alone.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use bridge_core::RateCounter;

use bridge_host::application::pumps::spawn_probe_worker;
use bridge_host::application::supervisor::{
    ConnectOrigin, ConnectRequest, LinkEvent, LinkSupervisor, SupervisorConfig, RECONNECT_INTERVAL,
};
use bridge_host::application::telemetry::{ControlTick, TICK_PERIOD};
use bridge_host::infrastructure::scheduler::Ticker;
use bridge_host::infrastructure::serial::enumerate::SerialportFactory;
use bridge_host::infrastructure::serial::{
    LinkFactory, LinkSession, ProbeEngine, ProbeStrategy,
};
use bridge_host::infrastructure::storage::config::{identity_file_path, load_config};
use bridge_host::infrastructure::storage::identity::IdentityStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = load_config().unwrap_or_default();

    // Structured logging; `RUST_LOG` overrides the configured level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.bridge.log_level)),
        )
        .init();

    info!("TypingBridge host starting");

    let store = IdentityStore::new(identity_file_path()?);
    let factory: Arc<dyn LinkFactory> = Arc::new(SerialportFactory::new());
    let session = Arc::new(LinkSession::new(Arc::clone(&factory)));
    let engine = ProbeEngine::new(Arc::clone(&factory));

    let (supervisor, mut events) = LinkSupervisor::new(
        Arc::clone(&session),
        engine,
        store,
        SupervisorConfig {
            kind: config.bridge.link_type,
            strategy: ProbeStrategy::Passive,
            auto_reconnect: config.bridge.auto_reconnect,
            reconnect_interval: RECONNECT_INTERVAL,
        },
    );

    let rate = Arc::new(RateCounter::new(Instant::now()));
    let running = Arc::new(AtomicBool::new(true));

    // ── Discovery worker ──────────────────────────────────────────────────────
    let (connect_tx, connect_rx) = std::sync::mpsc::channel();
    let probe_worker =
        spawn_probe_worker(Arc::clone(&supervisor), connect_rx, Arc::clone(&running))?;

    // ── Control tick ──────────────────────────────────────────────────────────
    // The headless binary carries no PC resource sampler; a deployment
    // attaches one via `ControlTick::with_sampler`.
    let mut tick = ControlTick::new(
        Arc::clone(&session),
        Arc::clone(&supervisor),
        Arc::clone(&rate),
        config.bridge.telemetry_mode,
        connect_tx.clone(),
    );
    let ticker = Ticker::spawn("bridge-tick", TICK_PERIOD, Arc::clone(&running), move || {
        tick.on_tick()
    })?;

    info!(
        link_type = %config.bridge.link_type,
        auto_reconnect = config.bridge.auto_reconnect,
        "input hooks are supplied by the embedding shell; running the link manager"
    );

    // Startup connect attempt; arms the reconnect check on success.
    connect_tx
        .send(ConnectRequest::AutoDetect(ConnectOrigin::Auto))
        .ok();

    // ── Link event pump ───────────────────────────────────────────────────────
    let event_pump = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                LinkEvent::StateChanged(state) => debug!(?state, "link state changed"),
                LinkEvent::Connected { identifier, kind } => {
                    info!(%identifier, %kind, "connected")
                }
                LinkEvent::ConnectFailed { origin, reason } => match origin {
                    ConnectOrigin::Manual => warn!(?reason, "connect failed"),
                    ConnectOrigin::Auto => debug!(?reason, "auto connect failed"),
                },
                LinkEvent::LinkLost => warn!("device link lost"),
                LinkEvent::LayerForwarded(layer) => debug!(layer, "layer forwarded"),
            }
        }
    });

    info!("TypingBridge host ready.  Press Ctrl-C to exit.");
    tokio::signal::ctrl_c().await.ok();
    info!("shutdown signal received");

    // Cooperative shutdown: stop the loops, then close the link.
    running.store(false, Ordering::Relaxed);
    ticker.stop();
    drop(connect_tx);
    probe_worker.join().ok();
    supervisor.disconnect();
    event_pump.abort();

    info!("TypingBridge host stopped");
    Ok(())
}

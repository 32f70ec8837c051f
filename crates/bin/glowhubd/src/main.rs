//! # glowhubd: glowhub daemon
//!
//! Composition root that wires all adapters together and starts the server.
//!
//! ## Responsibilities
//! - Load configuration (config file, env vars) and initialise logging
//! - Build the device registry from the configured drivers and groups
//! - Connect the MQTT transport, or fall back to a no-op transport
//! - Construct the [`Runtime`], load rules and spawn the dispatcher and
//!   scheduler
//! - Build the axum router, bind to a TCP port and serve
//! - Handle graceful shutdown (SIGTERM/SIGINT)
//!
//! ## Dependency rule
//! This is the **only** crate that depends on all other crates.
//! It is the wiring layer: no domain logic belongs here.

mod config;

use std::sync::Arc;

use glowhub_adapter_http_axum::router;
use glowhub_adapter_http_axum::state::AppState;
use glowhub_app::ports::{NullTransport, Transport};
use glowhub_app::runtime::Runtime;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::Config;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&config.logging.filter))
        .init();

    // Devices
    let registry =
        glowhub_adapter_devices::build_registry(&config.devices, config.runtime.cycle_length());

    // Transport
    let mut inbound = None;
    let transport: Arc<dyn Transport> = if config.mqtt.enabled {
        let (transport, events) = glowhub_adapter_mqtt::connect(&config.mqtt);
        inbound = Some(events);
        Arc::new(transport)
    } else {
        warn!("mqtt disabled, device changes are not published");
        Arc::new(NullTransport)
    };

    // Runtime
    let (runtime, workers) =
        Runtime::new(registry, config.runtime.to_runtime_config(), transport);
    let rules = runtime.load_rules(&config.rules);
    info!(
        devices = runtime.registry().len(),
        rules,
        configured = config.rules.len(),
        "runtime ready"
    );
    let (dispatcher, scheduler) = workers.spawn();
    let inbound = inbound.map(|inbound| tokio::spawn(inbound.run(runtime.registry().clone())));

    // HTTP
    let app = router::build(AppState::new(runtime));
    let bind_addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(addr = %bind_addr, "glowhubd listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    scheduler.abort();
    dispatcher.abort();
    if let Some(inbound) = inbound {
        inbound.abort();
    }
    info!("glowhubd stopped");
    Ok(())
}

/// Resolve on Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "cannot listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received ctrl-c, shutting down"),
        () = terminate => info!("received SIGTERM, shutting down"),
    }
}

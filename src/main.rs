//! Parkwatch - session service for a smart-parking product
//!
//! Estimates vehicle presence from the backend's redundant realtime
//! channels, decides whether the user may request a parking QR code, and
//! drives the request lifecycle against the hosted backend.
//!
//! Module structure:
//! - `domain/` - Core business types (SessionMachine, SessionEvent, records)
//! - `io/` - External interfaces (backend REST, MQTT push feed, writes)
//! - `services/` - Business logic (Session, detection merge, slot/vehicle/message services)
//! - `infra/` - Infrastructure (Config, Metrics)

use clap::Parser;
use parkwatch::domain::types::{SessionEvent, SourceVersions};
use parkwatch::infra::{Config, Metrics};
use parkwatch::io::{create_write_worker, RestBackend};
use parkwatch::services::{Session, SlotDirectory};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::info;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Parkwatch - smart-parking session service
#[derive(Parser, Debug)]
#[command(name = "parkwatch", version, about)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "config/dev.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured logging with configurable level via RUST_LOG env var
    // Default: INFO, use RUST_LOG=debug for full event visibility
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    info!("parkwatch starting");

    let args = Args::parse();
    let config = Config::load_from_path(&args.config);

    info!(
        config_file = %config.config_file(),
        site_id = %config.site_id(),
        backend = %config.backend_base_url(),
        mqtt_host = %config.mqtt_host(),
        mqtt_port = %config.mqtt_port(),
        topic_prefix = %config.mqtt_topic_prefix(),
        poll_interval_secs = %config.poll_interval_secs(),
        "config_loaded"
    );

    // Sign in against the hosted backend; without credentials the flow
    // terminates with the static not-authenticated message
    let backend = Arc::new(RestBackend::new(
        config.backend_base_url(),
        config.backend_api_key(),
        config.backend_timeout_ms(),
    ));
    let (Some(email), Some(password)) = (config.backend_email(), config.backend_password())
    else {
        return Err("user is not authenticated".into());
    };
    let user = backend.sign_in(email, password).await?;
    let backend: Arc<dyn parkwatch::io::Backend> = backend;

    // Initial fetch; a failure here is the terminal generic error state
    let slots = SlotDirectory::new(backend.clone(), &config.documents().slots);
    let free = slots.list_free().await?;
    info!(free_slots = %free.len(), "initial_slots_loaded");

    // Create shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Shared components
    let metrics = Arc::new(Metrics::new());
    let versions = Arc::new(SourceVersions::new());

    // Outbound write worker (fire-and-forget backend writes)
    let (writes, write_worker) = create_write_worker(
        backend.clone(),
        config.documents().clone(),
        metrics.clone(),
        config.write_buffer(),
    );
    tokio::spawn(write_worker.run());

    // Merged session event channel (bounded for backpressure)
    let (event_tx, event_rx) = mpsc::channel::<SessionEvent>(config.event_buffer());

    // MQTT push feed mirroring the backend's realtime channels
    let feed_config = config.clone();
    let feed_tx = event_tx.clone();
    let feed_versions = versions.clone();
    let feed_metrics = metrics.clone();
    let feed_shutdown = shutdown_rx.clone();
    tokio::spawn(async move {
        if let Err(e) = parkwatch::io::start_push_feed(
            &feed_config,
            feed_tx,
            feed_versions,
            feed_metrics,
            feed_shutdown,
        )
        .await
        {
            tracing::error!(error = %e, "push feed error");
        }
    });

    // Metrics reporter
    let metrics_clone = metrics.clone();
    let metrics_interval = config.metrics_interval_secs();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(metrics_interval));
        loop {
            interval.tick().await;
            metrics_clone.snapshot().log();
        }
    });

    // Create the session and prime it from the backend
    let (mut session, state_rx) =
        Session::new(&config, &user.user_id, backend, writes, versions, metrics);
    session.prime().await?;

    // Log derived state changes (the embedding UI would render these)
    let mut ui_rx = state_rx.clone();
    tokio::spawn(async move {
        while ui_rx.changed().await.is_ok() {
            let snapshot = ui_rx.borrow_and_update().clone();
            info!(
                phase = %snapshot.phase.as_str(),
                button_enabled = %snapshot.button_enabled,
                qr_visible = %snapshot.qr_visible,
                notification = %snapshot.notification,
                "session_state"
            );
        }
    });

    // Handle shutdown on Ctrl+C
    let shutdown_signal = shutdown_tx;
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = shutdown_signal.send(true);
    });

    info!(user_id = %user.user_id, "session_started");

    // Run the session - consumes events until shutdown
    session.run(event_rx, shutdown_rx).await;

    info!("parkwatch shutdown complete");
    Ok(())
}

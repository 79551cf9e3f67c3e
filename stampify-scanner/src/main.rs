//! stampify-scanner - Event check-in scanner service
//!
//! Runs next to the door-staff UI: receives camera frames or uploaded images,
//! decodes member QR codes and stamps attendance against the backend.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use stampify_common::config::load_toml_config;
use stampify_common::events::EventBus;
use stampify_scanner::api::activate_event;
use stampify_scanner::client::{HttpStampApi, StampApi};
use stampify_scanner::config::{CliArgs, ScannerConfig};
use stampify_scanner::history::spawn_history_refresh;
use stampify_scanner::{build_router, AppState, PipelineSettings};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Scan events buffered per SSE subscriber
const EVENT_BUS_CAPACITY: usize = 256;

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();

    // config first: the default log level comes from it
    let toml_config = load_toml_config(args.config.as_deref())?;
    let config = ScannerConfig::resolve(&args, &toml_config)?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("stampify_scanner={0},stampify_common={0},tower_http=info", config.log_level)
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting Stampify scanner v{} on port {}",
        env!("CARGO_PKG_VERSION"),
        config.port
    );
    info!("Backend: {}", config.api_base_url);
    info!(
        policy = ?config.orchestrator.passport_policy,
        duplicate_check = ?config.orchestrator.duplicate_check,
        id_format = ?config.member_id_format,
        "Check-in settings"
    );

    let api: Arc<dyn StampApi> = Arc::new(
        HttpStampApi::new(
            &config.api_base_url,
            config.session_cookie.as_deref(),
            config.request_timeout,
        )
        .context("Failed to build backend client")?,
    );

    let operator = api
        .current_user()
        .await
        .context("Failed to load the signed-in operator; check the session cookie")?;
    info!(
        operator_id = operator.id,
        role = ?operator.role,
        "Signed in as {}",
        operator.name
    );
    if !operator.role.can_check_in() {
        warn!("Operator role {:?} cannot check members in; scans will be rejected", operator.role);
    }

    let event_bus = EventBus::new(EVENT_BUS_CAPACITY);
    let state = AppState::new(
        Arc::clone(&api),
        operator,
        event_bus.clone(),
        PipelineSettings {
            orchestrator: config.orchestrator,
            member_id_format: config.member_id_format,
            live: config.live,
            rate_window_mins: config.rate_window_mins,
        },
    );

    if let Some(event_id) = config.initial_event_id {
        match activate_event(&state, event_id).await {
            Ok(event) => info!("✓ Active event: {}", event),
            Err(e) => warn!("Could not select event {} at startup: {}", event_id, e),
        }
    }

    let cancel = CancellationToken::new();
    let session = Arc::clone(&state.session);
    let refresh_task = spawn_history_refresh(
        Arc::clone(&api),
        Arc::clone(&state.history),
        event_bus,
        config.history_refresh,
        cancel.clone(),
        move || {
            // skip the tick rather than wait if an event switch holds the lock
            session
                .try_read()
                .ok()
                .and_then(|s| s.context())
                .map(|ctx| (ctx.scanner_id, ctx.event.id))
        },
    );

    let live = Arc::clone(&state.live);
    let app = build_router(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("stampify-scanner listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    if let Some(handle) = live.lock().await.take() {
        handle.session.stop().await;
    }
    cancel.cancel();
    if let Err(e) = refresh_task.await {
        error!("History refresh task ended abnormally: {}", e);
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}

//! Broadcast Controller
//!
//! WebSocket signaling server for one-teacher, many-students broadcasts.
//!
//! # Servers
//!
//! - Signaling WebSocket (default: 0.0.0.0:8443, path `/call`)
//! - HTTP server for health and metrics (default: 0.0.0.0:8081)
//!
//! # Startup Flow
//!
//! 1. Initialize tracing
//! 2. Load configuration from environment
//! 3. Initialize Prometheus metrics recorder
//! 4. Spawn the registry actor and build the media backend
//! 5. Start health HTTP server (liveness, readiness, status, metrics)
//! 6. Start signaling server, mark ready
//! 7. Wait for shutdown signal, drain connections

#![warn(clippy::pedantic)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use bc_service::actors::{ActorMetrics, ConnectionContext, RegistryHandle};
use bc_service::config::Config;
use bc_service::media::build_backend;
use bc_service::observability::metrics::init_metrics_recorder;
use bc_service::observability::{health_router, HealthState};
use bc_service::transport::{signaling_router, SignalingState};
use common::config::ObservabilityConfig;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Time given to connection actors to tear down after the shutdown signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let vars: HashMap<String, String> = std::env::vars().collect();
    init_tracing(&ObservabilityConfig::from_vars(&vars));

    info!("Starting Broadcast Controller");

    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        instance_id = %config.instance_id,
        bind_address = %config.bind_address,
        ws_path = %config.ws_path,
        health_bind_address = %config.health_bind_address,
        connection_mailbox = config.connection_mailbox,
        outbound_queue = config.outbound_queue,
        negotiation_timeout_seconds = config.negotiation_timeout.as_secs(),
        media_backend = ?config.media_backend,
        "Configuration loaded successfully"
    );

    // Must happen before any metrics are recorded
    let prometheus_handle = init_metrics_recorder().map_err(|e| {
        error!(error = %e, "Failed to install Prometheus metrics recorder");
        e
    })?;

    let health_state = Arc::new(HealthState::new());

    // Root of every connection token
    let root_token = CancellationToken::new();
    // Separate so the registry outlives connection teardown
    let registry_token = CancellationToken::new();
    let registry = RegistryHandle::new(registry_token.clone());

    let backend = build_backend(config.media_backend);
    info!(backend = backend.name(), "Media backend ready");

    let ctx = ConnectionContext {
        registry: registry.clone(),
        backend,
        metrics: ActorMetrics::new(),
        mailbox_capacity: config.connection_mailbox,
        negotiation_timeout: config.negotiation_timeout,
    };

    // Health server (MUST succeed - fail startup if it doesn't)
    let health_addr: SocketAddr = config.health_bind_address.parse().map_err(|e| {
        error!(error = %e, addr = %config.health_bind_address, "Invalid health bind address");
        format!("Invalid health bind address: {e}")
    })?;

    let metrics_router = Router::new().route(
        "/metrics",
        axum::routing::get(move || {
            let handle = prometheus_handle.clone();
            async move { handle.render() }
        }),
    );
    let health_app = health_router(Arc::clone(&health_state), registry.clone()).merge(metrics_router);

    // Bind listeners BEFORE spawning to fail fast on bind errors
    let health_listener = tokio::net::TcpListener::bind(health_addr)
        .await
        .map_err(|e| {
            error!(error = %e, addr = %health_addr, "Failed to bind health server");
            format!("Failed to bind health server to {health_addr}: {e}")
        })?;

    let health_shutdown = root_token.child_token();
    let health_task = tokio::spawn(async move {
        info!(addr = %health_addr, "Health server starting");
        let server = axum::serve(health_listener, health_app).with_graceful_shutdown(async move {
            health_shutdown.cancelled().await;
            info!("Health server shutting down");
        });
        if let Err(e) = server.await {
            error!(error = %e, "Health server failed");
        }
    });

    // Signaling server
    let signaling_addr: SocketAddr = config.bind_address.parse().map_err(|e| {
        error!(error = %e, addr = %config.bind_address, "Invalid signaling bind address");
        format!("Invalid signaling bind address: {e}")
    })?;

    let signaling_listener = tokio::net::TcpListener::bind(signaling_addr)
        .await
        .map_err(|e| {
            error!(error = %e, addr = %signaling_addr, "Failed to bind signaling server");
            format!("Failed to bind signaling server to {signaling_addr}: {e}")
        })?;

    let signaling_app = signaling_router(
        &config.ws_path,
        SignalingState::new(ctx, root_token.clone(), config.outbound_queue),
    );

    let signaling_shutdown = root_token.child_token();
    let signaling_task = tokio::spawn(async move {
        info!(addr = %signaling_addr, "Signaling server starting");
        let server = axum::serve(signaling_listener, signaling_app).with_graceful_shutdown(
            async move {
                signaling_shutdown.cancelled().await;
                info!("Signaling server shutting down");
            },
        );
        if let Err(e) = server.await {
            error!(error = %e, "Signaling server failed");
        }
    });

    health_state.set_ready();
    info!(
        addr = %signaling_addr,
        ws_path = %config.ws_path,
        "Broadcast Controller running - press Ctrl+C to shutdown"
    );

    shutdown_signal().await;

    info!("Shutdown signal received, initiating graceful shutdown...");

    // Mark as not ready immediately so k8s stops sending traffic
    health_state.set_not_ready();

    // Connection actors tear down and leave the registry
    root_token.cancel();
    tokio::time::sleep(SHUTDOWN_GRACE).await;

    registry_token.cancel();
    let _ = tokio::join!(health_task, signaling_task);

    info!("Broadcast Controller shutdown complete");
    Ok(())
}

fn init_tracing(observability: &ObservabilityConfig) {
    let filter = EnvFilter::try_new(&observability.log_filter)
        .unwrap_or_else(|_| EnvFilter::new(common::config::DEFAULT_LOG_FILTER));

    let registry = tracing_subscriber::registry().with(filter);
    if observability.json_logs {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        #[expect(
            clippy::expect_used,
            reason = "Signal handler installation is critical - panic is appropriate if it fails"
        )]
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        #[expect(
            clippy::expect_used,
            reason = "Signal handler installation is critical - panic is appropriate if it fails"
        )]
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}

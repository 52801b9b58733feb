//! FormRelay Web Server - contact form verification relay.
//!
//! This binary serves `POST /api/submit`:
//! - Verifies the reCAPTCHA token with Google
//! - Optionally subscribes the lead to a Mailchimp audience
//! - Returns a JSON verdict
//!
//! Configuration comes from the environment; see [`formrelay::Config`].

use std::future::Future;
use std::net::SocketAddr;

use anyhow::{Context, Result};
use tokio::{net::TcpListener, signal};
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use formrelay::web::router;
use formrelay::{AppState, Config, SubmissionHandler};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured JSON logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    info!("web_server_starting");

    // Load configuration
    let config = Config::from_env().context("Invalid configuration")?;
    info!(
        port = config.port,
        verify_url = %config.recaptcha_verify_url,
        score_threshold = config.score_threshold,
        allowed_origins = ?config.allowed_origins,
        relay_enabled = config.relay_enabled(),
        request_timeout_ms = config.request_timeout_ms,
        trusted_proxy_hops = config.trusted_proxy_hops,
        "config_loaded"
    );

    let submissions = SubmissionHandler::from_config(&config)?;

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));

    // Create application state and router
    let app = router(AppState::new(config, submissions));

    let listener = TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    info!(address = %addr, "web_server_listening");

    // Run server with graceful shutdown
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("Server error")?;

    info!("web_server_shutdown_complete");

    Ok(())
}

/// Resolve once SIGINT or SIGTERM arrives.
///
/// A signal whose handler cannot be installed is logged and never fires,
/// so the server still stops on the other one.
async fn shutdown_signal() {
    let interrupt = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, signal = "SIGINT", "signal_handler_install_failed");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, signal = "SIGTERM", "signal_handler_install_failed");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let received = first_signal(interrupt, terminate).await;
    info!(signal = received, "web_server_shutting_down");
}

/// Name of whichever signal future completes first.
async fn first_signal<I, T>(interrupt: I, terminate: T) -> &'static str
where
    I: Future<Output = ()>,
    T: Future<Output = ()>,
{
    tokio::select! {
        _ = interrupt => "SIGINT",
        _ = terminate => "SIGTERM",
    }
}

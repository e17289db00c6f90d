use core::net::{IpAddr, SocketAddr};
use std::path::Path;

use eyre::WrapErr as _;
use tokio::{net, signal};

use super::{runtime::start_background_tasks, state::initialize_state};
use crate::http::router;

/// Creates a future that resolves when a shutdown signal is received.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = sigterm.recv() => {}
                    _ = signal::ctrl_c() => {}
                }
            }
            Err(e) => {
                tracing::warn!("Failed to install SIGTERM handler, only Ctrl-C will stop the server: {e}");
                drop(signal::ctrl_c().await);
            }
        }
    }
    #[cfg(not(unix))]
    {
        drop(signal::ctrl_c().await);
    }
}

/// Loads the config, starts the background drivers and serves the HTTP API until shutdown.
///
/// # Errors
///
/// Returns an error if the configuration cannot be loaded, the database cannot be opened, or the
/// server cannot bind.
pub(crate) async fn start(
    config_path: &Path,
    port_override: Option<u16>,
    bind_override: Option<&str>,
) -> eyre::Result<()> {
    tracing::info!("Starting HTTP server...");

    let app_state = initialize_state(config_path).await?;

    // Apply optional overrides from CLI/tests
    let listen_port = port_override.unwrap_or(app_state.config.server.port);
    let bind_str = bind_override.unwrap_or(&app_state.config.server.bind);
    let listen_ip: IpAddr = bind_str
        .parse()
        .wrap_err(format!("Invalid bind address: {bind_str}"))?;
    let addr = SocketAddr::from((listen_ip, listen_port));

    start_background_tasks(&app_state.fleet, app_state.config.scheduler);

    let app = router::create_app(app_state);
    let listener = net::TcpListener::bind(addr)
        .await
        .wrap_err(format!("Failed to bind {addr}"))?;
    tracing::info!("Listening on http://{}", addr);

    let server = axum::serve(listener, app);
    tokio::select! {
        res = server => res?,
        () = shutdown_signal() => {
            tracing::info!("Received shutdown, shutting down");
        }
    }
    Ok(())
}

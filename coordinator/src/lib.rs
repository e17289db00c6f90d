//! Library entry for the `fleetctl` coordinator.
//!
//! Exposes `inner_main` so the workspace-level binary can call into the coordinator logic, and
//! the fleet, store and model modules for embedding.
//!
//! Provides commands to run the HTTP control service or operate on the fleet once from a shell.
#![cfg_attr(
    test,
    expect(clippy::indexing_slicing, reason = "This is not problematic in tests",)
)]

extern crate alloc;
extern crate core;

mod app;
pub mod cli;
mod commands;
pub mod config;
pub mod fleet;
mod http;
pub mod model;
pub mod store;

#[cfg(unix)]
use nix::sys::stat;
use tracing::Instrument as _;

use std::{env, fs, io, sync::Once};

use eyre::{Result, WrapErr as _};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt::time::ChronoLocal};

use cli::{Cli, Command, LogFormat};

static INIT_TRACING: Once = Once::new();

/// Logs go to stderr so that command output on stdout stays machine readable.
fn init_tracing(log_format: LogFormat) {
    INIT_TRACING.call_once(move || {
        let default_level = if env::var("FLEETCTL_INTEGRATION_TEST").is_ok() {
            "error"
        } else {
            "info"
        };

        let builder = tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
            )
            .with_timer(ChronoLocal::rfc_3339())
            .with_writer(io::stderr);

        match log_format {
            LogFormat::Compact => builder.compact().init(),
            LogFormat::Json => builder.json().init(),
            LogFormat::Pretty => builder.pretty().init(),
        }
    });
}

/// The coordinator's main function; can be called from a shim binary.
///
/// Dispatches to the control service or to a one-shot command.
///
/// # Errors
///
/// Returns an error if the config file cannot be found, or if the selected command fails.
pub async fn inner_main(invocation: Cli) -> Result<()> {
    init_tracing(invocation.log_format);

    // Keep the database and its WAL files private to the service user.
    #[cfg(unix)]
    stat::umask(stat::Mode::S_IRWXG | stat::Mode::S_IRWXO);

    let config = &invocation.config;
    let config_path =
        fs::canonicalize(config).wrap_err(format!("Config file not found at: {config}"))?;

    match invocation.command {
        Command::ControlService(args) => {
            let startup_span = tracing::info_span!("fleet.startup", ?config_path, pid=?std::process::id(), version = env!("CARGO_PKG_VERSION"));
            async {
                info!("Starting coordinator");
                app::start(&config_path, args.port, args.bind.as_deref()).await
            }
            .instrument(startup_span)
            .await
        }
        command => commands::run(command, &config_path).await,
    }
}

use alloc::sync::Arc;
use std::path::Path;

use eyre::WrapErr as _;
use fleetctl_common::{RemoteExecutor, SshExecutor};
use tracing::info;

use crate::{
    config::{FleetConfig, load, resolve_config_relative_paths},
    fleet::{Fleet, ProbeSettings},
    store::{SqliteStore, Store},
};

/// Application state shared across request handlers and background tasks.
#[derive(Clone)]
pub(crate) struct AppState {
    pub fleet: Fleet,
    /// Configuration as loaded at startup.
    pub config: Arc<FleetConfig>,
}

/// Opens the database next to the config file and wires the SSH executor into a [`Fleet`].
///
/// # Errors
///
/// Returns an error if the database cannot be opened or migrated.
#[tracing::instrument(skip_all)]
pub(crate) async fn build_fleet(config: &FleetConfig, config_path: &Path) -> eyre::Result<Fleet> {
    let db_path = resolve_config_relative_paths(config_path, &config.db.path);
    let store = SqliteStore::open(&db_path).await.wrap_err(format!(
        "Failed to initialize database at: {}",
        db_path.display()
    ))?;
    info!(
        "Database initialized at: {} (note: WAL mode creates .db-wal and .db-shm files alongside)",
        db_path.display()
    );

    let executor = SshExecutor::new(
        config.remote.connect_timeout(),
        config.remote.command_timeout(),
    );
    let probe_settings = ProbeSettings {
        reachability_timeout: config.remote.reachability_timeout(),
    };
    Ok(Fleet::new(
        Arc::new(store) as Arc<dyn Store>,
        Arc::new(executor) as Arc<dyn RemoteExecutor>,
        probe_settings,
    ))
}

/// Emit startup warnings based on configuration and runtime state.
fn emit_startup_warnings(config_path: &Path) {
    #[cfg(unix)]
    {
        use std::fs;
        use std::os::unix::fs::PermissionsExt as _;
        if let Ok(metadata) = fs::metadata(config_path) {
            let mode = metadata.permissions().mode();
            if mode & 0o077 != 0 {
                tracing::warn!(
                    "Config file permissions are too permissive (current: {mode:#o}). Run 'chmod 600 {}' to restrict access to owner only.",
                    config_path.display()
                );
            }
        }
    }
    #[cfg(not(unix))]
    let _ = config_path;
}

/// Load the config, open the database and assemble the shared state.
#[tracing::instrument(skip_all)]
pub(crate) async fn initialize_state(config_path: &Path) -> eyre::Result<AppState> {
    let config = Arc::new(load(config_path).await?);
    let fleet = build_fleet(&config, config_path).await?;
    emit_startup_warnings(config_path);
    Ok(AppState { fleet, config })
}

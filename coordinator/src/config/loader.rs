//! Configuration loading utilities for the coordinator.

use std::path::Path;

use eyre::WrapErr as _;
use tokio::fs;

use crate::config::FleetConfig;

/// Reads and parses the coordinator config from a TOML file.
///
/// # Errors
///
/// Returns an error if the config file cannot be read or parsed.
pub async fn load<P: AsRef<Path>>(path: P) -> eyre::Result<FleetConfig> {
    let path_ref = path.as_ref();
    let content = fs::read_to_string(&path).await.wrap_err(format!(
        "Failed to read config file at: {}",
        path_ref.display()
    ))?;
    let config: FleetConfig = toml::from_str(&content).wrap_err(format!(
        "Failed to parse config as TOML at: {}",
        path_ref.display()
    ))?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use core::time::Duration;
    use std::{env, fs};

    use super::*;

    #[tokio::test]
    async fn load_full_config_file() {
        let toml_str = r#"
            [server]
            port = 9090
            bind = "0.0.0.0"
            actor_header = "x-auth-request-user"

            [db]
            path = ":memory:"

            [remote]
            connect_timeout_secs = 3
            command_timeout_secs = 60

            [scheduler]
            refresh_interval_secs = 120
            expiry_interval_secs = 0
        "#;
        let tmp = env::temp_dir().join("fleetctl_test_config.toml");
        fs::write(&tmp, toml_str).unwrap();
        let cfg = load(&tmp).await.unwrap();
        assert_eq!(cfg.server.port, 9090);
        assert_eq!(cfg.server.bind, "0.0.0.0");
        assert_eq!(cfg.server.actor_header, "x-auth-request-user");
        assert_eq!(cfg.db.path, ":memory:");
        assert_eq!(cfg.remote.connect_timeout(), Duration::from_secs(3));
        assert_eq!(cfg.remote.reachability_timeout(), Duration::from_secs(5));
        assert_eq!(cfg.remote.command_timeout(), Duration::from_secs(60));
        assert_eq!(cfg.scheduler.refresh_interval_secs, 120);
        assert_eq!(cfg.scheduler.expiry_interval_secs, 0);
    }

    #[tokio::test]
    async fn empty_file_uses_defaults() {
        let tmp = env::temp_dir().join("fleetctl_test_config_empty.toml");
        fs::write(&tmp, "").unwrap();
        let cfg = load(&tmp).await.unwrap();
        assert_eq!(cfg, FleetConfig::default());
        assert_eq!(cfg.server.port, 8080);
        assert_eq!(cfg.server.bind, "127.0.0.1");
        assert_eq!(cfg.server.actor_header, "x-forwarded-user");
        assert_eq!(cfg.db.path, "./fleetctl.db");
        assert_eq!(cfg.remote.connect_timeout_secs, 10);
        assert_eq!(cfg.remote.command_timeout_secs, 300);
        assert_eq!(cfg.scheduler.refresh_interval_secs, 0);
        assert_eq!(cfg.scheduler.expiry_interval_secs, 30);
    }

    #[test]
    fn partial_section_keeps_other_defaults() {
        let cfg: FleetConfig = toml::from_str("[server]\nport = 7000\n").unwrap();
        assert_eq!(cfg.server.port, 7000);
        assert_eq!(cfg.server.bind, "127.0.0.1");
    }

    #[tokio::test]
    async fn load_missing_file() {
        let tmp = env::temp_dir().join("fleetctl_does_not_exist.toml");
        let res = load(&tmp).await;
        assert!(res.is_err(), "Expected error for missing file");
    }

    #[tokio::test]
    async fn load_invalid_toml() {
        let tmp = env::temp_dir().join("fleetctl_invalid.toml");
        fs::write(&tmp, "not valid toml").unwrap();
        let res = load(&tmp).await;
        assert!(res.is_err(), "Expected error for invalid TOML");
    }
}

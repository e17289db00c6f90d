//! Configuration data types for the fleet coordinator.
//!
//! Every section is optional; omitted fields take the defaults below.

use core::time::Duration;
use std::path::{Component, Path, PathBuf};

use serde::Deserialize;

/// HTTP server binding configuration section.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// TCP port for the control service.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Bind address for the HTTP listener.
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Request header carrying the authenticated user name, set by the auth proxy in front.
    #[serde(default = "default_actor_header")]
    pub actor_header: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind: default_bind(),
            actor_header: default_actor_header(),
        }
    }
}

/// Location of the `SQLite` database.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct DbConfig {
    /// Relative paths are resolved relative to the config file. `:memory:` is allowed.
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Timeouts for talking to managed hosts.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct RemoteConfig {
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_reachability_timeout_secs")]
    pub reachability_timeout_secs: u64,
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout_secs(),
            reachability_timeout_secs: default_reachability_timeout_secs(),
            command_timeout_secs: default_command_timeout_secs(),
        }
    }
}

impl RemoteConfig {
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    #[must_use]
    pub const fn reachability_timeout(&self) -> Duration {
        Duration::from_secs(self.reachability_timeout_secs)
    }

    #[must_use]
    pub const fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

/// Intervals of the background drivers. `0` disables a driver.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Periodic host refresh.
    #[serde(default)]
    pub refresh_interval_secs: u64,
    /// Auto-stop sweep.
    #[serde(default = "default_expiry_interval_secs")]
    pub expiry_interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: 0,
            expiry_interval_secs: default_expiry_interval_secs(),
        }
    }
}

/// Root config structure.
#[derive(Debug, Deserialize, Default, Clone, PartialEq, Eq)]
pub struct FleetConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

const fn default_port() -> u16 {
    8080
}

fn default_bind() -> String {
    "127.0.0.1".to_string()
}

fn default_actor_header() -> String {
    "x-forwarded-user".to_string()
}

fn default_db_path() -> String {
    "./fleetctl.db".to_string()
}

const fn default_connect_timeout_secs() -> u64 {
    10
}

const fn default_reachability_timeout_secs() -> u64 {
    5
}

const fn default_command_timeout_secs() -> u64 {
    300
}

const fn default_expiry_interval_secs() -> u64 {
    30
}

/// Resolves a path to an absolute one.
///
/// Absolute paths and `:memory:` are returned as-is, relative ones are joined with the config
/// file's directory. The result is normalized without touching the filesystem.
pub fn resolve_config_relative_paths(config_path: &Path, relative_path: &str) -> PathBuf {
    let path = Path::new(relative_path);
    if relative_path == ":memory:" {
        return path.to_path_buf();
    }
    let resolved = if path.is_absolute() {
        path.to_path_buf()
    } else {
        config_path
            .parent()
            .map_or_else(|| path.to_path_buf(), |d| d.join(path))
    };

    // canonicalize() would fail for a database that does not exist yet
    normalize_path(&resolved)
}

fn normalize_path(path: &Path) -> PathBuf {
    let mut result = PathBuf::new();
    for component in path.components() {
        use Component as C;
        match component {
            C::Normal(c) => {
                result.push(c);
            }
            C::ParentDir => {
                result.pop();
            }
            C::CurDir => {}
            C::RootDir | C::Prefix(_) => {
                result.push(component);
            }
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_db_path_follows_the_config_file() {
        let config = Path::new("/etc/fleetctl/fleetctl.toml");
        assert_eq!(
            resolve_config_relative_paths(config, "./data/../fleet.db"),
            PathBuf::from("/etc/fleetctl/fleet.db")
        );
        assert_eq!(
            resolve_config_relative_paths(config, "/var/lib/fleet.db"),
            PathBuf::from("/var/lib/fleet.db")
        );
        assert_eq!(
            resolve_config_relative_paths(config, ":memory:"),
            PathBuf::from(":memory:")
        );
    }
}

//! Command-line interface definitions for the coordinator.
//!
//! This module contains the CLI argument parsing structures and enums
//! used by the `fleetctl` binary.

use std::{env, path::PathBuf};

use clap::{Args, Parser, Subcommand, ValueEnum};
use uuid::Uuid;

use crate::model::{AuditAction, ResourceType};

/// Top-level command-line interface definition.
#[derive(Debug, Parser)]
#[command(name = "fleetctl")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = env!("CARGO_PKG_DESCRIPTION"))]
pub struct Cli {
    /// Path to the configuration file
    #[arg(
        short,
        long,
        global = true,
        default_value = "fleetctl.toml",
        env = "FLEETCTL_CONFIG"
    )]
    pub config: String,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Compact)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Compact,
    Json,
    Pretty,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Launch the HTTP control service together with the refresh and auto-stop drivers.
    ControlService(ServiceArgs),

    /// Manage registered hosts.
    #[command(subcommand)]
    Host(HostCommand),

    /// Manage compose workloads.
    #[command(subcommand)]
    App(AppCommand),

    /// Inspect the audit trail.
    #[command(subcommand)]
    Audit(AuditCommand),

    /// Stop every running workload whose auto-stop timer has elapsed, once.
    SweepExpired,
}

/// Arguments for the control service command.
#[derive(Debug, Args)]
pub struct ServiceArgs {
    /// Optional override for the listen port (overrides port in config)
    #[arg(long)]
    pub port: Option<u16>,

    /// Optional override for the bind address (overrides bind in config)
    #[arg(long)]
    pub bind: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum HostCommand {
    /// Register a host. It is probed once before it is stored.
    Add(AddHostArgs),
    /// Change a host's name or connection details. The host is not re-probed.
    Edit(EditHostArgs),
    List,
    /// Re-probe one host.
    Probe { id: Uuid },
    /// Re-probe every host.
    ProbeAll,
    Remove { id: Uuid },
}

#[derive(Debug, Args)]
pub struct AddHostArgs {
    pub name: String,
    pub address: String,
    #[arg(long, default_value_t = 22)]
    pub port: u16,
    #[arg(long, short)]
    pub user: String,
    /// PEM private key used for SSH sessions
    #[arg(long)]
    pub key_file: Option<PathBuf>,
}

/// Options left out keep their current value.
#[derive(Debug, Args)]
pub struct EditHostArgs {
    pub id: Uuid,
    #[arg(long)]
    pub name: Option<String>,
    #[arg(long)]
    pub address: Option<String>,
    #[arg(long)]
    pub port: Option<u16>,
    #[arg(long, short)]
    pub user: Option<String>,
    /// Replacement PEM private key
    #[arg(long, conflicts_with = "clear_key")]
    pub key_file: Option<PathBuf>,
    /// Forget the stored private key
    #[arg(long)]
    pub clear_key: bool,
}

#[derive(Debug, Subcommand)]
pub enum AppCommand {
    /// Register a compose workload on a host.
    Add(AddAppArgs),
    /// Change a workload's configuration. A running workload is left running.
    Edit(EditAppArgs),
    List,
    Start {
        id: Uuid,
        /// Auto-stop after this many minutes; 0 means manual stop only
        #[arg(long, short, default_value_t = 0, allow_negative_numbers = true)]
        timeout_minutes: i64,
    },
    Stop {
        id: Uuid,
    },
    Remove {
        id: Uuid,
    },
}

#[derive(Debug, Args)]
pub struct AddAppArgs {
    pub name: String,
    /// Owning host id
    #[arg(long)]
    pub host: Uuid,
    /// Remote directory containing the compose file
    #[arg(long)]
    pub compose_path: String,
    #[arg(long)]
    pub url: Option<String>,
    /// Default auto-stop timeout in minutes
    #[arg(long)]
    pub auto_stop_mins: Option<u32>,
}

/// Options left out keep their current value.
#[derive(Debug, Args)]
pub struct EditAppArgs {
    pub id: Uuid,
    #[arg(long)]
    pub name: Option<String>,
    /// Move the workload to another host
    #[arg(long)]
    pub host: Option<Uuid>,
    #[arg(long)]
    pub compose_path: Option<String>,
    /// New URL; an empty value removes it
    #[arg(long)]
    pub url: Option<String>,
    #[arg(long)]
    pub auto_stop_mins: Option<u32>,
}

#[derive(Debug, Subcommand)]
pub enum AuditCommand {
    List(AuditListArgs),
}

#[derive(Debug, Args)]
pub struct AuditListArgs {
    #[arg(long, default_value_t = 50)]
    pub limit: u32,
    #[arg(long, default_value_t = 0)]
    pub offset: u32,
    #[arg(long)]
    pub user_id: Option<String>,
    #[arg(long)]
    pub action: Option<AuditAction>,
    #[arg(long)]
    pub resource_type: Option<ResourceType>,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory as _;

    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_app_start_with_global_config() {
        let id = Uuid::new_v4();
        let cli = Cli::try_parse_from([
            "fleetctl",
            "app",
            "start",
            &id.to_string(),
            "--timeout-minutes",
            "15",
            "--config",
            "/tmp/f.toml",
        ])
        .unwrap();
        assert_eq!(cli.config, "/tmp/f.toml");
        match cli.command {
            Command::App(AppCommand::Start {
                id: parsed,
                timeout_minutes,
            }) => {
                assert_eq!(parsed, id);
                assert_eq!(timeout_minutes, 15);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn audit_filters_use_wire_names() {
        let cli = Cli::try_parse_from([
            "fleetctl",
            "audit",
            "list",
            "--action",
            "start_app",
            "--resource-type",
            "app",
        ])
        .unwrap();
        let Command::Audit(AuditCommand::List(args)) = cli.command else {
            panic!("expected audit list");
        };
        assert_eq!(args.action, Some(AuditAction::StartApp));
        assert_eq!(args.resource_type, Some(ResourceType::App));
        assert_eq!(args.limit, 50);
    }

    #[test]
    fn edit_options_are_optional() {
        let id = Uuid::new_v4();
        let cli = Cli::try_parse_from([
            "fleetctl",
            "app",
            "edit",
            &id.to_string(),
            "--url",
            "",
            "--auto-stop-mins",
            "0",
        ])
        .unwrap();
        let Command::App(AppCommand::Edit(args)) = cli.command else {
            panic!("expected app edit");
        };
        assert_eq!(args.id, id);
        assert_eq!(args.url.as_deref(), Some(""));
        assert_eq!(args.auto_stop_mins, Some(0));
        assert_eq!(args.name, None);
        assert_eq!(args.host, None);

        let conflicting = Cli::try_parse_from([
            "fleetctl",
            "host",
            "edit",
            &id.to_string(),
            "--key-file",
            "/tmp/id_ed25519",
            "--clear-key",
        ]);
        assert!(conflicting.is_err());
    }
}

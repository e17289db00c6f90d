//! One-shot subcommands. They work directly on the database named in the config file and print
//! their result as JSON on stdout.

use std::{env, path::Path};

use chrono::Utc;
use eyre::WrapErr as _;
use secrecy::SecretString;
use serde::Serialize;
use serde_json::json;
use tokio::fs;

use crate::{
    app::build_fleet,
    cli::{
        AddAppArgs, AddHostArgs, AppCommand, AuditCommand, AuditListArgs, Command, EditAppArgs,
        EditHostArgs, HostCommand,
    },
    config::load,
    fleet::{
        Fleet, HostUpdate, NewHost, NewWorkload, WorkloadUpdate, format_duration, page_size,
    },
    model::{AuditFilter, RequestContext},
};

/// Attribution for commands run from a shell: the login name, if known.
fn cli_context() -> RequestContext {
    let actor = env::var("USER")
        .or_else(|_| env::var("USERNAME"))
        .ok()
        .filter(|user| !user.is_empty());
    RequestContext {
        actor_id: actor.clone(),
        actor_name: actor,
        origin_address: None,
        origin_client: Some(concat!("fleetctl/", env!("CARGO_PKG_VERSION")).to_string()),
    }
}

async fn read_key(path: &Path) -> eyre::Result<SecretString> {
    let pem = fs::read_to_string(path)
        .await
        .wrap_err(format!("Failed to read key file {}", path.display()))?;
    Ok(SecretString::from(pem))
}

fn print_json<T: Serialize>(value: &T) -> eyre::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Runs a one-shot subcommand against the fleet described by `config_path`.
///
/// # Errors
///
/// Returns an error if the config or database cannot be opened, or if the operation fails.
pub(crate) async fn run(command: Command, config_path: &Path) -> eyre::Result<()> {
    let config = load(config_path).await?;
    let fleet = build_fleet(&config, config_path).await?;
    let ctx = cli_context();

    match command {
        Command::ControlService(_) => eyre::bail!("control-service is not a one-shot command"),
        Command::Host(cmd) => host(&fleet, cmd, &ctx).await,
        Command::App(cmd) => app(&fleet, cmd, &ctx).await,
        Command::Audit(AuditCommand::List(args)) => audit(&fleet, args).await,
        Command::SweepExpired => print_json(&fleet.stop_expired_workloads(Utc::now()).await?),
    }
}

async fn host(fleet: &Fleet, command: HostCommand, ctx: &RequestContext) -> eyre::Result<()> {
    match command {
        HostCommand::Add(AddHostArgs {
            name,
            address,
            port,
            user,
            key_file,
        }) => {
            let private_key = match key_file {
                Some(path) => Some(read_key(&path).await?),
                None => None,
            };
            let new = NewHost {
                name,
                address,
                port,
                user,
                private_key,
            };
            print_json(&fleet.register_host(new, ctx).await?)
        }
        HostCommand::Edit(EditHostArgs {
            id,
            name,
            address,
            port,
            user,
            key_file,
            clear_key,
        }) => {
            let private_key = match key_file {
                Some(path) => Some(read_key(&path).await?),
                None if clear_key => Some(SecretString::from(String::new())),
                None => None,
            };
            let update = HostUpdate {
                name,
                address,
                port,
                user,
                private_key,
            };
            print_json(&fleet.update_host(id, update, ctx).await?)
        }
        HostCommand::List => print_json(&fleet.list_hosts().await?),
        HostCommand::Probe { id } => print_json(&fleet.probe_host(id, ctx).await?),
        HostCommand::ProbeAll => print_json(&fleet.probe_all_hosts(ctx).await?),
        HostCommand::Remove { id } => {
            fleet.remove_host(id, ctx).await?;
            print_json(&json!({ "message": "Server deleted", "id": id }))
        }
    }
}

async fn app(fleet: &Fleet, command: AppCommand, ctx: &RequestContext) -> eyre::Result<()> {
    match command {
        AppCommand::Add(AddAppArgs {
            name,
            host,
            compose_path,
            url,
            auto_stop_mins,
        }) => {
            let new = NewWorkload {
                name,
                host_id: host,
                compose_path,
                app_url: url,
                auto_stop_mins,
            };
            print_json(&fleet.register_workload(new, ctx).await?)
        }
        AppCommand::Edit(EditAppArgs {
            id,
            name,
            host,
            compose_path,
            url,
            auto_stop_mins,
        }) => {
            let update = WorkloadUpdate {
                name,
                host_id: host,
                compose_path,
                app_url: url,
                auto_stop_mins,
            };
            print_json(&fleet.update_workload(id, update, ctx).await?)
        }
        AppCommand::List => print_json(&fleet.list_workloads().await?),
        AppCommand::Start {
            id,
            timeout_minutes,
        } => {
            let outcome = fleet
                .start_workload(id, timeout_minutes, Utc::now(), ctx)
                .await?;
            print_json(&json!({
                "output": outcome.output,
                "timer_ends_at": outcome.timer_ends_at_epoch_seconds(),
                "app_url": outcome.app_url,
            }))
        }
        AppCommand::Stop { id } => {
            let outcome = fleet.stop_workload(id, Utc::now(), ctx).await?;
            print_json(&json!({
                "output": outcome.output,
                "duration": outcome.ran_for.map(format_duration),
            }))
        }
        AppCommand::Remove { id } => {
            fleet.remove_workload(id, ctx).await?;
            print_json(&json!({ "message": "App deleted", "id": id }))
        }
    }
}

async fn audit(fleet: &Fleet, args: AuditListArgs) -> eyre::Result<()> {
    let filter = AuditFilter {
        actor_id: args.user_id,
        action: args.action,
        resource_type: args.resource_type,
    };
    let page = fleet
        .list_audit_entries(&filter, args.limit, args.offset)
        .await?;
    print_json(&json!({
        "logs": page.entries,
        "total": page.total,
        "limit": page_size(args.limit),
        "offset": args.offset,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_context_identifies_the_client() {
        let ctx = cli_context();
        assert!(
            ctx.origin_client
                .as_deref()
                .is_some_and(|client| client.starts_with("fleetctl/")),
            "client should name the binary"
        );
        assert_eq!(ctx.actor_id, ctx.actor_name);
        assert_eq!(ctx.origin_address, None);
    }
}

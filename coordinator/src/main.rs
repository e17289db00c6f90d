//! `fleetctl` entrypoint.

use clap::Parser as _;
use fleetctl_coordinator::{cli::Cli, inner_main};

#[tokio::main]
async fn main() -> eyre::Result<()> {
    inner_main(Cli::parse()).await
}

mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Command};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve { port, db, log_level, encryption_key, ephemeral } => {
            commands::serve(port, db, log_level, encryption_key, ephemeral).await
        }
        Command::RegisterServer { serial, bmc_endpoint, bmc_user, bmc_password, vendor_tag } => {
            commands::register_server(serial, bmc_endpoint, bmc_user, bmc_password, vendor_tag, cli.remote, cli.token)
                .await
        }
        Command::CreateJob { server_serial, recipe, maintenance_iso_url } => {
            commands::create_job(server_serial, recipe, maintenance_iso_url, cli.remote, cli.token).await
        }
        Command::GetJob { job_id } => commands::get_job(job_id, cli.remote, cli.token).await,
    }
}

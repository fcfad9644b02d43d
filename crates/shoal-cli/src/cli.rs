use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "shoald",
    about = "Bare-metal provisioning controller: job admission, worker pool, and embedded OCI registry",
    version
)]
pub struct Cli {
    /// Talk to a remote controller's admin API instead of the local default.
    #[arg(long, env = "SHOAL_URL", global = true)]
    pub remote: Option<String>,

    /// Bearer token for the remote admin API.
    #[arg(long, env = "SHOAL_TOKEN", global = true)]
    pub token: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the controller: HTTP API, worker pool, and embedded registry.
    Serve {
        #[arg(long)]
        port: Option<u16>,
        #[arg(long)]
        db: Option<String>,
        #[arg(long = "log-level")]
        log_level: Option<String>,
        #[arg(long = "encryption-key", env = "SHOAL_ENCRYPTION_KEY")]
        encryption_key: Option<String>,
        /// Run against an in-memory store instead of Postgres; state is
        /// lost on restart. For local smoke-testing only.
        #[arg(long)]
        ephemeral: bool,
    },

    /// Register or update a managed server's BMC credentials.
    RegisterServer {
        serial: String,
        #[arg(long)]
        bmc_endpoint: String,
        #[arg(long)]
        bmc_user: String,
        #[arg(long)]
        bmc_password: String,
        #[arg(long, default_value = "generic")]
        vendor_tag: String,
    },

    /// Submit a provisioning job for a registered server.
    CreateJob {
        server_serial: String,
        /// Path to a recipe JSON file, or `-` for stdin.
        recipe: String,
        #[arg(long)]
        maintenance_iso_url: Option<String>,
    },

    /// Show a job's current status and event log.
    GetJob { job_id: uuid::Uuid },
}

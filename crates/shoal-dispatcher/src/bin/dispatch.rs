use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use shoal_dispatcher::{run, DispatchConfig, Dependencies};
use tracing_subscriber::EnvFilter;

/// Target-side provisioning dispatcher: reads the recipe off the mounted
/// task ISO, writes `recipe.env` and payload files, and starts the task
/// systemd unit.
#[derive(Debug, Parser)]
#[command(name = "dispatch", about = "Run the provisioning dispatcher against a mounted task ISO", version)]
struct Cli {
    /// Device to wait for and mount before reading the recipe, e.g. /dev/sr0.
    #[arg(long)]
    device: Option<PathBuf>,

    #[arg(long, default_value_t = 60)]
    device_wait_timeout_secs: u64,

    #[arg(long, default_value = "/mnt/task")]
    task_mount_dir: PathBuf,

    /// Skip the wait/mount step; recipe.json is already present at
    /// --task-mount-dir (used by test harnesses and when the caller has
    /// mounted the device itself).
    #[arg(long)]
    skip_mount: bool,

    #[arg(long, default_value = "/run/provision")]
    env_dir: PathBuf,

    #[arg(long)]
    serial_override: Option<String>,

    #[arg(long, default_value = "PROVISIONER_SERIAL")]
    serial_env_key: String,

    #[arg(long)]
    task_target_override: Option<String>,

    /// Write recipe.env and payloads but don't start the systemd unit.
    #[arg(long)]
    no_start: bool,

    #[arg(long)]
    dispatcher_version: Option<String>,

    /// Allow running as a non-root user (tests, dry runs).
    #[arg(long)]
    no_require_root: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).with_target(false).init();

    let cli = Cli::parse();
    let cfg = DispatchConfig {
        device_path: cli.device,
        device_wait_timeout: Duration::from_secs(cli.device_wait_timeout_secs),
        task_mount_dir: cli.task_mount_dir,
        skip_mount: cli.skip_mount,
        env_dir: cli.env_dir,
        serial_override: cli.serial_override,
        serial_env_key: cli.serial_env_key,
        task_target_override: cli.task_target_override,
        no_start: cli.no_start,
        dispatcher_version: cli.dispatcher_version,
        require_root: !cli.no_require_root,
    };
    let deps = Dependencies::system();

    match run(&deps, &cfg) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, exit_code = e.exit_code(), "dispatcher failed");
            ExitCode::from(e.exit_code() as u8)
        }
    }
}

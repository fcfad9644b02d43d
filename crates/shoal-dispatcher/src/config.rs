use std::path::PathBuf;
use std::time::Duration;

/// Flat dispatcher invocation config, the target-side counterpart to
/// `shoal_config::WorkerConfig`/`RegistryConfig` — a single struct parsed
/// once (from CLI flags in production, built directly in tests) and
/// threaded through `run`.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Device to wait for before mounting, e.g. `/dev/sr0`. `None` skips
    /// the device-wait step entirely (`skip_mount`).
    pub device_path: Option<PathBuf>,
    pub device_wait_timeout: Duration,
    pub task_mount_dir: PathBuf,
    pub skip_mount: bool,
    pub env_dir: PathBuf,
    pub serial_override: Option<String>,
    pub serial_env_key: String,
    pub task_target_override: Option<String>,
    pub no_start: bool,
    pub dispatcher_version: Option<String>,
    pub require_root: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        DispatchConfig {
            device_path: None,
            device_wait_timeout: Duration::from_secs(60),
            task_mount_dir: PathBuf::from("/mnt/task"),
            skip_mount: true,
            env_dir: PathBuf::from("/run/provision"),
            serial_override: None,
            serial_env_key: "PROVISIONER_SERIAL".to_string(),
            task_target_override: None,
            no_start: false,
            dispatcher_version: None,
            require_root: true,
        }
    }
}

use std::collections::BTreeMap;
use std::path::Path;

use shoal_domain::atomic::write_atomic;
use shoal_domain::Recipe;

use crate::config::DispatchConfig;
use crate::deps::Dependencies;
use crate::error::DispatchError;
use crate::serial::resolve_serial;

const RESERVED_ENV_KEYS: &[&str] = &[
    "TASK_TARGET",
    "TARGET_DISK",
    "SERIAL_NUMBER",
    "WORKFLOW_STARTED_AT",
    "DISPATCHER_VERSION",
    "SCHEMA_VERSION",
    "SCHEMA_ID",
    "OCI_URL",
    "FIRMWARE_URL",
    "WIM_INDEX",
];

/// Runs the dispatcher workflow once (spec.md §4.7): wait for and mount the
/// task device, read and validate the recipe, resolve the serial number,
/// write `recipe.env` and any payload files, and start the task systemd
/// unit. Returns on first failure; the binary maps the error to the
/// matching exit code.
pub fn run(deps: &Dependencies, cfg: &DispatchConfig) -> Result<(), DispatchError> {
    if cfg.require_root && !running_as_root() {
        return Err(DispatchError::PrivilegeError("dispatcher must run as root (use --no-require-root to override)".into()));
    }

    if !cfg.skip_mount {
        wait_for_device(deps, cfg)?;
        mount_device(deps, cfg)?;
    }

    let schema_path = cfg.task_mount_dir.join("recipe.schema.json");
    let recipe_path = cfg.task_mount_dir.join("recipe.json");

    let schema_bytes = std::fs::read_to_string(&schema_path)
        .map_err(|e| DispatchError::SchemaError(format!("reading {}: {e}", schema_path.display())))?;
    if schema_bytes.trim().is_empty() {
        return Err(DispatchError::SchemaError(format!("{} is empty", schema_path.display())));
    }

    let recipe_bytes = std::fs::read_to_string(&recipe_path)
        .map_err(|e| DispatchError::RecipeReadError(format!("reading {}: {e}", recipe_path.display())))?;
    if recipe_bytes.trim().is_empty() {
        return Err(DispatchError::RecipeReadError(format!("{} is empty", recipe_path.display())));
    }

    let schema_doc: serde_json::Value = serde_json::from_str(&schema_bytes)
        .map_err(|e| DispatchError::SchemaError(format!("recipe.schema.json is not valid JSON: {e}")))?;
    let compiled = jsonschema::JSONSchema::compile(&schema_doc)
        .map_err(|e| DispatchError::SchemaError(format!("recipe.schema.json does not compile: {e}")))?;

    let recipe_doc: serde_json::Value = serde_json::from_str(&recipe_bytes)
        .map_err(|e| DispatchError::SchemaInvalid(format!("recipe.json is not valid JSON: {e}")))?;
    compiled.validate(&recipe_doc).map_err(|mut errors| {
        let message = errors.next().map(|e| e.to_string()).unwrap_or_else(|| "recipe failed schema validation".to_string());
        DispatchError::SchemaInvalid(message)
    })?;

    let mut recipe: Recipe = serde_json::from_value(recipe_doc)
        .map_err(|e| DispatchError::SchemaInvalid(format!("recipe does not match the expected shape: {e}")))?;
    if let Some(target) = &cfg.task_target_override {
        recipe.target = target.clone();
    }

    let serial = resolve_serial(cfg, deps.serial_source.as_ref());

    std::fs::create_dir_all(&cfg.env_dir)
        .map_err(|e| DispatchError::OutputError(format!("creating {}: {e}", cfg.env_dir.display())))?;

    let started_at = deps.clock.now();
    let env_lines = build_env_lines(&recipe, cfg, &serial, started_at);
    write_atomic(&cfg.env_dir.join("recipe.env"), env_lines.join("").as_bytes())
        .map_err(|e| DispatchError::OutputError(format!("writing recipe.env: {e}")))?;

    write_outputs(&recipe, &cfg.env_dir)?;

    if !cfg.no_start {
        let ok = deps.exec.run("systemctl", &["start", recipe.target.as_str()])?;
        if !ok {
            return Err(DispatchError::SystemdError(format!("systemctl start {} exited non-zero", recipe.target)));
        }
    }

    Ok(())
}

/// Builds the sorted `recipe.env` lines (spec.md §4.7 step 6): the four
/// required keys, the optional keys present on the recipe, and the
/// recipe's own `env` map uppercased — dropping (and logging) any entry
/// that collides with a reserved key.
fn build_env_lines(
    recipe: &Recipe,
    cfg: &DispatchConfig,
    serial: &str,
    started_at: chrono::DateTime<chrono::Utc>,
) -> Vec<String> {
    let mut env: BTreeMap<String, String> = BTreeMap::new();
    env.insert("TASK_TARGET".to_string(), recipe.target.clone());
    env.insert("TARGET_DISK".to_string(), recipe.disk.clone());
    env.insert("SERIAL_NUMBER".to_string(), serial.to_string());
    env.insert("WORKFLOW_STARTED_AT".to_string(), started_at.to_rfc3339_opts(chrono::SecondsFormat::Secs, true));

    if let Some(v) = &cfg.dispatcher_version {
        env.insert("DISPATCHER_VERSION".to_string(), v.clone());
    }
    if let Some(v) = &recipe.schema_version {
        env.insert("SCHEMA_VERSION".to_string(), v.clone());
    }
    if let Some(v) = &recipe.oci_url {
        env.insert("OCI_URL".to_string(), v.clone());
    }
    if let Some(v) = &recipe.firmware_url {
        env.insert("FIRMWARE_URL".to_string(), v.clone());
    }
    if let Some(v) = recipe.wim_index {
        env.insert("WIM_INDEX".to_string(), v.to_string());
    }

    for line in recipe.to_env_lines() {
        let (key, value) = line.split_once('=').expect("to_env_lines always emits KEY=value");
        if RESERVED_ENV_KEYS.contains(&key) {
            tracing::warn!(key, "recipe.env entry collides with a reserved key, dropping override");
            continue;
        }
        env.insert(key.to_string(), value.to_string());
    }

    env.into_iter().map(|(k, v)| format!("{k}={v}\n")).collect()
}

/// Writes `layout.json` and any present payload files (spec.md §4.7 step 7).
fn write_outputs(recipe: &Recipe, env_dir: &Path) -> Result<(), DispatchError> {
    if let Some(layout) = &recipe.partition_layout {
        let pretty = serde_json::to_vec_pretty(layout)
            .map_err(|e| DispatchError::OutputError(format!("serializing partition_layout: {e}")))?;
        write_atomic(&env_dir.join("layout.json"), &pretty)
            .map_err(|e| DispatchError::OutputError(format!("writing layout.json: {e}")))?;
    }
    for (name, field) in recipe.payload_files() {
        let value = field.resolve().map_err(|e| DispatchError::SchemaInvalid(e.to_string()))?;
        write_atomic(&env_dir.join(name), value.as_bytes())
            .map_err(|e| DispatchError::OutputError(format!("writing {name}: {e}")))?;
    }
    Ok(())
}

fn wait_for_device(deps: &Dependencies, cfg: &DispatchConfig) -> Result<(), DispatchError> {
    let device = cfg
        .device_path
        .as_ref()
        .ok_or_else(|| DispatchError::DeviceTimeout("no device_path configured".into()))?;
    let deadline = deps.clock.now() + chrono::Duration::from_std(cfg.device_wait_timeout).unwrap_or_default();
    loop {
        if device.exists() {
            return Ok(());
        }
        if deps.clock.now() >= deadline {
            return Err(DispatchError::DeviceTimeout(format!("{} did not appear in time", device.display())));
        }
        std::thread::sleep(std::time::Duration::from_millis(200));
    }
}

fn mount_device(deps: &Dependencies, cfg: &DispatchConfig) -> Result<(), DispatchError> {
    std::fs::create_dir_all(&cfg.task_mount_dir)
        .map_err(|e| DispatchError::MountFailure(format!("creating {}: {e}", cfg.task_mount_dir.display())))?;
    let device = cfg.device_path.as_ref().expect("checked by wait_for_device");
    let ok = deps.exec.run(
        "mount",
        &["-o", "ro", device.to_str().unwrap_or_default(), cfg.task_mount_dir.to_str().unwrap_or_default()],
    )?;
    if !ok {
        return Err(DispatchError::MountFailure(format!("mount {} failed", device.display())));
    }
    Ok(())
}

/// Reads the effective uid from `/proc/self/status` rather than calling
/// `geteuid(2)` directly, so the dispatcher stays free of `unsafe`.
fn running_as_root() -> bool {
    let Ok(status) = std::fs::read_to_string("/proc/self/status") else {
        return true;
    };
    status
        .lines()
        .find_map(|line| line.strip_prefix("Uid:"))
        .and_then(|rest| rest.split_whitespace().nth(1))
        .map(|euid| euid == "0")
        .unwrap_or(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deps::testing::{FakeSerialSource, FixedClock, RecordingExec};
    use chrono::TimeZone;
    use shoal_config::RECIPE_SCHEMA_JSON;

    fn deps_with(exec: RecordingExec) -> Dependencies {
        Dependencies {
            clock: Box::new(FixedClock(chrono::Utc.with_ymd_and_hms(2025, 11, 6, 12, 0, 0).unwrap())),
            exec: Box::new(exec),
            serial_source: Box::new(FakeSerialSource::default()),
        }
    }

    fn write_task_mount(dir: &Path, recipe_json: &str) {
        std::fs::write(dir.join("recipe.schema.json"), RECIPE_SCHEMA_JSON).unwrap();
        std::fs::write(dir.join("recipe.json"), recipe_json).unwrap();
    }

    #[test]
    fn scenario_dispatcher_env_emission_matches_spec_example() {
        let task_mount = tempfile::tempdir().unwrap();
        let env_dir = tempfile::tempdir().unwrap();
        write_task_mount(
            task_mount.path(),
            r#"{
                "schema_version":"1.0",
                "task_target":"install-linux.target",
                "target_disk":"/dev/sda",
                "oci_url":"ctrl:8080/img:latest",
                "env":{"http_proxy":"http://p:3128"}
            }"#,
        );

        let exec = RecordingExec::always_ok();
        let deps = deps_with(exec);
        let cfg = DispatchConfig {
            task_mount_dir: task_mount.path().to_path_buf(),
            env_dir: env_dir.path().to_path_buf(),
            serial_override: Some("SER123".to_string()),
            require_root: false,
            ..DispatchConfig::default()
        };

        run(&deps, &cfg).unwrap();

        let contents = std::fs::read_to_string(env_dir.path().join("recipe.env")).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(
            lines,
            vec![
                "HTTP_PROXY=http://p:3128",
                "OCI_URL=ctrl:8080/img:latest",
                "SCHEMA_VERSION=1.0",
                "SERIAL_NUMBER=SER123",
                "TARGET_DISK=/dev/sda",
                "TASK_TARGET=install-linux.target",
                "WORKFLOW_STARTED_AT=2025-11-06T12:00:00Z",
            ]
        );
    }

    #[test]
    fn invokes_systemctl_start_exactly_once_with_task_target() {
        let task_mount = tempfile::tempdir().unwrap();
        let env_dir = tempfile::tempdir().unwrap();
        write_task_mount(task_mount.path(), r#"{"task_target":"install-linux.target","target_disk":"/dev/sda"}"#);

        let exec = RecordingExec::always_ok();
        let deps = deps_with(exec.clone());
        let cfg = DispatchConfig {
            task_mount_dir: task_mount.path().to_path_buf(),
            env_dir: env_dir.path().to_path_buf(),
            serial_override: Some("SER123".to_string()),
            require_root: false,
            ..DispatchConfig::default()
        };

        run(&deps, &cfg).unwrap();
        assert_eq!(exec.calls(), vec![("systemctl".to_string(), vec!["start".to_string(), "install-linux.target".to_string()])]);
    }

    #[test]
    fn missing_recipe_json_is_recipe_read_error() {
        let task_mount = tempfile::tempdir().unwrap();
        let env_dir = tempfile::tempdir().unwrap();
        std::fs::write(task_mount.path().join("recipe.schema.json"), RECIPE_SCHEMA_JSON).unwrap();

        let deps = deps_with(RecordingExec::always_ok());
        let cfg = DispatchConfig {
            task_mount_dir: task_mount.path().to_path_buf(),
            env_dir: env_dir.path().to_path_buf(),
            require_root: false,
            ..DispatchConfig::default()
        };

        let err = run(&deps, &cfg).unwrap_err();
        assert_eq!(err.exit_code(), 13);
    }

    #[test]
    fn empty_schema_file_is_schema_error() {
        let task_mount = tempfile::tempdir().unwrap();
        let env_dir = tempfile::tempdir().unwrap();
        std::fs::write(task_mount.path().join("recipe.schema.json"), "").unwrap();
        std::fs::write(task_mount.path().join("recipe.json"), "{}").unwrap();

        let deps = deps_with(RecordingExec::always_ok());
        let cfg = DispatchConfig {
            task_mount_dir: task_mount.path().to_path_buf(),
            env_dir: env_dir.path().to_path_buf(),
            require_root: false,
            ..DispatchConfig::default()
        };

        let err = run(&deps, &cfg).unwrap_err();
        assert_eq!(err.exit_code(), 12);
    }

    #[test]
    fn recipe_missing_required_field_is_schema_invalid() {
        let task_mount = tempfile::tempdir().unwrap();
        let env_dir = tempfile::tempdir().unwrap();
        write_task_mount(task_mount.path(), r#"{"task_target":"install-linux.target"}"#);

        let deps = deps_with(RecordingExec::always_ok());
        let cfg = DispatchConfig {
            task_mount_dir: task_mount.path().to_path_buf(),
            env_dir: env_dir.path().to_path_buf(),
            require_root: false,
            ..DispatchConfig::default()
        };

        let err = run(&deps, &cfg).unwrap_err();
        assert_eq!(err.exit_code(), 14);
    }

    #[test]
    fn systemctl_failure_is_systemd_error() {
        let task_mount = tempfile::tempdir().unwrap();
        let env_dir = tempfile::tempdir().unwrap();
        write_task_mount(task_mount.path(), r#"{"task_target":"install-linux.target","target_disk":"/dev/sda"}"#);

        let exec = RecordingExec::with_results(vec![false]);
        let deps = deps_with(exec);
        let cfg = DispatchConfig {
            task_mount_dir: task_mount.path().to_path_buf(),
            env_dir: env_dir.path().to_path_buf(),
            require_root: false,
            ..DispatchConfig::default()
        };

        let err = run(&deps, &cfg).unwrap_err();
        assert_eq!(err.exit_code(), 16);
    }

    #[test]
    fn no_start_skips_systemctl_invocation() {
        let task_mount = tempfile::tempdir().unwrap();
        let env_dir = tempfile::tempdir().unwrap();
        write_task_mount(task_mount.path(), r#"{"task_target":"install-linux.target","target_disk":"/dev/sda"}"#);

        let exec = RecordingExec::always_ok();
        let deps = Dependencies {
            clock: Box::new(FixedClock(chrono::Utc.with_ymd_and_hms(2025, 11, 6, 12, 0, 0).unwrap())),
            exec: Box::new(exec),
            serial_source: Box::new(FakeSerialSource::default()),
        };
        let cfg = DispatchConfig {
            task_mount_dir: task_mount.path().to_path_buf(),
            env_dir: env_dir.path().to_path_buf(),
            require_root: false,
            no_start: true,
            ..DispatchConfig::default()
        };

        run(&deps, &cfg).unwrap();
    }

    #[test]
    fn payload_files_and_layout_are_written() {
        let task_mount = tempfile::tempdir().unwrap();
        let env_dir = tempfile::tempdir().unwrap();
        write_task_mount(
            task_mount.path(),
            r##"{
                "task_target":"install-linux.target",
                "target_disk":"/dev/sda",
                "user_data":"#cloud-config\n",
                "partition_layout":[{"size":"512M"}]
            }"##,
        );

        let deps = deps_with(RecordingExec::always_ok());
        let cfg = DispatchConfig {
            task_mount_dir: task_mount.path().to_path_buf(),
            env_dir: env_dir.path().to_path_buf(),
            require_root: false,
            ..DispatchConfig::default()
        };

        run(&deps, &cfg).unwrap();
        assert!(env_dir.path().join("user-data").exists());
        assert!(env_dir.path().join("layout.json").exists());
    }
}

use crate::config::DispatchConfig;
use crate::deps::SerialSource;

/// Values a source can return that mean "no real serial" — vendors pad
/// unset BMC fields with these instead of leaving them empty.
const PLACEHOLDERS: &[&str] = &["unknown", "not specified", "to be filled by o.e.m.", ""];

fn is_placeholder(value: &str) -> bool {
    PLACEHOLDERS.iter().any(|p| p.eq_ignore_ascii_case(value.trim()))
}

/// Resolves the host serial number via the fallback chain in spec.md
/// §4.7 step 4: explicit override → env var → `/sys/class/dmi/id/product_serial`
/// → `dmidecode -s system-serial-number` → literal `"unknown"`, stopping
/// at the first non-placeholder value.
pub fn resolve_serial(cfg: &DispatchConfig, serial_source: &dyn SerialSource) -> String {
    let candidates = [
        cfg.serial_override.clone(),
        std::env::var(&cfg.serial_env_key).ok(),
        serial_source.product_serial(),
        serial_source.dmidecode_serial(),
    ];
    for candidate in candidates.into_iter().flatten() {
        if !is_placeholder(&candidate) {
            return candidate;
        }
    }
    "unknown".to_string()
}

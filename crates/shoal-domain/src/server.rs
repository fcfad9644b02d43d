use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A managed bare-metal server, keyed by its (vendor-assigned) serial number.
///
/// Created/updated by the admin API (out of core scope); the core only reads
/// these rows to resolve a BMC endpoint for a job's target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Server {
    pub serial: String,
    pub bmc_endpoint: String,
    pub bmc_user: String,
    /// Never logged, never echoed in an API response.
    pub bmc_password: String,
    pub vendor_tag: String,
    pub last_seen: DateTime<Utc>,
}

impl Server {
    /// Validates the invariants spec.md §3 places on a `Server` row: the
    /// serial is non-empty and the BMC endpoint parses as an absolute URL.
    pub fn validate(&self) -> Result<(), String> {
        if self.serial.trim().is_empty() {
            return Err("serial must not be empty".into());
        }
        match url::Url::parse(&self.bmc_endpoint) {
            Ok(url) if url.cannot_be_a_base() => {
                Err(format!("bmc_endpoint '{}' is not an absolute URL", self.bmc_endpoint))
            }
            Ok(_) => Ok(()),
            Err(e) => Err(format!("bmc_endpoint '{}' is not a valid URL: {e}", self.bmc_endpoint)),
        }
    }
}

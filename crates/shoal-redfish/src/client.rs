use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use shoal_domain::Server;

use crate::error::RedfishError;

/// One Redfish-speaking BMC session. Implementations perform the four
/// operations the worker's provisioning sequence needs (spec.md §4.10);
/// nothing here speaks a vendor-specific dialect — the minimal common
/// subset of the Redfish `VirtualMedia`/`ComputerSystem` schemas is enough
/// for insert/eject/boot-override/power-cycle.
#[async_trait]
pub trait RedfishClient: Send + Sync {
    async fn insert_virtual_media(&self, image_url: &str) -> Result<(), RedfishError>;
    async fn eject_virtual_media(&self) -> Result<(), RedfishError>;
    async fn set_one_time_boot_virtual_media(&self) -> Result<(), RedfishError>;
    async fn clear_boot_override(&self) -> Result<(), RedfishError>;
    async fn power_cycle(&self) -> Result<(), RedfishError>;
}

/// Builds a [`RedfishClient`] for a given [`Server`] row. The worker holds
/// one factory and constructs a fresh client per job, matching
/// `nclav-driver::DriverRegistry`'s "resolve the right backend for this
/// target" role.
pub trait RedfishClientFactory: Send + Sync {
    fn client_for(&self, server: &Server) -> Arc<dyn RedfishClient>;
}

/// Real client talking to a BMC's Redfish API over HTTPS with basic auth.
/// Vendor dialects (iDRAC, iLO) differ in manager/system resource paths;
/// this client uses the standard `/redfish/v1/Systems/1` and
/// `.../Managers/1/VirtualMedia/CD` endpoints that all three major vendors
/// alias their primary system/manager to.
pub struct HttpRedfishClient {
    base_url: String,
    username: String,
    password: String,
    vendor: String,
    http: reqwest::Client,
}

impl HttpRedfishClient {
    pub fn new(server: &Server, timeout: Duration) -> Result<Self, RedfishError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(true) // BMCs routinely ship self-signed certs.
            .build()
            .map_err(|e| RedfishError::Transport(e.to_string()))?;
        Ok(HttpRedfishClient {
            base_url: server.bmc_endpoint.trim_end_matches('/').to_string(),
            username: server.bmc_user.clone(),
            password: server.bmc_password.clone(),
            vendor: server.vendor_tag.clone(),
            http,
        })
    }

    pub fn vendor(&self) -> &str {
        &self.vendor
    }

    async fn patch(&self, path: &str, body: serde_json::Value) -> Result<(), RedfishError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http
            .patch(&url)
            .basic_auth(&self.username, Some(&self.password))
            .json(&body)
            .send()
            .await
            .map_err(classify_reqwest_error)?;
        check_status(response).await
    }

    async fn post(&self, path: &str, body: serde_json::Value) -> Result<(), RedfishError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http
            .post(&url)
            .basic_auth(&self.username, Some(&self.password))
            .json(&body)
            .send()
            .await
            .map_err(classify_reqwest_error)?;
        check_status(response).await
    }
}

fn classify_reqwest_error(e: reqwest::Error) -> RedfishError {
    if e.is_timeout() {
        RedfishError::Timeout
    } else {
        RedfishError::Transport(e.to_string())
    }
}

async fn check_status(response: reqwest::Response) -> Result<(), RedfishError> {
    let status = response.status();
    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        return Err(RedfishError::Auth);
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(RedfishError::Http { status: status.as_u16(), body });
    }
    Ok(())
}

const VIRTUAL_MEDIA_PATH: &str = "/redfish/v1/Managers/1/VirtualMedia/CD";
const SYSTEM_PATH: &str = "/redfish/v1/Systems/1";
const RESET_ACTION_PATH: &str = "/redfish/v1/Systems/1/Actions/ComputerSystem.Reset";

#[async_trait]
impl RedfishClient for HttpRedfishClient {
    async fn insert_virtual_media(&self, image_url: &str) -> Result<(), RedfishError> {
        self.post(
            &format!("{VIRTUAL_MEDIA_PATH}/Actions/VirtualMedia.InsertMedia"),
            json!({ "Image": image_url, "Inserted": true, "WriteProtected": true }),
        )
        .await
    }

    async fn eject_virtual_media(&self) -> Result<(), RedfishError> {
        self.post(
            &format!("{VIRTUAL_MEDIA_PATH}/Actions/VirtualMedia.EjectMedia"),
            json!({}),
        )
        .await
    }

    async fn set_one_time_boot_virtual_media(&self) -> Result<(), RedfishError> {
        self.patch(
            SYSTEM_PATH,
            json!({
                "Boot": {
                    "BootSourceOverrideEnabled": "Once",
                    "BootSourceOverrideTarget": "Cd",
                }
            }),
        )
        .await
    }

    async fn clear_boot_override(&self) -> Result<(), RedfishError> {
        self.patch(
            SYSTEM_PATH,
            json!({ "Boot": { "BootSourceOverrideEnabled": "Disabled" } }),
        )
        .await
    }

    async fn power_cycle(&self) -> Result<(), RedfishError> {
        self.post(RESET_ACTION_PATH, json!({ "ResetType": "ForceRestart" })).await
    }
}

/// Default factory producing [`HttpRedfishClient`]s.
pub struct HttpRedfishClientFactory {
    pub timeout: Duration,
}

impl RedfishClientFactory for HttpRedfishClientFactory {
    fn client_for(&self, server: &Server) -> Arc<dyn RedfishClient> {
        match HttpRedfishClient::new(server, self.timeout) {
            Ok(client) => Arc::new(client),
            // Building the reqwest client only fails on malformed TLS/config,
            // never on reachability; surface it lazily on first call instead.
            Err(_) => Arc::new(UnreachableClient),
        }
    }
}

struct UnreachableClient;

#[async_trait]
impl RedfishClient for UnreachableClient {
    async fn insert_virtual_media(&self, _image_url: &str) -> Result<(), RedfishError> {
        Err(RedfishError::Transport("client could not be constructed".into()))
    }
    async fn eject_virtual_media(&self) -> Result<(), RedfishError> {
        Err(RedfishError::Transport("client could not be constructed".into()))
    }
    async fn set_one_time_boot_virtual_media(&self) -> Result<(), RedfishError> {
        Err(RedfishError::Transport("client could not be constructed".into()))
    }
    async fn clear_boot_override(&self) -> Result<(), RedfishError> {
        Err(RedfishError::Transport("client could not be constructed".into()))
    }
    async fn power_cycle(&self) -> Result<(), RedfishError> {
        Err(RedfishError::Transport("client could not be constructed".into()))
    }
}

/// In-memory client recording calls, used by worker tests as well as this
/// crate's own — same role as `nclav-driver::LocalDriver`.
pub mod testing {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::{RedfishClient, RedfishClientFactory, RedfishError};
    use shoal_domain::Server;
    use std::sync::Arc;

    #[derive(Default)]
    pub struct MockRedfishClient {
        pub calls: Mutex<Vec<&'static str>>,
        pub fail_power_cycle: bool,
    }

    #[async_trait]
    impl RedfishClient for MockRedfishClient {
        async fn insert_virtual_media(&self, _image_url: &str) -> Result<(), RedfishError> {
            self.calls.lock().unwrap().push("insert_virtual_media");
            Ok(())
        }
        async fn eject_virtual_media(&self) -> Result<(), RedfishError> {
            self.calls.lock().unwrap().push("eject_virtual_media");
            Ok(())
        }
        async fn set_one_time_boot_virtual_media(&self) -> Result<(), RedfishError> {
            self.calls.lock().unwrap().push("set_one_time_boot_virtual_media");
            Ok(())
        }
        async fn clear_boot_override(&self) -> Result<(), RedfishError> {
            self.calls.lock().unwrap().push("clear_boot_override");
            Ok(())
        }
        async fn power_cycle(&self) -> Result<(), RedfishError> {
            self.calls.lock().unwrap().push("power_cycle");
            if self.fail_power_cycle {
                Err(RedfishError::Http { status: 503, body: "busy".into() })
            } else {
                Ok(())
            }
        }
    }

    /// Always hands out a fresh, independent `MockRedfishClient` per server —
    /// worker tests inspect each job's client separately via the outcome it
    /// records, not via this factory.
    #[derive(Default)]
    pub struct MockRedfishClientFactory {
        pub fail_power_cycle: bool,
    }

    impl RedfishClientFactory for MockRedfishClientFactory {
        fn client_for(&self, _server: &Server) -> Arc<dyn RedfishClient> {
            Arc::new(MockRedfishClient { fail_power_cycle: self.fail_power_cycle, ..Default::default() })
        }
    }
}

use std::io::Read as _;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use shoal_config::{ControllerConfig, RegistryConfig, WorkerConfig};
use shoal_redfish::HttpRedfishClientFactory;
use shoal_registry::{GarbageCollector, RegistryState};
use shoal_store::{InMemoryStore, PostgresStore, StateStore};
use shoal_worker::{GenIsoImageBuilder, WorkerLoop};
use tokio_util::sync::CancellationToken;

// ── Serve ───────────────────────────────────────────────────────────────────

pub async fn serve(
    port: Option<u16>,
    db: Option<String>,
    log_level: Option<String>,
    encryption_key: Option<String>,
    ephemeral: bool,
) -> Result<()> {
    let controller_cfg = ControllerConfig::from_env()
        .unwrap_or_else(|_| ControllerConfig {
            port: 8080,
            db_url: "postgres://localhost/shoal".to_string(),
            log_level: "info".to_string(),
            encryption_key: encryption_key.clone().unwrap_or_else(|| "dev-only-key".to_string()),
            admin_password: None,
        })
        .apply_overrides(port, db, log_level, encryption_key);

    let registry_cfg = RegistryConfig::from_env().context("loading registry configuration")?;
    let worker_cfg = WorkerConfig::from_env().context("loading worker configuration")?;

    let store: Arc<dyn StateStore> = if ephemeral {
        tracing::warn!("running with an in-memory store — all job/server state is lost on restart");
        Arc::new(InMemoryStore::new())
    } else {
        Arc::new(
            PostgresStore::connect(&controller_cfg.db_url)
                .await
                .with_context(|| format!("connecting to {}", controller_cfg.db_url))?,
        )
    };

    let task_root = std::env::temp_dir().join("shoal-tasks");
    std::fs::create_dir_all(&task_root)
        .with_context(|| format!("creating task root at {}", task_root.display()))?;

    let worker = Arc::new(WorkerLoop::new(
        store.clone(),
        Arc::new(HttpRedfishClientFactory { timeout: worker_cfg.redfish_timeout }),
        Arc::new(GenIsoImageBuilder),
        worker_cfg,
        task_root.clone(),
    ));

    let shutdown = CancellationToken::new();
    let worker_handle = tokio::spawn(worker.clone().run(shutdown.clone()));

    let api_state = shoal_api::AppState {
        store,
        worker,
        recipe_validator: Arc::new(shoal_config::RecipeValidator::new()?),
        webhook_secret: std::env::var("SHOAL_WEBHOOK_SECRET").unwrap_or_else(|_| "changeme".to_string()),
        task_root,
    };

    let mut app = shoal_api::build_router(api_state);

    if registry_cfg.enabled {
        let registry_state = RegistryState::new(&registry_cfg)?;
        let gc = Arc::new(GarbageCollector::new(
            registry_state.blobs.clone(),
            registry_state.manifests.clone(),
            chrono::Duration::from_std(registry_cfg.gc_grace_period).unwrap_or_else(|_| chrono::Duration::hours(24)),
        )?);
        let gc_interval = registry_cfg.gc_interval;
        let gc_shutdown = shutdown.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(gc_interval);
            loop {
                tokio::select! {
                    _ = gc_shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let stats = gc.run(chrono::Utc::now());
                        tracing::info!(?stats, "registry GC pass complete");
                    }
                }
            }
        });
        app = app.merge(shoal_registry::build_router(registry_state));
    }

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", controller_cfg.port))
        .await
        .with_context(|| format!("binding port {}", controller_cfg.port))?;
    tracing::info!(port = controller_cfg.port, "shoald listening");

    let serve_shutdown = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            serve_shutdown.cancel();
        })
        .await
        .context("HTTP server terminated unexpectedly")?;

    let _ = worker_handle.await;
    Ok(())
}

// ── Admin client commands ────────────────────────────────────────────────────

fn server_url(remote: Option<String>) -> String {
    remote.unwrap_or_else(|| "http://localhost:8080".into())
}

fn authed_client(token: Option<&str>) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder().timeout(Duration::from_secs(30));
    if let Some(token) = token {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::AUTHORIZATION,
            reqwest::header::HeaderValue::from_str(&format!("Bearer {token}"))
                .context("token contains invalid header characters")?,
        );
        builder = builder.default_headers(headers);
    }
    builder.build().context("building HTTP client")
}

pub async fn register_server(
    serial: String,
    bmc_endpoint: String,
    bmc_user: String,
    bmc_password: String,
    vendor_tag: String,
    remote: Option<String>,
    token: Option<String>,
) -> Result<()> {
    let base = server_url(remote);
    let client = authed_client(token.as_deref())?;
    let resp = client
        .put(format!("{}/api/v1/servers/{serial}", base.trim_end_matches('/')))
        .json(&serde_json::json!({
            "bmc_endpoint": bmc_endpoint,
            "bmc_user": bmc_user,
            "bmc_password": bmc_password,
            "vendor_tag": vendor_tag,
        }))
        .send()
        .await
        .with_context(|| format!("failed to reach {base}"))?;

    let status = resp.status();
    let body: serde_json::Value = resp.json().await.unwrap_or_default();
    if !status.is_success() {
        anyhow::bail!("server registration failed ({status}): {body}");
    }
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}

pub async fn create_job(
    server_serial: String,
    recipe: String,
    maintenance_iso_url: Option<String>,
    remote: Option<String>,
    token: Option<String>,
) -> Result<()> {
    let recipe_text = if recipe == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf).context("reading recipe from stdin")?;
        buf
    } else {
        std::fs::read_to_string(&recipe).with_context(|| format!("reading recipe file {recipe}"))?
    };
    let recipe_value: serde_json::Value = serde_json::from_str(&recipe_text).context("recipe is not valid JSON")?;

    let base = server_url(remote);
    let client = authed_client(token.as_deref())?;
    let resp = client
        .post(format!("{}/api/v1/jobs", base.trim_end_matches('/')))
        .json(&serde_json::json!({
            "server_serial": server_serial,
            "recipe": recipe_value,
            "maintenance_iso_url": maintenance_iso_url,
        }))
        .send()
        .await
        .with_context(|| format!("failed to reach {base}"))?;

    let status = resp.status();
    let body: serde_json::Value = resp.json().await.unwrap_or_default();
    if !status.is_success() {
        anyhow::bail!("job creation failed ({status}): {body}");
    }
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}

pub async fn get_job(job_id: uuid::Uuid, remote: Option<String>, token: Option<String>) -> Result<()> {
    let base = server_url(remote);
    let client = authed_client(token.as_deref())?;
    let resp = client
        .get(format!("{}/api/v1/jobs/{job_id}", base.trim_end_matches('/')))
        .send()
        .await
        .with_context(|| format!("failed to reach {base}"))?;

    let status = resp.status();
    let body: serde_json::Value = resp.json().await.unwrap_or_default();
    if !status.is_success() {
        anyhow::bail!("fetching job failed ({status}): {body}");
    }
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}

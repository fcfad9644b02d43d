use std::sync::Arc;

use shoal_config::RegistryConfig;
use tokio::sync::Semaphore;

use crate::audit::AuditLog;
use crate::blob::BlobStore;
use crate::error::RegistryError;
use crate::htpasswd::Htpasswd;
use crate::manifest::ManifestStore;
use crate::metrics::Metrics;
use crate::upload::UploadManager;

pub enum AuthBackend {
    None,
    Basic { user: String, password: String },
    Htpasswd(Htpasswd),
}

impl AuthBackend {
    pub fn verify(&self, user: &str, password: &str) -> bool {
        match self {
            AuthBackend::None => true,
            AuthBackend::Basic { user: u, password: p } => user == u && password == p,
            AuthBackend::Htpasswd(store) => store.verify(user, password),
        }
    }

    pub fn requires_auth(&self) -> bool {
        !matches!(self, AuthBackend::None)
    }
}

/// Shared, cloneable axum application state for the registry router.
#[derive(Clone)]
pub struct RegistryState {
    pub blobs: Arc<BlobStore>,
    pub manifests: Arc<ManifestStore>,
    pub uploads: Arc<UploadManager>,
    pub metrics: Arc<Metrics>,
    pub audit: Option<Arc<AuditLog>>,
    pub auth: Arc<AuthBackend>,
    pub upload_permits: Arc<Semaphore>,
}

impl RegistryState {
    pub fn new(cfg: &RegistryConfig) -> Result<Self, RegistryError> {
        let blobs = Arc::new(BlobStore::new(&cfg.storage_root)?);
        let manifests = Arc::new(ManifestStore::new(blobs.clone()));
        let uploads = Arc::new(UploadManager::new(blobs.clone())?);
        let metrics = Arc::new(Metrics::default());

        let audit = if cfg.enable_audit_log {
            let path = cfg
                .audit_log_path
                .as_ref()
                .ok_or_else(|| RegistryError::Internal("audit log enabled without a path".into()))?;
            Some(Arc::new(AuditLog::open(&std::path::PathBuf::from(path))?))
        } else {
            None
        };

        let auth = match cfg.auth_mode {
            shoal_config::RegistryAuthMode::None => AuthBackend::None,
            shoal_config::RegistryAuthMode::Basic => AuthBackend::Basic {
                user: cfg.basic_user.clone().unwrap_or_default(),
                password: cfg.basic_password.clone().unwrap_or_default(),
            },
            shoal_config::RegistryAuthMode::Htpasswd => {
                let path = cfg
                    .htpasswd_file
                    .as_ref()
                    .ok_or_else(|| RegistryError::Internal("htpasswd mode without a file".into()))?;
                AuthBackend::Htpasswd(Htpasswd::load(path)?)
            }
        };

        Ok(RegistryState {
            blobs,
            manifests,
            uploads,
            metrics,
            audit,
            auth: Arc::new(auth),
            upload_permits: Arc::new(Semaphore::new(cfg.max_concurrent_uploads as usize)),
        })
    }
}

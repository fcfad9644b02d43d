pub mod audit;
pub mod blob;
pub mod digest;
pub mod error;
pub mod gc;
pub mod htpasswd;
pub mod http;
pub mod manifest;
pub mod metrics;
pub mod state;
pub mod tag;
pub mod upload;

pub use blob::BlobStore;
pub use digest::Digest;
pub use error::RegistryError;
pub use gc::{GarbageCollector, GcStats};
pub use http::build_router;
pub use manifest::ManifestStore;
pub use metrics::Metrics;
pub use state::{AuthBackend, RegistryState};
pub use tag::TagStore;
pub use upload::UploadManager;

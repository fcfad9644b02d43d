pub mod atomic;
pub mod error;
pub mod ids;
pub mod job;
pub mod recipe;
pub mod server;

pub use error::DomainError;
pub use ids::{DeliveryId, JobId};
pub use job::{Job, JobEvent, JobStatus, LogLevel, WebhookDelivery, WebhookStatus};
pub use recipe::{PayloadField, Recipe};
pub use server::Server;

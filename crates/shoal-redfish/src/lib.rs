pub mod client;
pub mod correlation;
pub mod error;
pub mod metrics;
pub mod retry;

pub use client::{HttpRedfishClient, HttpRedfishClientFactory, RedfishClient, RedfishClientFactory};
pub use correlation::{CorrelationId, CorrelationLayer, CORRELATION_ID_HEADER};
pub use error::RedfishError;
pub use metrics::Metrics;
pub use retry::{retry, RetryConfig};

pub mod controller;
pub mod env;
pub mod error;
pub mod registry;
pub mod schema;
pub mod worker;

pub use controller::ControllerConfig;
pub use error::ConfigError;
pub use registry::{RegistryAuthMode, RegistryConfig};
pub use schema::{RecipeValidator, RECIPE_SCHEMA_JSON};
pub use worker::WorkerConfig;

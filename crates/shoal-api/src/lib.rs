pub mod error;
pub mod http;
pub mod jobs;
pub mod media;
pub mod servers;
pub mod state;
pub mod webhook;

pub use error::ApiError;
pub use http::build_router;
pub use state::AppState;

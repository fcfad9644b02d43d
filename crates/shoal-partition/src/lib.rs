pub mod error;
pub mod layout;
pub mod plan;

pub use error::PlanError;
pub use layout::{Format, LayoutEntry};
pub use plan::{plan, Command};

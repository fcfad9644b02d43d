pub mod config;
pub mod deps;
pub mod dispatch;
pub mod error;
pub mod serial;

pub use config::DispatchConfig;
pub use deps::{Clock, Dependencies, Exec, SerialSource, SystemClock, SystemExec, SystemSerialSource};
pub use dispatch::run;
pub use error::DispatchError;

pub mod error;
pub mod iso;
pub mod worker;

pub use error::WorkerError;
pub use iso::{GenIsoImageBuilder, IsoBuilder};
pub use worker::{WebhookOutcome, WorkerLoop};

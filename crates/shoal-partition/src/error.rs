use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlanError {
    #[error("invalid layout: {0}")]
    InvalidLayout(String),
}

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

/// Core-level errors
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid interval for occurrence {id}: end {end} is before start {start}")]
    InvalidInterval {
        id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

pub type CoreResult<T> = std::result::Result<T, CoreError>;

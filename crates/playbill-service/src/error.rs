use chrono::{DateTime, Utc};
use thiserror::Error;

/// Service layer errors - combines all error types
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error(transparent)]
    RfcError(#[from] playbill_rfc::error::RfcError),

    #[error(transparent)]
    CoreError(#[from] playbill_core::error::CoreError),

    #[error("Invalid timeline window: {until} is not after {from}")]
    InvalidWindow {
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    },
}

pub type ServiceResult<T> = std::result::Result<T, ServiceError>;

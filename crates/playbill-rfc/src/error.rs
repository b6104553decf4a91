use thiserror::Error;

use crate::rfc::recur::{ConversionError, RuleError};

/// Recurrence and timezone errors
#[derive(Error, Debug)]
pub enum RfcError {
    #[error(transparent)]
    Conversion(#[from] ConversionError),

    #[error(transparent)]
    Rule(#[from] RuleError),

    #[error(transparent)]
    CoreError(#[from] playbill_core::error::CoreError),
}

pub type RfcResult<T> = std::result::Result<T, RfcError>;

//! RFC 5545 recurrence plumbing: timezone normalization and rule expansion.

pub mod error;
pub mod rfc;

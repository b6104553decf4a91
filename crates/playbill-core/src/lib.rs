//! Core records, configuration and errors shared by the playbill crates.
//!
//! Nothing in here knows about recurrence expansion or timezones beyond
//! carrying the authored values around.

pub mod config;
pub mod constants;
pub mod error;
pub mod model;

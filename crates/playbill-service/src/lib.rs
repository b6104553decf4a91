//! Timeline services: merging sequence recurrences and resolving overlaps.

pub mod error;
pub mod timeline;

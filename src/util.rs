//! Shared utilities.

pub mod sortable;
pub mod varint;

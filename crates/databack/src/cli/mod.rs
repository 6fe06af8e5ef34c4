//! Command implementations for the `databack` binary.

pub mod backup;
pub mod config;
pub mod error;
pub mod output;
pub mod restore;
pub mod versions;

//! PostgreSQL backend for DataBack
//!
//! Implements the engine's [`CatalogSource`](databack_core::CatalogSource) and
//! [`StatementExecutor`](databack_core::StatementExecutor) over a single
//! `sqlx` connection, reading table and constraint metadata from
//! `information_schema` and rows through `row_to_json`.
//!
//! # Usage
//!
//! ```rust,ignore
//! use databack_db::{ConnectionConfig, DbConnection};
//!
//! let config = ConnectionConfig::parse("postgres://localhost/shop", Some("app"), Some("pw"))?;
//! let mut conn = DbConnection::connect(&config)?;
//! let tables = conn.list_tables()?;
//! ```

mod catalog;
mod connection;
mod error;

pub use connection::{ConnectionConfig, DbConnection};
pub use error::BackendError;

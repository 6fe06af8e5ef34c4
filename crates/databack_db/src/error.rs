//! Error types for the PostgreSQL backend.

use databack_core::SourceError;
use thiserror::Error;

/// Backend errors.
#[derive(Error, Debug)]
pub enum BackendError {
    /// SQLx error (connection, query, etc.)
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Connection string could not be understood.
    #[error("Invalid connection URL: {0}")]
    InvalidUrl(String),

    /// The blocking runtime could not be started.
    #[error("Runtime error: {0}")]
    Runtime(#[from] std::io::Error),

    /// Catalog or row data had an unexpected shape.
    #[error("Unexpected data from {context}: {message}")]
    Decode { context: String, message: String },
}

impl BackendError {
    pub fn decode(context: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            context: context.into(),
            message: message.into(),
        }
    }

    /// True when the session itself is unusable, as opposed to one failed statement.
    pub fn is_connection_failure(&self) -> bool {
        match self {
            BackendError::InvalidUrl(_) | BackendError::Runtime(_) => true,
            BackendError::Decode { .. } => false,
            BackendError::Sqlx(err) => match err {
                sqlx::Error::Io(_)
                | sqlx::Error::Tls(_)
                | sqlx::Error::Protocol(_)
                | sqlx::Error::Configuration(_)
                | sqlx::Error::PoolTimedOut
                | sqlx::Error::PoolClosed
                | sqlx::Error::WorkerCrashed => true,
                // SQLSTATE class 08: connection exception; 57P01..03: server shutdown
                sqlx::Error::Database(db) => db
                    .code()
                    .map(|code| code.starts_with("08") || code.starts_with("57P"))
                    .unwrap_or(false),
                _ => false,
            },
        }
    }
}

impl From<BackendError> for SourceError {
    fn from(err: BackendError) -> Self {
        if err.is_connection_failure() {
            SourceError::Connection(err.to_string())
        } else {
            SourceError::Query(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_failures_are_connection_errors() {
        let err = BackendError::from(sqlx::Error::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "reset by peer",
        )));
        assert!(matches!(SourceError::from(err), SourceError::Connection(_)));
    }

    #[test]
    fn decode_failures_are_query_errors() {
        let err = BackendError::decode("row_to_json", "not an object");
        let source: SourceError = err.into();
        assert!(matches!(source, SourceError::Query(ref m) if m.contains("row_to_json")));
    }

    #[test]
    fn row_not_found_is_a_query_error() {
        let err = BackendError::from(sqlx::Error::RowNotFound);
        assert!(!err.is_connection_failure());
    }
}

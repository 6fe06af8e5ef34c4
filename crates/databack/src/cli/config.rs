//! Connection flags shared by `backup` and `restore`.

use crate::cli::error::HelpfulError;
use clap::Args;
use databack_core::DataBackError;
use databack_db::{ConnectionConfig, DbConnection};
use tracing::{info, warn};

#[derive(Args, Debug, Clone)]
pub struct DbArgs {
    /// PostgreSQL URL: postgres://, postgresql:// or jdbc:postgresql://
    #[arg(long, env = "DATABACK_DB_URL")]
    pub db_url: String,

    /// User name (overrides any user in the URL)
    #[arg(long, env = "DATABACK_USER")]
    pub user: Option<String>,

    /// Password (overrides any password in the URL)
    #[arg(long, env = "DATABACK_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,
}

impl DbArgs {
    pub fn connection_config(&self) -> Result<ConnectionConfig, HelpfulError> {
        ConnectionConfig::parse(&self.db_url, self.user.as_deref(), self.password.as_deref())
            .map_err(HelpfulError::invalid_db_url)
    }
}

/// Open a session, reporting failures as connectivity errors.
pub fn connect(args: &DbArgs) -> Result<DbConnection, HelpfulError> {
    let config = args.connection_config()?;
    info!(url = %config.redacted(), "Connecting");
    DbConnection::connect(&config).map_err(|e| {
        HelpfulError::from_engine(DataBackError::Connectivity(format!(
            "{}: {}",
            config.redacted(),
            e
        )))
    })
}

/// Close the session; a failure here only matters for the log.
pub fn disconnect(conn: DbConnection) {
    if let Err(err) = conn.close() {
        warn!(error = %err, "Failed to close database session");
    }
}

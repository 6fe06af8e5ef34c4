//! User-facing errors
//!
//! Every error printed by the CLI says what went wrong, what was being done,
//! and what to try next.

use databack_core::{DataBackError, ErrorKind};
use std::fmt;
use std::path::Path;

#[derive(Debug)]
pub struct HelpfulError {
    pub message: String,
    pub context: Option<String>,
    pub suggestions: Vec<String>,
}

impl HelpfulError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            context: None,
            suggestions: Vec::new(),
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    pub fn with_suggestions(mut self, suggestions: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.suggestions.extend(suggestions.into_iter().map(Into::into));
        self
    }

    /// Engine failure, prefixed with its kind so scripts can match on it.
    pub fn from_engine(err: DataBackError) -> Self {
        let kind = err.kind();
        let base = Self::new(format!("{}: {}", kind, err));
        match kind {
            ErrorKind::Connectivity => base.with_suggestions([
                "TRY: Check that the server is running and reachable from this host",
                "TRY: Verify --db-url, --user and --password",
            ]),
            ErrorKind::CatalogRead => base
                .with_context("Nothing was committed; the previous version is still the latest")
                .with_suggestion("TRY: Check that the user can SELECT from every table in the schema"),
            ErrorKind::ChainIntegrity => base
                .with_context("The destination database was not modified")
                .with_suggestions([
                    "TRY: Check that every file listed in metadata.json is present and readable",
                    "TRY: Restore an earlier version with --version",
                ]),
            ErrorKind::VersionNotFound => base.with_suggestion("TRY: List recorded versions: databack versions"),
            ErrorKind::Serialization => base
                .with_context("A backup file could not be parsed")
                .with_suggestion("TRY: Restore the file from a copy of the backup directory"),
            ErrorKind::Locked => base.with_suggestion(
                "TRY: Wait for the other backup or restore to finish, then retry",
            ),
            ErrorKind::Execution => base
                .with_context("The destination may be partially restored")
                .with_suggestion("TRY: Fix the reported statement error and run the restore again"),
            ErrorKind::Io => base.with_suggestion("TRY: Check permissions and free space on the backup directory"),
        }
    }

    pub fn invalid_db_url(details: impl fmt::Display) -> Self {
        Self::new(format!("Invalid database URL: {}", details))
            .with_context("While parsing --db-url")
            .with_suggestions([
                "TRY: postgres://host:5432/dbname",
                "TRY: jdbc:postgresql://host:5432/dbname?currentSchema=public",
            ])
    }

    pub fn no_backups(dir: &Path) -> Self {
        Self::new(format!(
            "{}: no backups recorded in {}",
            ErrorKind::VersionNotFound,
            dir.display()
        ))
        .with_suggestions([
            "TRY: Run a backup first: databack backup --db-url <url>".to_string(),
            "TRY: Point at an existing backup directory with --backup-dir".to_string(),
        ])
    }
}

impl fmt::Display for HelpfulError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ERROR: {}", self.message)?;

        if let Some(ctx) = &self.context {
            writeln!(f, "CONTEXT: {}", ctx)?;
        }

        if !self.suggestions.is_empty() {
            writeln!(f)?;
            for suggestion in &self.suggestions {
                writeln!(f, "  {}", suggestion)?;
            }
        }

        Ok(())
    }
}

impl std::error::Error for HelpfulError {}

impl From<DataBackError> for HelpfulError {
    fn from(err: DataBackError) -> Self {
        Self::from_engine(err)
    }
}

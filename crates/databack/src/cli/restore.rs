//! `databack restore`

use crate::cli::config::{self, DbArgs};
use crate::cli::error::HelpfulError;
use crate::cli::output::{count, format_duration_ms};
use anyhow::Result;
use databack_core::{try_lock_backup_dir, RestoreOrchestrator, Version, VersionIndex};
use std::path::PathBuf;
use tracing::info;

#[derive(Debug)]
pub struct RestoreArgs {
    pub backup_dir: PathBuf,
    pub db: DbArgs,
    pub version: Option<Version>,
}

pub fn run(args: RestoreArgs) -> Result<()> {
    args.db.connection_config()?;

    // Nothing to restore: report it without creating the directory or connecting.
    let preflight = VersionIndex::open(&args.backup_dir).map_err(HelpfulError::from)?;
    if preflight.latest_version().is_none() {
        return Err(HelpfulError::no_backups(&args.backup_dir).into());
    }
    preflight.resolve_version(args.version).map_err(HelpfulError::from)?;

    let _lock = try_lock_backup_dir(&args.backup_dir, "restore").map_err(HelpfulError::from)?;
    let index = VersionIndex::open(&args.backup_dir).map_err(HelpfulError::from)?;
    let target = index.resolve_version(args.version).map_err(HelpfulError::from)?;
    info!(backup_dir = %args.backup_dir.display(), version = %target, "Starting restore");

    let mut conn = config::connect(&args.db)?;
    let result = RestoreOrchestrator::new(&index, &mut conn, Some(target)).run();
    config::disconnect(conn);
    let report = result.map_err(HelpfulError::from)?;

    for (table, rows) in &report.rows {
        println!("  {:<32} {}", table, count(*rows, "row"));
    }
    println!(
        "Restored {}: dropped {}, created {}, inserted {} in {}",
        report.version,
        count(report.dropped.len(), "table"),
        count(report.created.len(), "table"),
        count(report.total_rows(), "row"),
        format_duration_ms(report.duration_ms)
    );
    Ok(())
}

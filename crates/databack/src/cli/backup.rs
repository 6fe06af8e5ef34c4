//! `databack backup`

use crate::cli::config::{self, DbArgs};
use crate::cli::error::HelpfulError;
use crate::cli::output::{count, format_duration_ms, print_table};
use anyhow::Result;
use databack_core::{try_lock_backup_dir, BackupOrchestrator, TableChange, VersionIndex};
use std::path::PathBuf;
use tracing::info;

#[derive(Debug)]
pub struct BackupArgs {
    pub backup_dir: PathBuf,
    pub db: DbArgs,
}

pub fn run(args: BackupArgs) -> Result<()> {
    // Fail on a bad URL before creating anything on disk.
    args.db.connection_config()?;

    let _lock = try_lock_backup_dir(&args.backup_dir, "backup").map_err(HelpfulError::from)?;
    let mut index = VersionIndex::open(&args.backup_dir).map_err(HelpfulError::from)?;
    info!(
        backup_dir = %args.backup_dir.display(),
        next = %index.next_version(),
        "Starting backup"
    );

    let mut conn = config::connect(&args.db)?;
    let result = BackupOrchestrator::new(&mut index, &mut conn).run();
    config::disconnect(conn);
    let report = result.map_err(HelpfulError::from)?;

    let rows = report
        .tables
        .iter()
        .map(|(table, change)| match change {
            TableChange::Base { rows } => vec![table.clone(), "base".to_string(), count(*rows, "row")],
            TableChange::Delta { added, deleted } => vec![
                table.clone(),
                "delta".to_string(),
                format!("+{} / -{}", added, deleted),
            ],
        })
        .collect::<Vec<_>>();
    if !rows.is_empty() {
        print_table(&["Table", "Stored", "Rows"], rows);
    }
    for table in &report.skipped {
        println!("Skipped {} (schema could not be read)", table);
    }
    for table in &report.vanished {
        println!("{} no longer exists; recorded as emptied", table);
    }
    println!(
        "Backed up {} as {} in {}",
        count(report.tables.len(), "table"),
        report.version,
        format_duration_ms(report.duration_ms)
    );
    Ok(())
}

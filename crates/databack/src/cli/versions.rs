//! `databack versions`

use crate::cli::error::HelpfulError;
use crate::cli::output::print_table;
use anyhow::Result;
use databack_core::{ArtifactKind, VersionIndex};
use serde::Serialize;
use std::path::PathBuf;

#[derive(Debug)]
pub struct VersionsArgs {
    pub backup_dir: PathBuf,
    pub json: bool,
}

#[derive(Debug, Serialize)]
struct VersionListing {
    backup_dir: String,
    latest: Option<String>,
    versions: Vec<VersionEntry>,
}

#[derive(Debug, Serialize)]
struct VersionEntry {
    version: String,
    schema: String,
    constraints: String,
    tables: Vec<String>,
}

fn listing(index: &VersionIndex) -> Result<VersionListing, HelpfulError> {
    let mut versions = Vec::new();
    for version in index.versions() {
        let schema = index.resolve(ArtifactKind::Schema, Some(version))?;
        let constraints = index.resolve(ArtifactKind::Constraints, Some(version))?;
        versions.push(VersionEntry {
            version: version.to_string(),
            schema: schema.display().to_string(),
            constraints: constraints.display().to_string(),
            tables: index.tables_at(version),
        });
    }
    Ok(VersionListing {
        backup_dir: index.root().display().to_string(),
        latest: index.latest_version().map(|v| v.to_string()),
        versions,
    })
}

pub fn run(args: VersionsArgs) -> Result<()> {
    let index = VersionIndex::open(&args.backup_dir).map_err(HelpfulError::from)?;
    let listing = listing(&index)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&listing)?);
        return Ok(());
    }

    if listing.versions.is_empty() {
        println!("No backups recorded in {}", listing.backup_dir);
        return Ok(());
    }

    let rows = listing
        .versions
        .into_iter()
        .map(|entry| {
            let schema = file_name(&entry.schema);
            let constraints = file_name(&entry.constraints);
            vec![entry.version, schema, constraints, entry.tables.join(", ")]
        })
        .collect();
    print_table(&["Version", "Schema", "Constraints", "Tables"], rows);
    Ok(())
}

fn file_name(path: &str) -> String {
    std::path::Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string())
}

//! DataBack command line
//!
//! - `backup`: record the current database as a new version
//! - `restore`: rebuild the database from a recorded version
//! - `versions`: list what the backup directory holds

use anyhow::Result;
use clap::{Parser, Subcommand};
use databack_core::Version;
use databack_logging::LogConfig;
use std::path::PathBuf;
use std::process::ExitCode;

mod cli;

#[derive(Parser, Debug)]
#[command(name = "databack", about = "Versioned incremental backups for PostgreSQL")]
struct Cli {
    /// Show progress logs on stderr
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    /// Directory holding the version index and backup artifacts
    #[arg(
        long,
        global = true,
        env = "DATABACK_BACKUP_DIR",
        default_value = "BackupData"
    )]
    backup_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Back up every table in the schema as the next version
    Backup {
        #[command(flatten)]
        db: cli::config::DbArgs,
    },

    /// Drop every table and rebuild the schema from a recorded version
    Restore {
        #[command(flatten)]
        db: cli::config::DbArgs,

        /// Version to restore, e.g. v3 (default: latest)
        #[arg(long, value_name = "v<N>", value_parser = parse_version)]
        version: Option<Version>,
    },

    /// List recorded versions (no database connection)
    Versions {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn parse_version(raw: &str) -> std::result::Result<Version, String> {
    raw.parse::<Version>().map_err(|e| e.to_string())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let _log_guard = match databack_logging::init_logging(LogConfig {
        app_name: "databack",
        verbose: cli.verbose,
    }) {
        Ok(guard) => Some(guard),
        Err(err) => {
            eprintln!("Warning: logging disabled: {:#}", err);
            None
        }
    };

    match run_command(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            match err.downcast_ref::<cli::error::HelpfulError>() {
                Some(helpful) => eprint!("{}", helpful),
                None => eprintln!("ERROR: {:#}", err),
            }
            ExitCode::from(1)
        }
    }
}

fn run_command(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Backup { db } => cli::backup::run(cli::backup::BackupArgs {
            backup_dir: cli.backup_dir,
            db,
        }),
        Commands::Restore { db, version } => cli::restore::run(cli::restore::RestoreArgs {
            backup_dir: cli.backup_dir,
            db,
            version,
        }),
        Commands::Versions { json } => cli::versions::run(cli::versions::VersionsArgs {
            backup_dir: cli.backup_dir,
            json,
        }),
    }
}

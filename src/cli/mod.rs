pub mod backup;
pub mod branch;
pub mod catalog;
pub mod completions;
pub mod demo;
pub mod init;
pub mod ledger;
pub mod status;
pub mod sync;

use clap::{Parser, Subcommand};
use rusqlite::Connection;

use crate::catalog::CatalogStore;
use crate::db::{init_db, open_with_timeout};
use crate::error::{Result, StockbookError};
use crate::ledger::LedgerStore;
use crate::settings::{load_settings, Settings};
use crate::sync::Synchronizer;

#[derive(Parser)]
#[command(name = "stockbook", version, about = "Rolling daily inventory ledger for multi-branch kitchens.")]
pub struct Cli {
    /// Log level: off, error, warn, info, debug, trace (overrides RUST_LOG)
    #[arg(long = "log-level", global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Choose a data directory and initialize the database.
    Init {
        /// Path for stockbook data (default: ~/Documents/stockbook)
        #[arg(long = "data-dir")]
        data_dir: Option<String>,
        /// Days of history kept in each ledger
        #[arg(long = "window-size")]
        window_size: Option<usize>,
        /// Where ledgers are stored: sqlite or csv
        #[arg(long)]
        backend: Option<String>,
    },
    /// Manage branches and their ledger sheets.
    Branch {
        #[command(subcommand)]
        command: BranchCommands,
    },
    /// Manage the item catalog.
    Catalog {
        #[command(subcommand)]
        command: CatalogCommands,
    },
    /// Apply a submission ({"branch": ..., "data": {...}}) to a branch ledger.
    Sync {
        /// JSON file with the submission, or - for stdin
        file: String,
        /// Treat this date as today: YYYY-MM-DD
        #[arg(long)]
        date: Option<String>,
    },
    /// Inspect branch ledgers.
    Ledger {
        #[command(subcommand)]
        command: LedgerCommands,
    },
    /// Show the most recent date with recorded quantities for a branch.
    LastSubmission {
        /// Branch name
        branch: String,
    },
    /// Load a sample catalog, branches and two weeks of history.
    Demo,
    /// Back up the database.
    Backup {
        /// Output path (default: <data_dir>/backups/stockbook-YYYYMMDD-HHMMSS.db)
        #[arg(long)]
        output: Option<String>,
    },
    /// Show current configuration and summary statistics.
    Status,
    /// Print shell completions.
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand)]
pub enum BranchCommands {
    /// Register a branch.
    Add {
        /// Branch name, e.g. 'Delhi'
        name: String,
        /// Ledger sheet name (default: the branch name)
        #[arg(long)]
        sheet: Option<String>,
    },
    /// List branches with their last submission date.
    List,
}

#[derive(Subcommand)]
pub enum CatalogCommands {
    /// List categories and items in ledger order.
    List,
    /// Add a category, or merge items into an existing one.
    Add {
        /// Category name
        category: String,
        /// Item as name:unit (repeatable)
        #[arg(long = "item")]
        items: Vec<String>,
    },
    /// Bulk add/merge categories from a CSV (category,item,unit) or JSON file.
    Import {
        file: String,
    },
    /// Delete a category and all of its items.
    Delete {
        category: String,
    },
    /// Delete specific items from a category.
    DeleteItems {
        category: String,
        #[arg(required = true)]
        items: Vec<String>,
    },
}

#[derive(Subcommand)]
pub enum LedgerCommands {
    /// Print a branch ledger as a table.
    Show {
        branch: String,
    },
    /// Export a branch ledger snapshot as CSV.
    Export {
        branch: String,
        /// Output path (default: stdout)
        #[arg(long)]
        output: Option<String>,
    },
}

/// Settings plus an open database, shared by every command that needs data.
pub(crate) struct Context {
    pub settings: Settings,
    pub conn: Connection,
}

impl Context {
    pub fn open() -> Result<Self> {
        let settings = load_settings();
        settings.validate()?;
        let db_path = settings.db_path();
        if !db_path.exists() {
            return Err(StockbookError::Other(
                "No database found. Run `stockbook init` first.".into(),
            ));
        }
        let conn = open_with_timeout(&db_path, settings.busy_timeout())?;
        init_db(&conn)?;
        Ok(Self { settings, conn })
    }

    pub fn ledger(&self) -> Result<LedgerStore<'_>> {
        Ok(LedgerStore::open(self.settings.backend()?, &self.conn, &self.settings.data_path()))
    }

    pub fn synchronizer(&self) -> Synchronizer {
        Synchronizer::new(CatalogStore::new(self.settings.catalog_ttl()), self.settings.window_size)
    }
}

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use log::{debug, info};

use crate::branches;
use crate::catalog::CatalogStore;
use crate::error::{Result, StockbookError};
use crate::ledger::LedgerStore;
use crate::models::{Submission, SubmissionEntry, SyncRequest, SyncSummary};
use crate::parser;
use crate::reconciler::{self, grid_digest};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOutcome {
    pub branch: String,
    pub sheet: String,
    pub date: NaiveDate,
    pub rows: usize,
    pub columns: usize,
    pub digest: String,
    pub summary: SyncSummary,
}

/// Checks the request shape and quantities without touching any store.
pub fn validate(request: SyncRequest) -> Result<(String, Submission)> {
    let branch = request
        .branch
        .map(|b| b.trim().to_string())
        .filter(|b| !b.is_empty())
        .ok_or_else(|| StockbookError::Validation("Missing branch".into()))?;
    let data = request
        .data
        .ok_or_else(|| StockbookError::Validation("Missing data".into()))?;

    let mut entries = Vec::with_capacity(data.len());
    for (item_name, raw) in data {
        let item_name = item_name.trim().to_string();
        if item_name.is_empty() {
            return Err(StockbookError::Validation("Item name cannot be empty".into()));
        }
        let quantity = raw.quantity.trim().to_string();
        if !quantity.is_empty() && !quantity.parse::<f64>().map_or(false, f64::is_finite) {
            return Err(StockbookError::Validation(format!(
                "Quantity for {item_name} is not a number: {quantity:?}"
            )));
        }
        entries.push(SubmissionEntry {
            item_name,
            quantity,
            category: raw.category.trim().to_string(),
        });
    }
    Ok((branch, Submission { entries }))
}

/// Registry of per-branch mutexes, keyed case-insensitively.
#[derive(Default)]
pub struct BranchLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl BranchLocks {
    pub fn for_branch(&self, branch: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks
            .entry(branch.trim().to_lowercase())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

pub struct Synchronizer {
    catalog: CatalogStore,
    locks: BranchLocks,
    window_size: usize,
}

impl Synchronizer {
    pub fn new(catalog: CatalogStore, window_size: usize) -> Self {
        Self {
            catalog,
            locks: BranchLocks::default(),
            window_size,
        }
    }

    pub fn catalog(&self) -> &CatalogStore {
        &self.catalog
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn sync(
        &self,
        conn: &rusqlite::Connection,
        ledger: &LedgerStore,
        request: SyncRequest,
        today: NaiveDate,
    ) -> Result<SyncOutcome> {
        let (branch_key, submission) = validate(request)?;
        let branch = branches::resolve(conn, &branch_key)?;
        info!(
            "event=sync_start branch={} sheet={} entries={}",
            branch.name,
            branch.sheet,
            submission.entries.len()
        );

        // In-process callers queue here; other processes queue on the sheet lock.
        let lock = self.locks.for_branch(&branch.name);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());
        let ledger_err = |e: StockbookError| StockbookError::LedgerUnavailable(e.to_string());
        let sheet_lock = ledger.lock(&branch.sheet).map_err(ledger_err)?;

        let catalog = self
            .catalog
            .snapshot(conn)
            .map_err(|e| StockbookError::CatalogUnavailable(e.to_string()))?;

        ledger.ensure(&branch.sheet).map_err(ledger_err)?;
        let sheet = ledger.read(&branch.sheet).map_err(ledger_err)?;
        let parsed = parser::parse(&sheet.header, &sheet.rows);
        debug!(
            "event=ledger_read sheet={} rows={} prior_dates={} dropped_columns={}",
            branch.sheet,
            sheet.rows.len(),
            parsed.prior().map_or(0, |p| p.date_columns.len()),
            parsed.prior().map_or(0, |p| p.dropped_columns)
        );

        let result = reconciler::reconcile(&catalog, &parsed, &submission, self.window_size, today);
        let grid = result.matrix.to_grid();
        ledger.write(&branch.sheet, &grid).map_err(ledger_err)?;
        sheet_lock.release().map_err(ledger_err)?;

        let outcome = SyncOutcome {
            branch: branch.name,
            sheet: branch.sheet,
            date: today,
            rows: result.matrix.rows.len(),
            columns: result.matrix.column_count(),
            digest: grid_digest(&grid),
            summary: result.summary,
        };
        info!(
            "event=sync_done branch={} new={} updated={} preserved={} unmatched={}",
            outcome.branch,
            outcome.summary.items_new,
            outcome.summary.items_updated,
            outcome.summary.items_preserved,
            outcome.summary.items_unmatched
        );
        Ok(outcome)
    }
}

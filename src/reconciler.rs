//! Merges the catalog, the prior persisted ledger and today's submission into
//! a fresh, canonical ledger matrix.
//!
//! # Invariants
//! - One row per catalog item, in catalog order; rows for retired items are
//!   dropped and rows for new items are synthesized blank.
//! - Prior values are remapped by date, never by column position. Dates older
//!   than the window are evicted.
//! - A non-blank submitted quantity overwrites today's cell (last write wins);
//!   items absent from the submission keep whatever survived the remap.

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use log::{debug, warn};
use sha2::{Digest, Sha256};

use crate::models::{
    CatalogItem, CatalogSnapshot, LedgerRow, RowKey, RowOrigin, Submission, SyncSummary,
};
use crate::parser::{ParsedLedger, FIXED_COLUMNS};
use crate::window;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerMatrix {
    /// Window dates, newest first.
    pub window: Vec<NaiveDate>,
    pub rows: Vec<LedgerRow>,
}

impl LedgerMatrix {
    /// Dates in display order (oldest first).
    pub fn display_dates(&self) -> impl Iterator<Item = &NaiveDate> {
        self.window.iter().rev()
    }

    pub fn header(&self) -> Vec<String> {
        FIXED_COLUMNS
            .iter()
            .map(|c| c.to_string())
            .chain(self.display_dates().map(|d| window::header_label(*d)))
            .collect()
    }

    /// Full persisted layout: header row, then one row per catalog item.
    pub fn to_grid(&self) -> Vec<Vec<String>> {
        let mut grid = Vec::with_capacity(self.rows.len() + 1);
        grid.push(self.header());
        for row in &self.rows {
            let mut cells = vec![row.category.clone(), row.item.clone(), row.unit.clone()];
            cells.extend(
                self.display_dates()
                    .map(|d| row.cells.get(d).cloned().unwrap_or_default()),
            );
            grid.push(cells);
        }
        grid
    }

    pub fn column_count(&self) -> usize {
        FIXED_COLUMNS.len() + self.window.len()
    }
}

/// SHA-256 (hex) of a grid; equal grids hash equal.
pub fn grid_digest(grid: &[Vec<String>]) -> String {
    let mut hasher = Sha256::new();
    for row in grid {
        for cell in row {
            hasher.update(cell.as_bytes());
            hasher.update([0x1f]);
        }
        hasher.update([0x1e]);
    }
    hex::encode(hasher.finalize())
}

#[derive(Debug, Clone)]
pub struct Reconciliation {
    pub matrix: LedgerMatrix,
    pub summary: SyncSummary,
}

/// Resolves submission entries onto catalog indices. Entries naming a category
/// match on (category, item); otherwise, or when that misses, the first catalog
/// item with the same name is used.
fn resolve_updates(
    items: &[CatalogItem],
    submission: &Submission,
) -> (Vec<Option<String>>, usize) {
    let mut by_key: HashMap<RowKey, usize> = HashMap::new();
    let mut by_name: HashMap<String, usize> = HashMap::new();
    for (idx, item) in items.iter().enumerate() {
        by_key.entry(RowKey::new(&item.category, &item.name)).or_insert(idx);
        by_name.entry(item.name.trim().to_lowercase()).or_insert(idx);
    }

    let mut updates = vec![None; items.len()];
    let mut unmatched = 0usize;
    for entry in &submission.entries {
        let quantity = entry.quantity.trim();
        if quantity.is_empty() {
            continue;
        }
        let keyed = if entry.category.trim().is_empty() {
            None
        } else {
            by_key.get(&RowKey::new(&entry.category, &entry.item_name)).copied()
        };
        let idx = keyed.or_else(|| by_name.get(&entry.item_name.trim().to_lowercase()).copied());
        match idx {
            Some(idx) => updates[idx] = Some(quantity.to_string()),
            None => {
                warn!(
                    "event=submission_unmatched item={:?} category={:?}",
                    entry.item_name, entry.category
                );
                unmatched += 1;
            }
        }
    }
    (updates, unmatched)
}

pub fn reconcile(
    catalog: &CatalogSnapshot,
    parsed: &ParsedLedger,
    submission: &Submission,
    window_size: usize,
    today: NaiveDate,
) -> Reconciliation {
    let window = window::plan(window_size, today);
    let items: Vec<CatalogItem> = catalog.items().collect();
    let (updates, items_unmatched) = resolve_updates(&items, submission);
    let prior = parsed.prior();

    let mut summary = SyncSummary {
        items_unmatched,
        ..SyncSummary::default()
    };
    let mut rows = Vec::with_capacity(items.len());

    for (item, update) in items.into_iter().zip(updates) {
        let key = RowKey::new(&item.category, &item.name);
        let mut cells = BTreeMap::new();

        let origin = match prior {
            Some(prior) if prior.contains_row(&key) => {
                for date in &window {
                    if let Some(value) = prior.value(&key, *date) {
                        cells.insert(*date, value.to_string());
                    }
                }
                RowOrigin::Carried
            }
            _ => RowOrigin::Synthesized,
        };

        let updated = match (update, window.first()) {
            (Some(quantity), Some(anchor)) => {
                cells.insert(*anchor, quantity);
                true
            }
            _ => false,
        };

        match origin {
            RowOrigin::Synthesized => summary.items_new += 1,
            RowOrigin::Carried if !updated => summary.items_preserved += 1,
            RowOrigin::Carried => {}
        }
        if updated {
            summary.items_updated += 1;
        }

        rows.push(LedgerRow {
            category: item.category,
            item: item.name,
            unit: item.unit,
            cells,
            origin,
        });
    }

    if let Some(prior) = prior {
        let retired = prior
            .row_count()
            .saturating_sub(rows.iter().filter(|r| r.origin == RowOrigin::Carried).count());
        if retired > 0 {
            debug!("event=rows_retired count={retired}");
        }
    }

    Reconciliation {
        matrix: LedgerMatrix { window, rows },
        summary,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CatalogCategory, ItemSpec, SubmissionEntry};
    use crate::parser::parse;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn catalog(spec: &[(&str, &[(&str, &str)])]) -> CatalogSnapshot {
        CatalogSnapshot {
            categories: spec
                .iter()
                .map(|(name, items)| CatalogCategory {
                    name: name.to_string(),
                    items: items
                        .iter()
                        .map(|(n, u)| ItemSpec { name: n.to_string(), unit: u.to_string() })
                        .collect(),
                })
                .collect(),
        }
    }

    fn submit(entries: &[(&str, &str, &str)]) -> Submission {
        Submission {
            entries: entries
                .iter()
                .map(|(item, qty, cat)| SubmissionEntry {
                    item_name: item.to_string(),
                    quantity: qty.to_string(),
                    category: cat.to_string(),
                })
                .collect(),
        }
    }

    fn reparse(grid: &[Vec<String>]) -> ParsedLedger {
        parse(&grid[0], &grid[1..])
    }

    fn row<'a>(grid: &'a [Vec<String>], item: &str) -> Option<&'a Vec<String>> {
        grid.iter().skip(1).find(|r| r[1] == item)
    }

    #[test]
    fn test_first_run_scenario() {
        let cat = catalog(&[("Dairy", &[("Milk", "ml")])]);
        let result = reconcile(
            &cat,
            &ParsedLedger::NoData,
            &submit(&[("Milk", "5", "Dairy")]),
            3,
            d("2024-01-03"),
        );
        let grid = result.matrix.to_grid();
        assert_eq!(
            grid[0],
            vec!["Category", "Item", "Unit", "2024-01-01 (Qty)", "2024-01-02 (Qty)", "2024-01-03 (Qty)"]
        );
        assert_eq!(grid[1], vec!["Dairy", "Milk", "ml", "", "", "5"]);
        assert_eq!(result.summary.items_new, 1);
        assert_eq!(result.summary.items_updated, 1);
    }

    #[test]
    fn test_next_day_without_submission_shifts_left() {
        let cat = catalog(&[("Dairy", &[("Milk", "ml")])]);
        let day1 = reconcile(&cat, &ParsedLedger::NoData, &submit(&[("Milk", "5", "Dairy")]), 3, d("2024-01-03"));
        let day2 = reconcile(&cat, &reparse(&day1.matrix.to_grid()), &Submission::default(), 3, d("2024-01-04"));
        let grid = day2.matrix.to_grid();
        assert_eq!(
            grid[0],
            vec!["Category", "Item", "Unit", "2024-01-02 (Qty)", "2024-01-03 (Qty)", "2024-01-04 (Qty)"]
        );
        assert_eq!(grid[1], vec!["Dairy", "Milk", "ml", "", "5", ""]);
        assert_eq!(day2.summary.items_preserved, 1);
        assert_eq!(day2.summary.items_new, 0);
    }

    #[test]
    fn test_idempotent_within_a_day() {
        let cat = catalog(&[("Dairy", &[("Milk", "ml"), ("Cream", "ml")])]);
        let sub = submit(&[("Milk", "5", "Dairy")]);
        let first = reconcile(&cat, &ParsedLedger::NoData, &sub, 3, d("2024-01-03"));
        let first_grid = first.matrix.to_grid();
        let second = reconcile(&cat, &reparse(&first_grid), &sub, 3, d("2024-01-03"));
        let second_grid = second.matrix.to_grid();
        assert_eq!(first_grid, second_grid);
        assert_eq!(grid_digest(&first_grid), grid_digest(&second_grid));
    }

    #[test]
    fn test_second_submission_same_day_wins() {
        let cat = catalog(&[("Dairy", &[("Milk", "ml")])]);
        let first = reconcile(&cat, &ParsedLedger::NoData, &submit(&[("Milk", "5", "Dairy")]), 3, d("2024-01-03"));
        let second = reconcile(
            &cat,
            &reparse(&first.matrix.to_grid()),
            &submit(&[("Milk", "7", "Dairy")]),
            3,
            d("2024-01-03"),
        );
        assert_eq!(second.matrix.to_grid()[1], vec!["Dairy", "Milk", "ml", "", "", "7"]);
    }

    #[test]
    fn test_no_cross_item_leakage() {
        let cat = catalog(&[("Dairy", &[("Milk", "ml"), ("Cream", "ml")])]);
        let day1 = reconcile(
            &cat,
            &ParsedLedger::NoData,
            &submit(&[("Milk", "5", "Dairy"), ("Cream", "2", "Dairy")]),
            3,
            d("2024-01-03"),
        );
        let day1_grid = day1.matrix.to_grid();
        let again = reconcile(&cat, &reparse(&day1_grid), &submit(&[("Milk", "9", "Dairy")]), 3, d("2024-01-03"));
        let grid = again.matrix.to_grid();
        assert_eq!(row(&grid, "Cream"), row(&day1_grid, "Cream"));
        assert_eq!(row(&grid, "Milk").unwrap()[5], "9");
    }

    #[test]
    fn test_blank_quantity_does_not_clear_today() {
        let cat = catalog(&[("Dairy", &[("Milk", "ml")])]);
        let first = reconcile(&cat, &ParsedLedger::NoData, &submit(&[("Milk", "5", "Dairy")]), 3, d("2024-01-03"));
        let second = reconcile(
            &cat,
            &reparse(&first.matrix.to_grid()),
            &submit(&[("Milk", "  ", "Dairy")]),
            3,
            d("2024-01-03"),
        );
        assert_eq!(second.matrix.to_grid()[1][5], "5");
        assert_eq!(second.summary.items_updated, 0);
    }

    #[test]
    fn test_window_eviction() {
        let cat = catalog(&[("Dairy", &[("Milk", "ml")])]);
        let header: Vec<String> = ["Category", "Item", "Unit"]
            .iter()
            .map(|s| s.to_string())
            .chain((0..6).rev().map(|i| window::header_label(d("2024-01-10") - chrono::Days::new(i))))
            .collect();
        let prior_row: Vec<String> = ["Dairy", "Milk", "ml", "1", "2", "3", "4", "5", "6"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let parsed = parse(&header, &[prior_row]);
        let result = reconcile(&cat, &parsed, &Submission::default(), 3, d("2024-01-11"));
        let grid = result.matrix.to_grid();
        assert_eq!(
            grid[0],
            vec!["Category", "Item", "Unit", "2024-01-09 (Qty)", "2024-01-10 (Qty)", "2024-01-11 (Qty)"]
        );
        assert!(!grid[0].iter().any(|h| h.starts_with("2024-01-05")));
        assert_eq!(grid[1], vec!["Dairy", "Milk", "ml", "5", "6", ""]);
    }

    #[test]
    fn test_catalog_deletion_drops_row() {
        let full = catalog(&[("Dairy", &[("Milk", "ml"), ("Cream", "ml")])]);
        let day1 = reconcile(
            &full,
            &ParsedLedger::NoData,
            &submit(&[("Milk", "5", "Dairy"), ("Cream", "2", "Dairy")]),
            3,
            d("2024-01-03"),
        );
        let trimmed = catalog(&[("Dairy", &[("Milk", "ml")])]);
        let day2 = reconcile(&trimmed, &reparse(&day1.matrix.to_grid()), &Submission::default(), 3, d("2024-01-04"));
        let grid = day2.matrix.to_grid();
        assert_eq!(grid.len(), 2);
        assert!(row(&grid, "Cream").is_none());
    }

    #[test]
    fn test_catalog_addition_synthesizes_blank_row() {
        let before = catalog(&[("Dairy", &[("Milk", "ml")])]);
        let day1 = reconcile(&before, &ParsedLedger::NoData, &submit(&[("Milk", "5", "Dairy")]), 3, d("2024-01-03"));
        let after = catalog(&[("Dairy", &[("Milk", "ml"), ("Cream", "ml")]), ("Bakery", &[("Bread", "pc")])]);
        let day2 = reconcile(
            &after,
            &reparse(&day1.matrix.to_grid()),
            &submit(&[("Bread", "3", "Bakery")]),
            3,
            d("2024-01-04"),
        );
        let grid = day2.matrix.to_grid();
        assert_eq!(row(&grid, "Cream").unwrap(), &vec!["Dairy", "Cream", "ml", "", "", ""]);
        assert_eq!(row(&grid, "Bread").unwrap(), &vec!["Bakery", "Bread", "pc", "", "", "3"]);
        assert_eq!(day2.summary.items_new, 2);
        assert_eq!(day2.summary.items_preserved, 1);
    }

    #[test]
    fn test_row_order_follows_catalog_not_prior() {
        let cat = catalog(&[("Bakery", &[("Bread", "pc")]), ("Dairy", &[("Milk", "ml")])]);
        let header: Vec<String> = ["Category", "Item", "Unit", "2024-01-03 (Qty)"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let rows = vec![
            vec!["Dairy".to_string(), "Milk".into(), "ml".into(), "1".into()],
            vec!["Bakery".to_string(), "Bread".into(), "pc".into(), "2".into()],
        ];
        let result = reconcile(&cat, &parse(&header, &rows), &Submission::default(), 2, d("2024-01-03"));
        let grid = result.matrix.to_grid();
        assert_eq!(grid[1][1], "Bread");
        assert_eq!(grid[2][1], "Milk");
        assert_eq!(grid[1][4], "2");
        assert_eq!(grid[2][4], "1");
    }

    #[test]
    fn test_unit_comes_from_catalog() {
        let cat = catalog(&[("Dairy", &[("Milk", "L")])]);
        let header: Vec<String> = ["Category", "Item", "Unit", "2024-01-03 (Qty)"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let rows = vec![vec!["Dairy".to_string(), "Milk".into(), "ml".into(), "1".into()]];
        let result = reconcile(&cat, &parse(&header, &rows), &Submission::default(), 1, d("2024-01-03"));
        assert_eq!(result.matrix.to_grid()[1], vec!["Dairy", "Milk", "L", "1"]);
    }

    #[test]
    fn test_unmatched_items_are_counted_and_ignored() {
        let cat = catalog(&[("Dairy", &[("Milk", "ml")])]);
        let result = reconcile(
            &cat,
            &ParsedLedger::NoData,
            &submit(&[("Caviar", "1", "Luxury")]),
            2,
            d("2024-01-03"),
        );
        assert_eq!(result.summary.items_unmatched, 1);
        assert_eq!(result.matrix.to_grid()[1], vec!["Dairy", "Milk", "ml", "", ""]);
    }

    #[test]
    fn test_category_disambiguates_same_item_name() {
        let cat = catalog(&[("Dairy", &[("Butter", "gm")]), ("Bakery", &[("Butter", "gm")])]);
        let result = reconcile(
            &cat,
            &ParsedLedger::NoData,
            &submit(&[("butter", "4", "BAKERY")]),
            1,
            d("2024-01-03"),
        );
        let grid = result.matrix.to_grid();
        assert_eq!(grid[1][3], "");
        assert_eq!(grid[2][3], "4");
    }

    #[test]
    fn test_stale_category_falls_back_to_item_name() {
        let cat = catalog(&[("Fridge", &[("Milk", "ml")])]);
        let result = reconcile(&cat, &ParsedLedger::NoData, &submit(&[("Milk", "2", "Dairy")]), 1, d("2024-01-03"));
        assert_eq!(result.matrix.to_grid()[1][3], "2");
        assert_eq!(result.summary.items_unmatched, 0);
    }

    #[test]
    fn test_zero_window_has_fixed_columns_only() {
        let cat = catalog(&[("Dairy", &[("Milk", "ml")])]);
        let result = reconcile(&cat, &ParsedLedger::NoData, &submit(&[("Milk", "5", "Dairy")]), 0, d("2024-01-03"));
        let grid = result.matrix.to_grid();
        assert_eq!(grid[0], vec!["Category", "Item", "Unit"]);
        assert_eq!(grid[1], vec!["Dairy", "Milk", "ml"]);
        assert_eq!(result.summary.items_updated, 0);
    }

    #[test]
    fn test_growing_window_keeps_surviving_dates() {
        let cat = catalog(&[("Dairy", &[("Milk", "ml")])]);
        let day1 = reconcile(&cat, &ParsedLedger::NoData, &submit(&[("Milk", "5", "Dairy")]), 3, d("2024-01-03"));
        let day2 = reconcile(&cat, &reparse(&day1.matrix.to_grid()), &Submission::default(), 7, d("2024-01-04"));
        let grid = day2.matrix.to_grid();
        assert_eq!(grid[0].len(), 3 + 7);
        assert_eq!(grid[0][8], "2024-01-03 (Qty)");
        assert_eq!(grid[1][8], "5");
        assert_eq!(day2.matrix.column_count(), 10);
    }
}

use std::path::Path;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use log::debug;
use rusqlite::{Connection, OptionalExtension};
use serde::Deserialize;

use crate::error::{Result, StockbookError};
use crate::models::{CatalogCategory, CatalogSnapshot, ItemSpec};

struct CachedSnapshot {
    loaded_at: Instant,
    snapshot: CatalogSnapshot,
}

pub struct CatalogStore {
    ttl: Duration,
    cache: Mutex<Option<CachedSnapshot>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    pub created: bool,
    pub items_added: usize,
    pub items_updated: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub categories_created: usize,
    pub categories_merged: usize,
    pub items_added: usize,
    pub items_updated: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteItemsOutcome {
    pub deleted: Vec<String>,
    pub missing: Vec<String>,
}

impl CatalogStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            cache: Mutex::new(None),
        }
    }

    /// Current catalog, served from cache while it is younger than the TTL.
    pub fn snapshot(&self, conn: &Connection) -> Result<CatalogSnapshot> {
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(cached) = cache.as_ref() {
            if cached.loaded_at.elapsed() < self.ttl {
                return Ok(cached.snapshot.clone());
            }
        }
        let snapshot = load_snapshot(conn)?;
        debug!(
            "event=catalog_loaded categories={} items={}",
            snapshot.categories.len(),
            snapshot.item_count()
        );
        *cache = Some(CachedSnapshot {
            loaded_at: Instant::now(),
            snapshot: snapshot.clone(),
        });
        Ok(snapshot)
    }

    pub fn invalidate(&self) {
        *self.cache.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }

    /// Creates `name` with `items`, or merges `items` into the existing
    /// category. Existing items keep their position and take the new unit.
    pub fn add_category(
        &self,
        conn: &Connection,
        name: &str,
        items: &[ItemSpec],
    ) -> Result<MergeOutcome> {
        let tx = conn.unchecked_transaction()?;
        let outcome = merge_category(&tx, name, items)?;
        tx.commit()?;
        self.invalidate();
        Ok(outcome)
    }

    /// Bulk add/merge. All categories land, or none do.
    pub fn import(&self, conn: &Connection, categories: &[CatalogCategory]) -> Result<ImportSummary> {
        let tx = conn.unchecked_transaction()?;
        let mut summary = ImportSummary::default();
        for category in categories {
            let outcome = merge_category(&tx, &category.name, &category.items)?;
            if outcome.created {
                summary.categories_created += 1;
            } else {
                summary.categories_merged += 1;
            }
            summary.items_added += outcome.items_added;
            summary.items_updated += outcome.items_updated;
        }
        tx.commit()?;
        self.invalidate();
        Ok(summary)
    }

    pub fn delete_category(&self, conn: &Connection, name: &str) -> Result<()> {
        let deleted = conn.execute("DELETE FROM categories WHERE name = ?1", [name.trim()])?;
        self.invalidate();
        if deleted == 0 {
            return Err(StockbookError::UnknownCategory(name.to_string()));
        }
        Ok(())
    }

    pub fn delete_items(
        &self,
        conn: &Connection,
        category: &str,
        names: &[String],
    ) -> Result<DeleteItemsOutcome> {
        let category_id = find_category_id(conn, category)?
            .ok_or_else(|| StockbookError::UnknownCategory(category.to_string()))?;
        let tx = conn.unchecked_transaction()?;
        let mut outcome = DeleteItemsOutcome::default();
        for name in names {
            let removed = tx.execute(
                "DELETE FROM items WHERE category_id = ?1 AND name = ?2",
                rusqlite::params![category_id, name.trim()],
            )?;
            if removed > 0 {
                outcome.deleted.push(name.clone());
            } else {
                outcome.missing.push(name.clone());
            }
        }
        tx.commit()?;
        self.invalidate();
        Ok(outcome)
    }
}

pub fn load_snapshot(conn: &Connection) -> Result<CatalogSnapshot> {
    let mut stmt = conn.prepare(
        "SELECT c.name, i.name, i.unit FROM categories c \
         LEFT JOIN items i ON i.category_id = c.id \
         ORDER BY c.position, c.id, i.position, i.id",
    )?;
    let rows: Vec<(String, Option<String>, Option<String>)> = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut categories: Vec<CatalogCategory> = Vec::new();
    for (category, item, unit) in rows {
        if categories.last().map(|c| c.name != category).unwrap_or(true) {
            categories.push(CatalogCategory {
                name: category,
                items: Vec::new(),
            });
        }
        if let (Some(name), Some(current)) = (item, categories.last_mut()) {
            current.items.push(ItemSpec {
                name,
                unit: unit.unwrap_or_default(),
            });
        }
    }
    Ok(CatalogSnapshot { categories })
}

fn find_category_id(conn: &Connection, name: &str) -> Result<Option<i64>> {
    Ok(conn
        .query_row("SELECT id FROM categories WHERE name = ?1", [name.trim()], |r| r.get(0))
        .optional()?)
}

fn merge_category(conn: &Connection, name: &str, items: &[ItemSpec]) -> Result<MergeOutcome> {
    let name = name.trim();
    if name.is_empty() {
        return Err(StockbookError::Validation("Category name is required".into()));
    }
    if let Some(bad) = items.iter().find(|i| i.name.trim().is_empty()) {
        return Err(StockbookError::Validation(format!(
            "Item name is required in category {name} (unit {:?})",
            bad.unit
        )));
    }

    let mut outcome = MergeOutcome::default();
    let category_id = match find_category_id(conn, name)? {
        Some(id) => id,
        None => {
            conn.execute(
                "INSERT INTO categories (name, position) \
                 VALUES (?1, (SELECT COALESCE(MAX(position), -1) + 1 FROM categories))",
                [name],
            )?;
            outcome.created = true;
            conn.last_insert_rowid()
        }
    };

    for item in items {
        let item_name = item.name.trim();
        let unit = item.unit.trim();
        let existing: Option<(i64, String)> = conn
            .query_row(
                "SELECT id, unit FROM items WHERE category_id = ?1 AND name = ?2",
                rusqlite::params![category_id, item_name],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .optional()?;
        match existing {
            Some((id, current_unit)) => {
                if current_unit != unit {
                    conn.execute("UPDATE items SET unit = ?1 WHERE id = ?2", rusqlite::params![unit, id])?;
                    outcome.items_updated += 1;
                }
            }
            None => {
                conn.execute(
                    "INSERT INTO items (category_id, name, unit, position) \
                     VALUES (?1, ?2, ?3, (SELECT COALESCE(MAX(position), -1) + 1 FROM items WHERE category_id = ?1))",
                    rusqlite::params![category_id, item_name, unit],
                )?;
                outcome.items_added += 1;
            }
        }
    }
    Ok(outcome)
}

#[derive(Debug, Deserialize)]
struct ImportRow {
    category: String,
    item: String,
    #[serde(default)]
    unit: String,
}

/// Reads a bulk catalog file: `.json` holds `[{"name", "items": [{"name", "unit"}]}]`,
/// anything else is CSV with a `category,item,unit` header.
pub fn read_import_file(path: &Path) -> Result<Vec<CatalogCategory>> {
    let is_json = path
        .extension()
        .map_or(false, |e| e.eq_ignore_ascii_case("json"));
    if is_json {
        let content = std::fs::read_to_string(path)?;
        return Ok(serde_json::from_str(&content)?);
    }

    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)?;
    let mut categories: Vec<CatalogCategory> = Vec::new();
    for result in rdr.deserialize() {
        let row: ImportRow = result?;
        let idx = match categories
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(&row.category))
        {
            Some(idx) => idx,
            None => {
                categories.push(CatalogCategory {
                    name: row.category.clone(),
                    items: Vec::new(),
                });
                categories.len() - 1
            }
        };
        categories[idx].items.push(ItemSpec {
            name: row.item,
            unit: row.unit,
        });
    }
    Ok(categories)
}

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use fs2::FileExt;
use rusqlite::{Connection, OptionalExtension, Transaction, TransactionBehavior};

use crate::error::{Result, StockbookError};
use crate::parser::header_date;

/// Raw sheet contents: the first row, and every row after it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SheetData {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl SheetData {
    pub fn from_grid(mut grid: Vec<Vec<String>>) -> Self {
        if grid.is_empty() {
            return Self::default();
        }
        let header = grid.remove(0);
        Self { header, rows: grid }
    }

    pub fn is_empty(&self) -> bool {
        self.header.is_empty() && self.rows.is_empty()
    }

    /// Newest date column holding at least one non-blank quantity.
    pub fn last_recorded_date(&self) -> Option<NaiveDate> {
        self.header
            .iter()
            .enumerate()
            .filter_map(|(offset, cell)| header_date(cell).map(|d| (d, offset)))
            .filter(|(_, offset)| {
                self.rows
                    .iter()
                    .any(|row| row.get(*offset).map_or(false, |v| !v.trim().is_empty()))
            })
            .map(|(d, _)| d)
            .max()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Sqlite,
    Csv,
}

impl BackendKind {
    pub fn key(&self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::Csv => "csv",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        match key.trim().to_ascii_lowercase().as_str() {
            "sqlite" => Some(Self::Sqlite),
            "csv" => Some(Self::Csv),
            _ => None,
        }
    }
}

pub enum LedgerStore<'a> {
    Sqlite(&'a Connection),
    CsvDir(PathBuf),
}

/// Sheet names become file names in the CSV backend, so they are restricted.
pub fn validate_sheet_name(sheet: &str) -> Result<()> {
    let trimmed = sheet.trim();
    if trimmed.is_empty() {
        return Err(StockbookError::Validation("Sheet name is required".into()));
    }
    if trimmed.starts_with('.') || trimmed.contains(['/', '\\', ':', '\0']) {
        return Err(StockbookError::Validation(format!("Invalid sheet name: {sheet}")));
    }
    Ok(())
}

/// Exclusive hold on one sheet across read and write, shared with other
/// processes. SQLite holds an IMMEDIATE transaction on the ledger connection;
/// the CSV backend holds an `flock` on `<sheet>.lock`. Dropping the lock
/// without `release` rolls back any uncommitted SQLite writes.
pub enum SheetLock<'a> {
    Sqlite(Transaction<'a>),
    Csv(File),
}

impl SheetLock<'_> {
    pub fn release(self) -> Result<()> {
        match self {
            Self::Sqlite(tx) => tx.commit()?,
            Self::Csv(file) => FileExt::unlock(&file)?,
        }
        Ok(())
    }
}

impl<'a> LedgerStore<'a> {
    pub fn open(kind: BackendKind, conn: &'a Connection, data_dir: &Path) -> Self {
        match kind {
            BackendKind::Sqlite => Self::Sqlite(conn),
            BackendKind::Csv => Self::CsvDir(data_dir.join("sheets")),
        }
    }

    /// Blocks until no other writer holds `sheet`. SQLite waits up to the
    /// connection's busy timeout.
    pub fn lock(&self, sheet: &str) -> Result<SheetLock<'a>> {
        validate_sheet_name(sheet)?;
        match self {
            Self::Sqlite(conn) => Ok(SheetLock::Sqlite(Transaction::new_unchecked(
                *conn,
                TransactionBehavior::Immediate,
            )?)),
            Self::CsvDir(dir) => {
                std::fs::create_dir_all(dir)?;
                let file = OpenOptions::new()
                    .create(true)
                    .read(true)
                    .write(true)
                    .open(dir.join(format!("{}.lock", sheet.trim())))?;
                FileExt::lock_exclusive(&file)?;
                Ok(SheetLock::Csv(file))
            }
        }
    }

    /// Creates the sheet if absent. Returns true when it was created.
    pub fn ensure(&self, sheet: &str) -> Result<bool> {
        validate_sheet_name(sheet)?;
        match self {
            Self::Sqlite(conn) => {
                let created = conn.execute("INSERT OR IGNORE INTO sheets (name) VALUES (?1)", [sheet])?;
                Ok(created > 0)
            }
            Self::CsvDir(dir) => {
                let path = csv_path(dir, sheet);
                if path.exists() {
                    return Ok(false);
                }
                std::fs::create_dir_all(dir)?;
                std::fs::write(&path, "")?;
                Ok(true)
            }
        }
    }

    pub fn read(&self, sheet: &str) -> Result<SheetData> {
        validate_sheet_name(sheet)?;
        match self {
            Self::Sqlite(conn) => read_sqlite(conn, sheet),
            Self::CsvDir(dir) => read_csv(&csv_path(dir, sheet)),
        }
    }

    /// Replaces the full contents of `sheet` with `grid`.
    pub fn write(&self, sheet: &str, grid: &[Vec<String>]) -> Result<()> {
        validate_sheet_name(sheet)?;
        match self {
            Self::Sqlite(conn) => write_sqlite(conn, sheet, grid),
            Self::CsvDir(dir) => write_csv(dir, sheet, grid),
        }
    }

    pub fn list_sheets(&self) -> Result<Vec<String>> {
        match self {
            Self::Sqlite(conn) => {
                let mut stmt = conn.prepare("SELECT name FROM sheets ORDER BY name")?;
                let names = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<std::result::Result<Vec<String>, _>>()?;
                Ok(names)
            }
            Self::CsvDir(dir) => {
                if !dir.exists() {
                    return Ok(Vec::new());
                }
                let mut names = Vec::new();
                for entry in std::fs::read_dir(dir)? {
                    let path = entry?.path();
                    if path.extension().map_or(false, |e| e == "csv") {
                        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                            names.push(stem.to_string());
                        }
                    }
                }
                names.sort();
                Ok(names)
            }
        }
    }
}

fn sheet_id(conn: &Connection, sheet: &str) -> Result<Option<i64>> {
    Ok(conn
        .query_row("SELECT id FROM sheets WHERE name = ?1", [sheet], |r| r.get(0))
        .optional()?)
}

fn read_sqlite(conn: &Connection, sheet: &str) -> Result<SheetData> {
    let Some(id) = sheet_id(conn, sheet)? else {
        return Ok(SheetData::default());
    };
    let mut stmt = conn.prepare(
        "SELECT row_idx, col_idx, value FROM sheet_cells WHERE sheet_id = ?1 ORDER BY row_idx, col_idx",
    )?;
    let cells: Vec<(usize, usize, String)> = stmt
        .query_map([id], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let Some(last_row) = cells.iter().map(|c| c.0).max() else {
        return Ok(SheetData::default());
    };
    let width = cells.iter().map(|c| c.1).max().map_or(0, |m| m + 1);
    let mut grid = vec![vec![String::new(); width]; last_row + 1];
    for (row, col, value) in cells {
        grid[row][col] = value;
    }
    Ok(SheetData::from_grid(grid))
}

fn write_sqlite(conn: &Connection, sheet: &str, grid: &[Vec<String>]) -> Result<()> {
    // Under a SheetLock the enclosing transaction already makes this atomic.
    if !conn.is_autocommit() {
        return write_cells(conn, sheet, grid);
    }
    let tx = conn.unchecked_transaction()?;
    write_cells(&tx, sheet, grid)?;
    tx.commit()?;
    Ok(())
}

fn write_cells(conn: &Connection, sheet: &str, grid: &[Vec<String>]) -> Result<()> {
    conn.execute("INSERT OR IGNORE INTO sheets (name) VALUES (?1)", [sheet])?;
    let id = sheet_id(conn, sheet)?
        .ok_or_else(|| StockbookError::LedgerUnavailable(format!("sheet vanished: {sheet}")))?;
    conn.execute("DELETE FROM sheet_cells WHERE sheet_id = ?1", [id])?;
    {
        let mut insert = conn.prepare_cached(
            "INSERT INTO sheet_cells (sheet_id, row_idx, col_idx, value) VALUES (?1, ?2, ?3, ?4)",
        )?;
        for (r, row) in grid.iter().enumerate() {
            for (c, value) in row.iter().enumerate() {
                // Blank cells are implicit, except the corners that fix the grid's shape.
                let is_corner = c == 0 || (r == 0 && c + 1 == row.len());
                if value.is_empty() && !is_corner {
                    continue;
                }
                insert.execute(rusqlite::params![id, r as i64, c as i64, value])?;
            }
        }
    }
    conn.execute("UPDATE sheets SET updated_at = datetime('now') WHERE id = ?1", [id])?;
    Ok(())
}

fn csv_path(dir: &Path, sheet: &str) -> PathBuf {
    dir.join(format!("{}.csv", sheet.trim()))
}

fn read_csv(path: &Path) -> Result<SheetData> {
    if !path.exists() {
        return Ok(SheetData::default());
    }
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)?;
    let mut grid = Vec::new();
    for record in rdr.records() {
        grid.push(record?.iter().map(str::to_string).collect());
    }
    Ok(SheetData::from_grid(grid))
}

fn write_csv(dir: &Path, sheet: &str, grid: &[Vec<String>]) -> Result<()> {
    std::fs::create_dir_all(dir)?;
    let target = csv_path(dir, sheet);
    let staging = dir.join(format!(".{}.csv.tmp", sheet.trim()));
    {
        let mut wtr = csv::WriterBuilder::new().flexible(true).from_path(&staging)?;
        for row in grid {
            wtr.write_record(row)?;
        }
        wtr.flush()?;
    }
    std::fs::rename(&staging, &target)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_db;

    fn grid(rows: &[&[&str]]) -> Vec<Vec<String>> {
        rows.iter()
            .map(|r| r.iter().map(|c| c.to_string()).collect())
            .collect()
    }

    fn sample() -> Vec<Vec<String>> {
        grid(&[
            &["Category", "Item", "Unit", "2024-01-02 (Qty)", "2024-01-03 (Qty)"],
            &["Dairy", "Milk", "ml", "", "5"],
            &["Dairy", "Cream", "ml", "", ""],
        ])
    }

    fn check_roundtrip(store: &LedgerStore) {
        assert!(store.ensure("Delhi").unwrap());
        assert!(!store.ensure("Delhi").unwrap());
        assert!(store.read("Delhi").unwrap().is_empty());

        store.write("Delhi", &sample()).unwrap();
        let data = store.read("Delhi").unwrap();
        assert_eq!(data.header, sample()[0]);
        assert_eq!(data.rows, sample()[1..].to_vec());

        // Shrinking overwrite leaves nothing behind.
        let smaller = grid(&[&["Category", "Item", "Unit"], &["Dairy", "Milk", "ml"]]);
        store.write("Delhi", &smaller).unwrap();
        let data = store.read("Delhi").unwrap();
        assert_eq!(data.header, smaller[0]);
        assert_eq!(data.rows, smaller[1..].to_vec());

        assert_eq!(store.list_sheets().unwrap(), vec!["Delhi"]);
    }

    #[test]
    fn test_sqlite_roundtrip_and_overwrite() {
        let (_dir, conn) = test_db();
        check_roundtrip(&LedgerStore::Sqlite(&conn));
    }

    #[test]
    fn test_csv_roundtrip_and_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        check_roundtrip(&LedgerStore::CsvDir(dir.path().join("sheets")));
        assert!(!dir.path().join("sheets").join(".Delhi.csv.tmp").exists());
    }

    #[test]
    fn test_read_missing_sheet_is_empty() {
        let (dir, conn) = test_db();
        assert!(LedgerStore::Sqlite(&conn).read("Nowhere").unwrap().is_empty());
        assert!(LedgerStore::CsvDir(dir.path().join("sheets")).read("Nowhere").unwrap().is_empty());
    }

    #[test]
    fn test_sqlite_lock_commits_on_release_and_rolls_back_on_drop() {
        let (_dir, conn) = test_db();
        let store = LedgerStore::Sqlite(&conn);

        let lock = store.lock("Delhi").unwrap();
        store.write("Delhi", &sample()).unwrap();
        drop(lock);
        assert!(store.read("Delhi").unwrap().is_empty());
        assert!(conn.is_autocommit());

        let lock = store.lock("Delhi").unwrap();
        store.ensure("Delhi").unwrap();
        store.write("Delhi", &sample()).unwrap();
        lock.release().unwrap();
        assert_eq!(store.read("Delhi").unwrap().rows, sample()[1..].to_vec());
    }

    #[test]
    fn test_sqlite_lock_excludes_other_connections() {
        let (dir, conn) = test_db();
        let other = crate::db::open_with_timeout(
            &dir.path().join(crate::db::DB_FILE),
            std::time::Duration::from_millis(50),
        )
        .unwrap();
        let lock = LedgerStore::Sqlite(&conn).lock("Delhi").unwrap();
        assert!(LedgerStore::Sqlite(&other).lock("Delhi").is_err());
        lock.release().unwrap();
        LedgerStore::Sqlite(&other).lock("Delhi").unwrap().release().unwrap();
    }

    #[test]
    fn test_csv_lock_is_exclusive_until_released() {
        let dir = tempfile::tempdir().unwrap();
        let sheets = dir.path().join("sheets");
        let store = LedgerStore::CsvDir(sheets.clone());
        let lock = store.lock("Delhi").unwrap();

        let contender = File::open(sheets.join("Delhi.lock")).unwrap();
        assert!(FileExt::try_lock_exclusive(&contender).is_err());
        lock.release().unwrap();
        FileExt::try_lock_exclusive(&contender).unwrap();

        // Lock files are not sheets.
        assert!(store.list_sheets().unwrap().is_empty());
    }

    #[test]
    fn test_sheet_name_validation() {
        assert!(validate_sheet_name("Chandigarh").is_ok());
        assert!(validate_sheet_name("Delhi North").is_ok());
        assert!(validate_sheet_name("").is_err());
        assert!(validate_sheet_name("../etc").is_err());
        assert!(validate_sheet_name("a/b").is_err());
    }

    #[test]
    fn test_last_recorded_date() {
        let data = SheetData::from_grid(grid(&[
            &["Category", "Item", "Unit", "2024-01-01 (Qty)", "2024-01-02 (Qty)", "2024-01-03 (Qty)"],
            &["Dairy", "Milk", "ml", "1", "2", ""],
            &["Dairy", "Cream", "ml", "", " ", ""],
        ]));
        assert_eq!(data.last_recorded_date(), NaiveDate::from_ymd_opt(2024, 1, 2));
        assert_eq!(SheetData::default().last_recorded_date(), None);
    }

    #[test]
    fn test_backend_kind_keys() {
        assert_eq!(BackendKind::from_key("SQLite"), Some(BackendKind::Sqlite));
        assert_eq!(BackendKind::from_key("csv"), Some(BackendKind::Csv));
        assert_eq!(BackendKind::from_key("sheets"), None);
        assert_eq!(BackendKind::Csv.key(), "csv");
    }
}

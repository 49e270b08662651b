use rusqlite::{Connection, OptionalExtension};

use crate::error::{Result, StockbookError};
use crate::ledger::validate_sheet_name;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Branch {
    pub id: i64,
    pub name: String,
    pub sheet: String,
}

/// Registers a branch. The sheet defaults to the branch name.
pub fn add(conn: &Connection, name: &str, sheet: Option<&str>) -> Result<Branch> {
    let name = name.trim();
    if name.is_empty() {
        return Err(StockbookError::Validation("Branch name is required".into()));
    }
    let sheet = sheet.map(str::trim).unwrap_or(name);
    validate_sheet_name(sheet)?;

    if lookup(conn, name)?.is_some() {
        return Err(StockbookError::Validation(format!("Branch already exists: {name}")));
    }
    let taken: Option<String> = conn
        .query_row("SELECT name FROM branches WHERE sheet_name = ?1", [sheet], |r| r.get(0))
        .optional()?;
    if let Some(owner) = taken {
        return Err(StockbookError::Validation(format!(
            "Sheet {sheet} already belongs to branch {owner}"
        )));
    }

    conn.execute(
        "INSERT INTO branches (name, sheet_name) VALUES (?1, ?2)",
        rusqlite::params![name, sheet],
    )?;
    Ok(Branch {
        id: conn.last_insert_rowid(),
        name: name.to_string(),
        sheet: sheet.to_string(),
    })
}

pub fn list(conn: &Connection) -> Result<Vec<Branch>> {
    let mut stmt = conn.prepare("SELECT id, name, sheet_name FROM branches ORDER BY name")?;
    let rows = stmt
        .query_map([], |row| {
            Ok(Branch {
                id: row.get(0)?,
                name: row.get(1)?,
                sheet: row.get(2)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn lookup(conn: &Connection, name: &str) -> Result<Option<Branch>> {
    Ok(conn
        .query_row(
            "SELECT id, name, sheet_name FROM branches WHERE name = ?1",
            [name.trim()],
            |row| {
                Ok(Branch {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    sheet: row.get(2)?,
                })
            },
        )
        .optional()?)
}

/// Like [`lookup`], but an unregistered branch is an error.
pub fn resolve(conn: &Connection, name: &str) -> Result<Branch> {
    lookup(conn, name)?.ok_or_else(|| StockbookError::UnknownBranch(name.trim().to_string()))
}

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use log::{debug, warn};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::RowKey;

/// Fixed leading columns of every ledger sheet.
pub const FIXED_COLUMNS: [&str; 3] = ["Category", "Item", "Unit"];

static DATE_PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d{4}-\d{2}-\d{2})").unwrap());

#[derive(Debug, Clone, Default)]
pub struct PriorLedger {
    /// Date-bearing columns in header order, with their source column offset.
    pub date_columns: Vec<(NaiveDate, usize)>,
    offsets: BTreeMap<NaiveDate, usize>,
    rows: HashMap<RowKey, Vec<String>>,
    pub dropped_columns: usize,
}

impl PriorLedger {
    pub fn contains_row(&self, key: &RowKey) -> bool {
        self.rows.contains_key(key)
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// The stored value at `date` for `key`, if both exist and the cell is non-blank.
    pub fn value(&self, key: &RowKey, date: NaiveDate) -> Option<&str> {
        let offset = *self.offsets.get(&date)?;
        let raw = self.rows.get(key)?.get(offset)?;
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed)
        }
    }
}

#[derive(Debug, Clone)]
pub enum ParsedLedger {
    /// Empty sheet, or a sheet with only a header row.
    NoData,
    Populated(PriorLedger),
}

impl ParsedLedger {
    pub fn prior(&self) -> Option<&PriorLedger> {
        match self {
            Self::NoData => None,
            Self::Populated(prior) => Some(prior),
        }
    }
}

/// Extracts the calendar date a header cell starts with, if any.
pub fn header_date(cell: &str) -> Option<NaiveDate> {
    let caps = DATE_PREFIX.captures(cell.trim())?;
    NaiveDate::parse_from_str(&caps[1], "%Y-%m-%d").ok()
}

pub fn parse(header: &[String], rows: &[Vec<String>]) -> ParsedLedger {
    if rows.is_empty() {
        return ParsedLedger::NoData;
    }

    let prefix_matches = header
        .iter()
        .zip(FIXED_COLUMNS.iter())
        .all(|(cell, expected)| cell.trim().eq_ignore_ascii_case(expected))
        && header.len() >= FIXED_COLUMNS.len();
    if !prefix_matches {
        warn!("event=header_drift header={:?}", header.iter().take(FIXED_COLUMNS.len()).collect::<Vec<_>>());
    }

    let mut prior = PriorLedger::default();
    for (offset, cell) in header.iter().enumerate().skip(FIXED_COLUMNS.len()) {
        match header_date(cell) {
            Some(date) if !prior.offsets.contains_key(&date) => {
                prior.offsets.insert(date, offset);
                prior.date_columns.push((date, offset));
            }
            Some(date) => {
                debug!("event=header_column_duplicate date={date} offset={offset}");
                prior.dropped_columns += 1;
            }
            None => {
                debug!("event=header_column_dropped cell={cell:?} offset={offset}");
                prior.dropped_columns += 1;
            }
        }
    }

    for row in rows {
        let category = row.first().map(String::as_str).unwrap_or("");
        let item = row.get(1).map(String::as_str).unwrap_or("");
        if category.trim().is_empty() && item.trim().is_empty() {
            continue;
        }
        let key = RowKey::new(category, item);
        if prior.rows.contains_key(&key) {
            warn!("event=duplicate_row category={category:?} item={item:?}");
            continue;
        }
        prior.rows.insert(key, row.clone());
    }

    ParsedLedger::Populated(prior)
}

use std::io::Read;

use colored::Colorize;

use crate::cli::Context;
use crate::error::{Result, StockbookError};
use crate::fmt::{self, parse_date};
use crate::models::SyncRequest;

fn read_request(file: &str) -> Result<SyncRequest> {
    let body = if file == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        std::fs::read_to_string(file)?
    };
    serde_json::from_str(&body)
        .map_err(|e| StockbookError::Validation(format!("Malformed submission: {e}")))
}

pub fn run(file: &str, date: Option<&str>) -> Result<()> {
    let today = match date {
        Some(value) => parse_date(value)
            .ok_or_else(|| StockbookError::Validation(format!("Invalid date {value:?}, expected YYYY-MM-DD")))?,
        None => fmt::today(),
    };
    let request = read_request(file)?;

    let ctx = Context::open()?;
    let ledger = ctx.ledger()?;
    let outcome = ctx.synchronizer().sync(&ctx.conn, &ledger, request, today)?;

    println!(
        "{} {} ({}) for {}",
        "Synced".green(),
        outcome.branch,
        outcome.sheet,
        outcome.date
    );
    println!("  Rows:       {} x {} columns", outcome.rows, outcome.columns);
    println!("  New:        {}", outcome.summary.items_new);
    println!("  Updated:    {}", outcome.summary.items_updated);
    println!("  Preserved:  {}", outcome.summary.items_preserved);
    if outcome.summary.items_unmatched > 0 {
        println!(
            "  {}  {}",
            "Unmatched:".yellow(),
            outcome.summary.items_unmatched
        );
    }
    println!("  Digest:     {}", &outcome.digest[..12]);
    Ok(())
}

use comfy_table::{Cell, Table};

use crate::branches;
use crate::cli::Context;
use crate::error::Result;

pub fn add(name: &str, sheet: Option<&str>) -> Result<()> {
    let ctx = Context::open()?;
    let branch = branches::add(&ctx.conn, name, sheet)?;
    println!("Added branch: {} (sheet: {})", branch.name, branch.sheet);
    Ok(())
}

pub fn list() -> Result<()> {
    let ctx = Context::open()?;
    let ledger = ctx.ledger()?;
    let rows = branches::list(&ctx.conn)?;
    if rows.is_empty() {
        println!("No branches yet. Add one with `stockbook branch add <name>`.");
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec!["ID", "Branch", "Sheet", "Last Submission"]);
    for branch in rows {
        let last = ledger
            .read(&branch.sheet)?
            .last_recorded_date()
            .map(|d| d.to_string())
            .unwrap_or_else(|| "-".to_string());
        table.add_row(vec![
            Cell::new(branch.id),
            Cell::new(branch.name),
            Cell::new(branch.sheet),
            Cell::new(last),
        ]);
    }
    println!("Branches\n{table}");
    Ok(())
}

pub fn last_submission(branch: &str) -> Result<()> {
    let ctx = Context::open()?;
    let branch = branches::resolve(&ctx.conn, branch)?;
    match ctx.ledger()?.read(&branch.sheet)?.last_recorded_date() {
        Some(date) => println!("{date}"),
        None => println!("No submissions recorded for {}", branch.name),
    }
    Ok(())
}

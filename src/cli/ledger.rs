use std::io::Write;

use comfy_table::{Cell, Table};

use crate::branches;
use crate::cli::Context;
use crate::error::Result;
use crate::ledger::SheetData;

fn load(branch: &str) -> Result<(String, SheetData)> {
    let ctx = Context::open()?;
    let branch = branches::resolve(&ctx.conn, branch)?;
    let data = ctx.ledger()?.read(&branch.sheet)?;
    Ok((branch.name, data))
}

pub fn show(branch: &str) -> Result<()> {
    let (name, data) = load(branch)?;
    if data.is_empty() {
        println!("Ledger for {name} is empty. Run `stockbook sync` to populate it.");
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(data.header.iter().map(Cell::new));
    for row in &data.rows {
        table.add_row(row.iter().map(Cell::new));
    }
    println!("Ledger: {name}\n{table}");
    Ok(())
}

/// Writes the ledger as CSV, header first, to `output` or stdout.
pub fn export(branch: &str, output: Option<&str>) -> Result<()> {
    let (name, data) = load(branch)?;
    let sink: Box<dyn Write> = match output {
        Some(path) => Box::new(std::fs::File::create(path)?),
        None => Box::new(std::io::stdout()),
    };
    let mut wtr = csv::WriterBuilder::new().flexible(true).from_writer(sink);
    if !data.header.is_empty() {
        wtr.write_record(&data.header)?;
    }
    for row in &data.rows {
        wtr.write_record(row)?;
    }
    wtr.flush()?;

    if let Some(path) = output {
        eprintln!("Exported {} rows for {name} to {path}", data.rows.len());
    }
    Ok(())
}

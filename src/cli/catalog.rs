use std::path::Path;

use colored::Colorize;
use comfy_table::{Cell, Table};

use crate::catalog::{read_import_file, CatalogStore};
use crate::cli::Context;
use crate::error::Result;
use crate::fmt::{plural, split_item_spec};
use crate::models::ItemSpec;

fn store(ctx: &Context) -> CatalogStore {
    CatalogStore::new(ctx.settings.catalog_ttl())
}

pub fn list() -> Result<()> {
    let ctx = Context::open()?;
    let snapshot = store(&ctx).snapshot(&ctx.conn)?;
    if snapshot.categories.is_empty() {
        println!("Catalog is empty. Add items with `stockbook catalog add <category> --item name:unit`.");
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec!["Category", "Item", "Unit"]);
    for category in &snapshot.categories {
        if category.items.is_empty() {
            table.add_row(vec![Cell::new(&category.name), Cell::new("(no items)"), Cell::new("")]);
        }
        for item in &category.items {
            table.add_row(vec![
                Cell::new(&category.name),
                Cell::new(&item.name),
                Cell::new(&item.unit),
            ]);
        }
    }
    println!(
        "Catalog ({}, {})\n{table}",
        plural(snapshot.categories.len(), "category"),
        plural(snapshot.item_count(), "item")
    );
    Ok(())
}

pub fn add(category: &str, items: &[String]) -> Result<()> {
    let ctx = Context::open()?;
    let specs: Vec<ItemSpec> = items
        .iter()
        .map(|spec| {
            let (name, unit) = split_item_spec(spec);
            ItemSpec { name, unit }
        })
        .collect();
    let outcome = store(&ctx).add_category(&ctx.conn, category, &specs)?;
    let verb = if outcome.created { "Created" } else { "Merged into" };
    println!(
        "{} {}: {} added, {} updated",
        verb.green(),
        category.trim(),
        plural(outcome.items_added, "item"),
        outcome.items_updated
    );
    Ok(())
}

pub fn import(file: &str) -> Result<()> {
    let ctx = Context::open()?;
    let categories = read_import_file(Path::new(file))?;
    let summary = store(&ctx).import(&ctx.conn, &categories)?;
    println!(
        "Imported {}: {} created, {} merged, {} added, {} updated",
        file,
        plural(summary.categories_created, "category"),
        summary.categories_merged,
        plural(summary.items_added, "item"),
        summary.items_updated
    );
    Ok(())
}

pub fn delete(category: &str) -> Result<()> {
    let ctx = Context::open()?;
    store(&ctx).delete_category(&ctx.conn, category)?;
    println!("Deleted category: {}", category.trim());
    Ok(())
}

pub fn delete_items(category: &str, items: &[String]) -> Result<()> {
    let ctx = Context::open()?;
    let outcome = store(&ctx).delete_items(&ctx.conn, category, items)?;
    if !outcome.deleted.is_empty() {
        println!("Deleted from {}: {}", category.trim(), outcome.deleted.join(", "));
    }
    if !outcome.missing.is_empty() {
        println!("{} {}", "Not found:".yellow(), outcome.missing.join(", "));
    }
    Ok(())
}

use std::collections::BTreeMap;

use chrono::{Days, NaiveDate};
use colored::Colorize;
use rand::Rng;

use crate::branches;
use crate::cli::Context;
use crate::error::Result;
use crate::fmt;
use crate::models::{CatalogCategory, ItemSpec, RawEntry, SyncRequest};

const BRANCHES: &[&str] = &["Delhi", "Chandigarh"];

/// (category, [(item, unit, typical daily quantity)])
const CATALOG: &[(&str, &[(&str, &str, u32)])] = &[
    ("Dairy", &[("Milk", "L", 40), ("Paneer", "kg", 12), ("Curd", "kg", 15)]),
    ("Produce", &[("Onion", "kg", 30), ("Tomato", "kg", 25), ("Coriander", "bunch", 20)]),
    ("Dry Goods", &[("Basmati Rice", "kg", 50), ("Atta", "kg", 35), ("Toor Dal", "kg", 18)]),
    ("Packaging", &[("Takeaway Box", "pcs", 200), ("Paper Bag", "pcs", 150)]),
];

fn demo_catalog() -> Vec<CatalogCategory> {
    CATALOG
        .iter()
        .map(|(category, items)| CatalogCategory {
            name: category.to_string(),
            items: items
                .iter()
                .map(|(name, unit, _)| ItemSpec {
                    name: name.to_string(),
                    unit: unit.to_string(),
                })
                .collect(),
        })
        .collect()
}

/// A day's counts for one branch. Some items go uncounted on some days.
fn demo_request(branch: &str, rng: &mut impl Rng) -> SyncRequest {
    let mut data = BTreeMap::new();
    for (category, items) in CATALOG {
        for (name, _, typical) in items.iter() {
            if rng.gen_bool(0.15) {
                continue;
            }
            let spread = (*typical / 3).max(1);
            let quantity = rng.gen_range(typical.saturating_sub(spread)..=typical + spread);
            data.insert(
                name.to_string(),
                RawEntry {
                    quantity: quantity.to_string(),
                    category: category.to_string(),
                },
            );
        }
    }
    SyncRequest {
        branch: Some(branch.to_string()),
        data: Some(data),
    }
}

pub fn run() -> Result<()> {
    let ctx = Context::open()?;

    // Idempotency guard
    if branches::lookup(&ctx.conn, BRANCHES[0])?.is_some() {
        println!("Demo data already loaded (branch '{}' exists).", BRANCHES[0]);
        return Ok(());
    }

    let sync = ctx.synchronizer();
    let summary = sync.catalog().import(&ctx.conn, &demo_catalog())?;
    for name in BRANCHES {
        branches::add(&ctx.conn, name, None)?;
    }

    let ledger = ctx.ledger()?;
    let today = fmt::today();
    let days = sync.window_size().min(14) as u64;
    let mut rng = rand::thread_rng();
    let mut passes = 0;
    for offset in (0..days).rev() {
        let Some(date) = today.checked_sub_days(Days::new(offset)) else {
            continue;
        };
        for name in BRANCHES {
            sync.sync(&ctx.conn, &ledger, demo_request(name, &mut rng), date)?;
            passes += 1;
        }
    }

    println!("{}", "Demo data loaded!".green());
    println!(
        "  {} categories, {} items, {} branches",
        summary.categories_created,
        summary.items_added,
        BRANCHES.len()
    );
    println!("  {passes} daily submissions through {}", format_day(today));
    println!();
    println!("Try `stockbook ledger show {}`.", BRANCHES[0]);
    Ok(())
}

fn format_day(date: NaiveDate) -> String {
    date.format("%a %d %b %Y").to_string()
}

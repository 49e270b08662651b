use crate::db::get_connection;
use crate::error::Result;
use crate::fmt::format_bytes;
use crate::ledger::LedgerStore;
use crate::settings::load_settings;

pub fn run() -> Result<()> {
    let settings = load_settings();
    let data_dir = settings.data_path();
    let db_path = settings.db_path();

    println!("Data dir:   {}", data_dir.display());
    println!("Database:   {}", db_path.display());
    println!("Window:     {} days", settings.window_size);
    println!("Backend:    {}", settings.ledger_backend);

    if db_path.exists() {
        let size = std::fs::metadata(&db_path)?.len();
        println!("DB size:    {}", format_bytes(size));

        let conn = get_connection(&db_path)?;
        let categories: i64 = conn.query_row("SELECT count(*) FROM categories", [], |r| r.get(0))?;
        let items: i64 = conn.query_row("SELECT count(*) FROM items", [], |r| r.get(0))?;
        let branches: i64 = conn.query_row("SELECT count(*) FROM branches", [], |r| r.get(0))?;
        let sheets = LedgerStore::open(settings.backend()?, &conn, &data_dir)
            .list_sheets()?
            .len();

        println!();
        println!("Categories:  {categories}");
        println!("Items:       {items}");
        println!("Branches:    {branches}");
        println!("Ledgers:     {sheets}");
    } else {
        println!();
        println!("Database not found. Run `stockbook init` to set up.");
    }

    Ok(())
}

use std::path::{Path, PathBuf};

use rusqlite::backup::Backup;

use crate::cli::Context;
use crate::error::Result;
use crate::fmt::format_bytes;
use crate::ledger::BackendKind;

pub fn run(output: Option<String>) -> Result<()> {
    let ctx = Context::open()?;
    let data_dir = ctx.settings.data_path();

    let dest_path = match output {
        Some(p) => PathBuf::from(p),
        None => {
            let backups_dir = data_dir.join("backups");
            std::fs::create_dir_all(&backups_dir)?;
            let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
            backups_dir.join(format!("stockbook-{stamp}.db"))
        }
    };

    let mut dest_conn = rusqlite::Connection::open(&dest_path)?;
    let backup = Backup::new(&ctx.conn, &mut dest_conn)?;
    backup.run_to_completion(100, std::time::Duration::from_millis(10), None)?;

    let size = std::fs::metadata(&dest_path)?.len();
    println!("Backup saved to {}", dest_path.display());
    println!("Size: {}", format_bytes(size));

    // CSV ledgers live outside the database.
    if ctx.settings.backend()? == BackendKind::Csv {
        let sheets_dest = dest_path.with_extension("sheets");
        let copied = copy_sheets(&data_dir.join("sheets"), &sheets_dest)?;
        println!("Ledgers: {copied} copied to {}", sheets_dest.display());
    }
    Ok(())
}

fn copy_sheets(src: &Path, dest: &Path) -> Result<usize> {
    if !src.exists() {
        return Ok(0);
    }
    std::fs::create_dir_all(dest)?;
    let mut copied = 0;
    for entry in std::fs::read_dir(src)? {
        let path = entry?.path();
        if path.extension().map_or(false, |e| e == "csv") {
            if let Some(name) = path.file_name() {
                std::fs::copy(&path, dest.join(name))?;
                copied += 1;
            }
        }
    }
    Ok(copied)
}

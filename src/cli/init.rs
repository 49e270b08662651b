use colored::Colorize;

use crate::db::{get_connection, init_db};
use crate::error::Result;
use crate::ledger::BackendKind;
use crate::settings::{load_settings, save_settings, shellexpand_path};

pub fn run(data_dir: Option<String>, window_size: Option<usize>, backend: Option<String>) -> Result<()> {
    let mut settings = load_settings();

    if let Some(dir) = data_dir {
        settings.data_dir = shellexpand_path(&dir);
    }
    if let Some(size) = window_size {
        settings.window_size = size;
    }
    if let Some(backend) = backend {
        settings.ledger_backend = backend.trim().to_ascii_lowercase();
    }
    settings.validate()?;
    save_settings(&settings)?;

    let resolved = settings.data_path();
    std::fs::create_dir_all(&resolved)?;
    std::fs::create_dir_all(resolved.join("exports"))?;
    if settings.backend()? == BackendKind::Csv {
        std::fs::create_dir_all(resolved.join("sheets"))?;
    }

    let conn = get_connection(&settings.db_path())?;
    init_db(&conn)?;

    println!("{} stockbook at {}", "Initialized".green(), resolved.display());
    println!(
        "Window: {} days, ledgers stored in {}",
        settings.window_size, settings.ledger_backend
    );
    Ok(())
}

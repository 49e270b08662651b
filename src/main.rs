mod branches;
mod catalog;
mod cli;
mod db;
mod error;
mod fmt;
mod ledger;
mod logging;
mod models;
mod parser;
mod reconciler;
mod settings;
mod sync;
mod window;

use clap::Parser;

use cli::{BranchCommands, CatalogCommands, Cli, Commands, LedgerCommands};

fn main() {
    let cli = Cli::parse();

    let settings = settings::load_settings();
    let env_level = std::env::var("RUST_LOG").ok();
    let started = logging::resolve_level(cli.log_level.as_deref(), env_level.as_deref(), &settings.log_level)
        .and_then(logging::init_logging);
    if let Err(e) = started {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }

    let result = match cli.command {
        Commands::Init {
            data_dir,
            window_size,
            backend,
        } => cli::init::run(data_dir, window_size, backend),
        Commands::Branch { command } => match command {
            BranchCommands::Add { name, sheet } => cli::branch::add(&name, sheet.as_deref()),
            BranchCommands::List => cli::branch::list(),
        },
        Commands::Catalog { command } => match command {
            CatalogCommands::List => cli::catalog::list(),
            CatalogCommands::Add { category, items } => cli::catalog::add(&category, &items),
            CatalogCommands::Import { file } => cli::catalog::import(&file),
            CatalogCommands::Delete { category } => cli::catalog::delete(&category),
            CatalogCommands::DeleteItems { category, items } => {
                cli::catalog::delete_items(&category, &items)
            }
        },
        Commands::Sync { file, date } => cli::sync::run(&file, date.as_deref()),
        Commands::Ledger { command } => match command {
            LedgerCommands::Show { branch } => cli::ledger::show(&branch),
            LedgerCommands::Export { branch, output } => cli::ledger::export(&branch, output.as_deref()),
        },
        Commands::LastSubmission { branch } => cli::branch::last_submission(&branch),
        Commands::Demo => cli::demo::run(),
        Commands::Backup { output } => cli::backup::run(output),
        Commands::Status => cli::status::run(),
        Commands::Completions { shell } => cli::completions::run(shell),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StockbookError {
    #[error("Database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Unknown branch: {0}")]
    UnknownBranch(String),

    #[error("Unknown category: {0}")]
    UnknownCategory(String),

    #[error("Catalog unavailable: {0}")]
    CatalogUnavailable(String),

    #[error("Ledger unavailable: {0}")]
    LedgerUnavailable(String),

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, StockbookError>;

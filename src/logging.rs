use flexi_logger::{Logger, LoggerHandle, WriteMode};
use once_cell::sync::OnceCell;

use crate::error::{Result, StockbookError};

static LOGGER: OnceCell<LoggerHandle> = OnceCell::new();

/// Maps user input onto a level flexi_logger accepts.
pub fn normalize_level(level: &str) -> Result<&'static str> {
    match level.trim().to_ascii_lowercase().as_str() {
        "off" => Ok("off"),
        "trace" => Ok("trace"),
        "debug" => Ok("debug"),
        "info" => Ok("info"),
        "warn" | "warning" => Ok("warn"),
        "error" => Ok("error"),
        other => Err(StockbookError::Settings(format!(
            "unsupported log level `{other}`; expected off|trace|debug|info|warn|error"
        ))),
    }
}

/// Picks the effective level: explicit flag, then `RUST_LOG`, then settings.
/// A `RUST_LOG` value that is not a plain level (e.g. a module filter) is skipped.
pub fn resolve_level(flag: Option<&str>, env: Option<&str>, configured: &str) -> Result<&'static str> {
    if let Some(level) = flag {
        return normalize_level(level);
    }
    if let Some(level) = env.and_then(|v| normalize_level(v).ok()) {
        return Ok(level);
    }
    normalize_level(configured)
}

/// Starts the logger once; later calls are no-ops.
pub fn init_logging(level: &str) -> Result<()> {
    let level = normalize_level(level)?;
    LOGGER
        .get_or_try_init(|| {
            Logger::try_with_str(level)
                .map_err(|e| StockbookError::Settings(format!("invalid log level `{level}`: {e}")))?
                .log_to_stderr()
                .write_mode(WriteMode::Direct)
                .start()
                .map_err(|e| StockbookError::Other(format!("failed to start logger: {e}")))
        })
        .map(|_| ())
}

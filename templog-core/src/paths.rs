//! Default locations for templog data.

use std::path::PathBuf;

/// Get the templog data directory.
///
/// Resolution order:
/// 1. `TEMPLOG_DATA_DIR` environment variable
/// 2. `~/.templog`
/// 3. `./.templog` when no home directory is known
pub fn data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("TEMPLOG_DATA_DIR") {
        return PathBuf::from(dir);
    }

    dirs::home_dir().map(|h| h.join(".templog")).unwrap_or_else(|| PathBuf::from(".templog"))
}

/// Get the database path.
pub fn db_path() -> PathBuf {
    data_dir().join("templog.db")
}

/// Get the default configuration file path.
pub fn config_path() -> PathBuf {
    data_dir().join("config.json")
}

//! Platform directories for Gridwatch data

use std::path::PathBuf;

use crate::constants;

/// Root data directory, e.g. `~/.local/share/gridwatch`
pub fn data_dir() -> PathBuf {
    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(constants::config::CONFIG_DIR_NAME)
}

/// Log file directory
pub fn logs_dir() -> PathBuf {
    data_dir().join("logs")
}

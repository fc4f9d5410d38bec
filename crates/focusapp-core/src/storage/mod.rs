mod config;
pub mod database;
pub mod migrations;

pub use config::{
    CalendarConfig, Config, RemoteSection, SamplerConfig, SessionConfig, StorageBackend,
    StorageConfig,
};
pub use database::Database;

use std::path::PathBuf;

/// Returns the directory holding the database and `config.toml`.
///
/// `FOCUSAPP_DATA_DIR` wins if set. Otherwise `~/.config/focusapp[-dev]/`,
/// where `FOCUSAPP_ENV=dev` selects the development directory.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf, std::io::Error> {
    let dir = match std::env::var_os("FOCUSAPP_DATA_DIR") {
        Some(explicit) if !explicit.is_empty() => PathBuf::from(explicit),
        _ => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");
            let env = std::env::var("FOCUSAPP_ENV").unwrap_or_else(|_| "production".to_string());
            if env == "dev" {
                base_dir.join("focusapp-dev")
            } else {
                base_dir.join("focusapp")
            }
        }
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

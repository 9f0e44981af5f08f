mod config;
pub mod database;
pub mod migrations;
mod stores;

pub use config::{AppConfig, Config, GameConfig, PauseConfig, PlanterConfig, PlanterKind};
pub use database::{AuditEntry, Database};

use std::path::PathBuf;

use crate::error::Result;

/// Returns `~/.config/bastion[-dev]/` based on BASTION_ENV.
///
/// Set BASTION_ENV=dev to use development data directory.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("BASTION_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("bastion-dev")
    } else {
        base_dir.join("bastion")
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

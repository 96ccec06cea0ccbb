use crate::domain::models::ClockSettings;
use crate::infrastructure::config::{ensure_default_config, load_clock_settings};
use crate::infrastructure::error::InfraError;
use std::fs;
use std::path::{Path, PathBuf};

pub const DATABASE_FILE: &str = "focus-clock.sqlite";

#[derive(Debug)]
pub struct BootstrapResult {
    pub workspace_root: PathBuf,
    pub config_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub database_path: PathBuf,
    pub settings: ClockSettings,
}

pub fn bootstrap_workspace(workspace_root: &Path) -> Result<BootstrapResult, InfraError> {
    let config_dir = workspace_root.join("config");
    let state_dir = workspace_root.join("state");
    let logs_dir = workspace_root.join("logs");
    let database_path = state_dir.join(DATABASE_FILE);

    fs::create_dir_all(&config_dir)?;
    fs::create_dir_all(&state_dir)?;
    fs::create_dir_all(&logs_dir)?;

    ensure_default_config(&config_dir)?;
    let settings = load_clock_settings(&config_dir)?;

    Ok(BootstrapResult {
        workspace_root: workspace_root.to_path_buf(),
        config_dir,
        logs_dir,
        database_path,
        settings,
    })
}

//! Configuration loader
//!
//! Loads the application configuration from a TOML or JSON file.
//!
//! ## Loading Strategy
//! 1. Loads `.env` (if present) into the process environment
//! 2. Uses the file named by `ICALSYNC_CONFIG`, or searches standard paths
//! 3. Parses by extension (`.toml` or `.json`)
//! 4. Applies environment overrides
//! 5. Validates cross-references ([`AppConfig::validate`])
//!
//! ## Environment Variables
//! - `ICALSYNC_CONFIG`: Config file path
//! - `ICALSYNC_SCHEDULE_DELAY_SECONDS`: Overrides `schedule.delay_seconds`
//! - `ICALSYNC_WORKER_POOL_SIZE`: Overrides `schedule.worker_pool_size`
//! - `ICALSYNC_LISTENING_PORT`: Overrides `authorization.listening_port`
//!
//! ## File Locations
//! The loader searches the following paths (in order):
//! 1. `./icalsync.toml`, `./icalsync.json`, `./config.toml`, `./config.json`
//! 2. The same names next to the executable

use std::path::{Path, PathBuf};
use std::str::FromStr;

use icalsync_domain::{AppConfig, Result, SyncError};

/// Names the config file explicitly.
pub const CONFIG_PATH_ENV: &str = "ICALSYNC_CONFIG";

const CANDIDATE_NAMES: [&str; 4] = ["icalsync.toml", "icalsync.json", "config.toml", "config.json"];

/// Load and validate the configuration.
///
/// # Errors
/// Returns `SyncError::Config` if:
/// - No config file is found, or the named one does not exist
/// - File format is invalid or required fields are missing
/// - An override variable does not parse
/// - Validation fails
pub fn load() -> Result<AppConfig> {
    if let Ok(path) = dotenvy::dotenv() {
        tracing::debug!(path = %path.display(), "Loaded environment file");
    }

    let path = std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from);
    let mut config = read_file(path)?;
    apply_env_overrides(&mut config)?;
    config.validate()?;
    Ok(config)
}

/// Load a configuration file without environment overrides.
///
/// If `path` is `None`, uses [`find_config_file`].
///
/// # Errors
/// Returns `SyncError::Config` if the file is missing, malformed or invalid.
pub fn load_from_file(path: Option<PathBuf>) -> Result<AppConfig> {
    let config = read_file(path)?;
    config.validate()?;
    Ok(config)
}

fn read_file(path: Option<PathBuf>) -> Result<AppConfig> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(SyncError::Config(format!("Config file not found: {}", p.display())));
            }
            p
        }
        None => find_config_file().ok_or_else(|| {
            SyncError::Config(format!(
                "No config file found; set {CONFIG_PATH_ENV} or create one of {}",
                CANDIDATE_NAMES.join(", ")
            ))
        })?,
    };

    tracing::info!(path = %config_path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| SyncError::Config(format!("Failed to read config file: {}", e)))?;

    parse_config(&contents, &config_path)
}

/// Parse configuration content, format detected by extension.
///
/// # Errors
/// Returns `SyncError::Config` if the format is unsupported or parsing fails.
pub fn parse_config(contents: &str, path: &Path) -> Result<AppConfig> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| SyncError::Config(format!("Invalid TOML format: {}", e))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| SyncError::Config(format!("Invalid JSON format: {}", e))),
        _ => Err(SyncError::Config(format!("Unsupported config format: {}", extension))),
    }
}

/// First existing config file in the working directory or next to the
/// executable.
pub fn find_config_file() -> Option<PathBuf> {
    let mut candidates = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        candidates.extend(CANDIDATE_NAMES.iter().map(|name| cwd.join(name)));
    }

    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            candidates.extend(CANDIDATE_NAMES.iter().map(|name| exe_dir.join(name)));
        }
    }

    candidates.into_iter().find(|path| path.exists())
}

fn apply_env_overrides(config: &mut AppConfig) -> Result<()> {
    if let Some(delay) = env_parse::<u64>("ICALSYNC_SCHEDULE_DELAY_SECONDS")? {
        config.schedule.delay_seconds = delay;
    }
    if let Some(size) = env_parse::<usize>("ICALSYNC_WORKER_POOL_SIZE")? {
        config.schedule.worker_pool_size = Some(size);
    }
    if let Some(port) = env_parse::<u16>("ICALSYNC_LISTENING_PORT")? {
        config.authorization.listening_port = port;
    }
    Ok(())
}

/// Parse an optional environment variable.
///
/// # Errors
/// Returns `SyncError::Config` if the variable is set but does not parse.
fn env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| SyncError::Config(format!("Invalid value for {}: {}", key, e))),
        _ => Ok(None),
    }
}

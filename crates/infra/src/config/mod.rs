//! Configuration loading
//!
//! Locates, parses and validates the [`icalsync_domain::AppConfig`] file.

pub mod loader;

pub use loader::{find_config_file, load, load_from_file, parse_config, CONFIG_PATH_ENV};

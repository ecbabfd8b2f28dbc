//! CLI commands.

pub mod build;
pub mod clean;

use std::path::Path;

use color_eyre::eyre::{Result, WrapErr};
use kiln_core::Config;

/// Load the configuration for a site rooted at `source`.
///
/// An explicit `config_path` wins over the files searched in `source`.
pub fn load_config(source: &Path, config_path: Option<&Path>) -> Result<Config> {
    let mut config = match config_path {
        Some(path) => Config::load(path)
            .wrap_err_with(|| format!("Failed to load configuration {}", path.display()))?,
        None => Config::discover(source).wrap_err("Failed to load configuration")?,
    };
    config.source = source.to_string_lossy().into_owned();
    Ok(config)
}

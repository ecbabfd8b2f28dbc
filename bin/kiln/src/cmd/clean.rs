//! Clean command - removes generated output

use std::path::Path;

use color_eyre::eyre::{Result, WrapErr};
use kiln_generator::Site;

use super::load_config;

/// Run the clean command.
///
/// Deletes the destination directory, the regeneration metadata and the
/// cache directory.
pub fn run(source: &Path, config_path: Option<&Path>, destination: Option<&Path>) -> Result<()> {
    let mut config = load_config(source, config_path)?;
    if let Some(destination) = destination {
        config.destination = destination.to_string_lossy().into_owned();
    }
    tracing::info!(?source, destination = %config.destination, "Cleaning site");

    let mut site = Site::new(config).wrap_err("Failed to set up site")?;
    site.clean_all().wrap_err("Clean failed")?;

    println!("  Removed {}", site.dest().display());
    Ok(())
}

//! Build command - generates the site

use std::{
    path::{Path, PathBuf},
    time::Instant,
};

use color_eyre::eyre::{Result, WrapErr};
use kiln_core::Config;
use kiln_generator::{BuildStats, Plugins, Site, SitemapGenerator};

use super::load_config;

/// Command-line overrides for a build.
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// Destination directory.
    pub destination: Option<PathBuf>,
    /// Only rebuild what changed.
    pub incremental: bool,
    /// Restricted mode.
    pub safe: bool,
    /// Path prefix the site is served under.
    pub baseurl: Option<String>,
    /// Render drafts.
    pub drafts: bool,
    /// Publish future-dated posts.
    pub future: bool,
    /// Render unpublished documents.
    pub unpublished: bool,
    /// Keep only the N most recent posts.
    pub limit_posts: Option<i64>,
}

impl BuildOptions {
    /// Apply the overrides to a loaded configuration.
    pub fn apply(&self, config: &mut Config) {
        if let Some(destination) = &self.destination {
            config.destination = destination.to_string_lossy().into_owned();
        }
        if let Some(baseurl) = &self.baseurl {
            tracing::info!(baseurl = %baseurl, "Overriding baseurl from CLI");
            config.baseurl = baseurl.clone();
        }
        if let Some(limit) = self.limit_posts {
            config.limit_posts = limit;
        }
        config.incremental |= self.incremental;
        config.safe |= self.safe;
        config.show_drafts |= self.drafts;
        config.future |= self.future;
        config.unpublished |= self.unpublished;
    }
}

/// Run the build command.
///
/// Builds the site in `source` into its destination directory.
pub fn run(source: &Path, config_path: Option<&Path>, options: &BuildOptions) -> Result<BuildStats> {
    let start = Instant::now();
    tracing::info!(?source, ?config_path, ?options, "Starting build");

    let mut config = load_config(source, config_path)?;
    options.apply(&mut config);
    tracing::debug!(?config, "Loaded configuration");

    let plugins = Plugins::new().with_generator(SitemapGenerator::new());
    let mut site = Site::with_plugins(config, plugins).wrap_err("Failed to set up site")?;
    let stats = site.process().wrap_err("Build failed")?;

    let duration = start.elapsed();

    // Print build statistics
    println!();
    println!("  Build completed successfully!");
    println!();
    println!("  Documents:    {}", stats.documents);
    println!("  Pages:        {}", stats.pages);
    println!("  Static files: {}", stats.static_files);
    println!("  Rendered:     {}", stats.rendered);
    println!("  Skipped:      {}", stats.skipped);
    println!("  Written:      {}", stats.written);
    println!();
    println!("  Duration:     {:.2}s", duration.as_secs_f64());
    println!("  Output:       {}", site.dest().display());
    println!();

    tracing::info!(?stats, ?duration, "Build completed successfully");

    Ok(stats)
}

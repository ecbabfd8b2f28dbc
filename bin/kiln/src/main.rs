//! Kiln CLI
//!
//! Static site build engine for Markdown content with layouts.
//!
//! This is the binary entry point. The library functionality is in `lib.rs`.

use std::path::PathBuf;

use clap::Parser;
use color_eyre::eyre::Result;
use kiln::cmd::build::BuildOptions;

/// Command-line interface for Kiln.
#[derive(Parser)]
#[command(name = "kiln", version, about = "A static site build engine")]
struct Cli {
    /// Site source directory
    #[arg(short, long, global = true, default_value = ".")]
    source: PathBuf,

    /// Path to configuration file (defaults to _config.yml in the source)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands.
#[derive(clap::Subcommand)]
enum Commands {
    /// Build the site
    Build {
        /// Output directory
        #[arg(short, long)]
        destination: Option<PathBuf>,
        /// Only rebuild files that changed
        #[arg(short, long)]
        incremental: bool,
        /// Disable unsafe plugins and the disk cache
        #[arg(long)]
        safe: bool,
        /// Serve the site under a path prefix (e.g., /blog)
        #[arg(short, long)]
        baseurl: Option<String>,
        /// Render drafts
        #[arg(short = 'D', long)]
        drafts: bool,
        /// Publish posts dated in the future
        #[arg(long)]
        future: bool,
        /// Render documents marked unpublished
        #[arg(long)]
        unpublished: bool,
        /// Keep only the N most recent posts
        #[arg(long)]
        limit_posts: Option<i64>,
    },
    /// Remove the generated site, metadata and cache
    Clean {
        /// Output directory
        #[arg(short, long)]
        destination: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    kiln::init_tracing(cli.verbose);

    match cli.command {
        Commands::Build {
            destination,
            incremental,
            safe,
            baseurl,
            drafts,
            future,
            unpublished,
            limit_posts,
        } => {
            let options = BuildOptions {
                destination,
                incremental,
                safe,
                baseurl,
                drafts,
                future,
                unpublished,
                limit_posts,
            };
            kiln::cmd::build::run(&cli.source, cli.config.as_deref(), &options)?;
        }
        Commands::Clean { destination } => {
            kiln::cmd::clean::run(&cli.source, cli.config.as_deref(), destination.as_deref())?;
        }
    }

    Ok(())
}

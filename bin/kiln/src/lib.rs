//! Kiln CLI Library
//!
//! Command implementations for the `kiln` binary, exposed as a library so
//! they can be tested and reused.
//!
//! # Modules
//!
//! - [`cmd`] - Command implementations (build, clean)
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//!
//! use kiln::cmd::{self, build::BuildOptions};
//!
//! let stats = cmd::build::run(Path::new("."), None, &BuildOptions::default()).unwrap();
//! println!("{} files written", stats.written);
//! ```

pub mod cmd;

// Re-export core types for convenience
pub use kiln_core::Config;
pub use kiln_generator::{BuildStats, Site};

/// Initialize tracing with the specified verbosity level.
///
/// # Arguments
///
/// * `verbose` - Verbosity level (0 = WARN, 1 = INFO, 2 = DEBUG, 3+ = TRACE)
///
/// # Example
///
/// ```no_run
/// kiln::init_tracing(2); // Enable DEBUG level logging
/// ```
pub fn init_tracing(verbose: u8) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let level = match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();
}

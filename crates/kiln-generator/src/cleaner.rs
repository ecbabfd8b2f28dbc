//! Removal of obsolete destination files.
//!
//! Everything below the destination that no item writes, that is not the
//! parent directory of an output, and that `keep_files` does not protect is
//! deleted.

use std::{
    collections::HashSet,
    fs, io,
    path::{Path, PathBuf},
};

use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;

/// Cleaner errors.
#[derive(Debug, Error)]
pub enum CleanerError {
    /// Failed to remove a path.
    #[error("failed to remove {path}: {source}")]
    Io {
        /// Offending path.
        path: PathBuf,
        /// Underlying error.
        source: io::Error,
    },

    /// Failed to list the destination.
    #[error("failed to list destination: {0}")]
    Walk(#[from] walkdir::Error),
}

/// Result type for cleaner operations.
pub type Result<T> = std::result::Result<T, CleanerError>;

/// Delete obsolete entries below `dest` and return what was removed.
///
/// `outputs` holds the absolute path of every file this build writes.
/// `keep_files` holds destination-relative paths that are never removed.
pub fn cleanup(dest: &Path, outputs: &HashSet<PathBuf>, keep_files: &[String]) -> Result<Vec<PathBuf>> {
    if !dest.is_dir() {
        return Ok(Vec::new());
    }

    let mut protected: HashSet<PathBuf> = HashSet::new();
    for output in outputs {
        protected.extend(parents_below(dest, output));
    }

    let mut obsolete = Vec::new();
    for entry in WalkDir::new(dest).min_depth(1) {
        let entry = entry?;
        let path = entry.path();
        let relative = path.strip_prefix(dest).unwrap_or(path);
        if is_kept(relative, keep_files) {
            protected.extend(parents_below(dest, path));
            continue;
        }
        if outputs.contains(path) {
            continue;
        }
        obsolete.push(entry.into_path());
    }
    obsolete.retain(|path| !protected.contains(path));
    obsolete.sort();

    let mut removed = Vec::new();
    for path in obsolete {
        if path.is_dir() && !path.is_symlink() {
            remove(&path, |p| fs::remove_dir_all(p))?;
        } else {
            remove(&path, |p| fs::remove_file(p))?;
        }
        debug!(path = %path.display(), "removed obsolete file");
        removed.push(path);
    }
    Ok(removed)
}

/// Directories between `dest` (exclusive) and `path` (exclusive).
fn parents_below<'a>(dest: &'a Path, path: &'a Path) -> impl Iterator<Item = PathBuf> + 'a {
    path.ancestors()
        .skip(1)
        .take_while(move |dir| *dir != dest && dir.starts_with(dest))
        .map(Path::to_path_buf)
}

fn is_kept(relative: &Path, keep_files: &[String]) -> bool {
    keep_files.iter().any(|keep| {
        let keep = keep.trim_matches('/');
        !keep.is_empty() && relative.starts_with(keep)
    })
}

fn remove(path: &Path, op: impl Fn(&Path) -> io::Result<()>) -> Result<()> {
    match op(path) {
        Ok(()) => Ok(()),
        // Already gone with its parent directory.
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(CleanerError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

//! Incremental regeneration decisions.
//!
//! Every source path that took part in a build is recorded with a content
//! fingerprint and the set of paths it depends on (layouts, linked
//! documents, includes). On the next build an item is regenerated when its
//! own fingerprint changed, when anything in its dependency closure changed,
//! or when its destination is missing. Decisions are memoized per run.

use std::{
    collections::{BTreeMap, BTreeSet, HashMap, HashSet},
    fs, io,
    path::{Path, PathBuf},
};

use kiln_core::SiteFile;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, warn};

/// Name of the metadata file in the site source.
pub const METADATA_FILE: &str = ".kiln-metadata";

/// Version of the metadata format. Older files are discarded.
const METADATA_VERSION: u32 = 1;

/// Regenerator errors.
#[derive(Debug, Error)]
pub enum RegeneratorError {
    /// Failed to write the metadata file.
    #[error("failed to write regeneration metadata {path}: {source}")]
    Io {
        /// Metadata path.
        path: PathBuf,
        /// Underlying error.
        source: io::Error,
    },

    /// Failed to serialize metadata.
    #[error("failed to serialize regeneration metadata: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for regenerator operations.
pub type Result<T> = std::result::Result<T, RegeneratorError>;

/// What is known about one source path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// SHA-256 of the file contents at the last build.
    pub fingerprint: String,
    /// Paths this one depends on.
    pub deps: BTreeSet<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct MetadataFile {
    version: u32,
    entries: BTreeMap<String, Entry>,
}

#[derive(Debug, Default)]
struct State {
    metadata: BTreeMap<String, Entry>,
    /// Whether a path or anything in its dependency closure changed.
    cache: HashMap<String, bool>,
    /// Whether a path's own contents changed.
    changed: HashMap<String, bool>,
}

/// Decides which items need rebuilding.
#[derive(Debug)]
pub struct Regenerator {
    metadata_file: PathBuf,
    disabled: bool,
    state: Mutex<State>,
}

/// SHA-256 hex digest of a file, or `None` if it cannot be read.
pub fn fingerprint(path: &Path) -> Option<String> {
    let bytes = fs::read(path).ok()?;
    Some(hex::encode(Sha256::digest(&bytes)))
}

fn key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

impl Regenerator {
    /// Create a regenerator for a site rooted at `source`.
    ///
    /// It is disabled, and always says "regenerate", unless `incremental`
    /// is set and `full_rebuild` is not.
    pub fn new(source: &Path, incremental: bool, full_rebuild: bool) -> Self {
        let disabled = !incremental || full_rebuild;
        let metadata_file = source.join(METADATA_FILE);
        let metadata = if disabled {
            BTreeMap::new()
        } else {
            read_metadata(&metadata_file)
        };
        debug!(
            disabled,
            entries = metadata.len(),
            "initialized regenerator"
        );
        Self {
            metadata_file,
            disabled,
            state: Mutex::new(State {
                metadata,
                ..State::default()
            }),
        }
    }

    /// Whether incremental regeneration is off.
    pub fn disabled(&self) -> bool {
        self.disabled
    }

    /// Path of the persisted metadata.
    pub fn metadata_file(&self) -> &Path {
        &self.metadata_file
    }

    /// Whether `item` must be rendered and written this run.
    ///
    /// An item that will be rendered gets a fresh record with no
    /// dependencies; rendering records them again.
    pub fn regenerate(&self, item: &dyn SiteFile, dest: &Path, baseurl: &str) -> bool {
        if self.disabled || !item.write() || item.force_regenerate() {
            return true;
        }
        match item.source_path() {
            Some(source) => {
                self.source_modified_or_dest_missing(source, &item.destination(dest, baseurl))
            }
            None => true,
        }
    }

    /// Whether the source changed or the destination does not exist.
    ///
    /// When it did, the record for `source` is refreshed and its
    /// dependencies dropped.
    pub fn source_modified_or_dest_missing(&self, source: &Path, dest: &Path) -> bool {
        if self.disabled {
            return true;
        }
        let mut state = self.state.lock();
        let path = key(source);
        let regenerate = modified_locked(&mut state, &path) || !dest.exists();
        if regenerate {
            reset_locked(&mut state, &path);
        }
        regenerate
    }

    /// Whether `path` or anything it depends on changed since the last build.
    pub fn modified(&self, path: &Path) -> bool {
        if self.disabled {
            return true;
        }
        modified_locked(&mut self.state.lock(), &key(path))
    }

    /// Record `path` with its current fingerprint and no dependencies.
    ///
    /// Always returns `true`, marking the path as changed for this run.
    pub fn add(&self, path: &Path) -> bool {
        add_locked(&mut self.state.lock(), &key(path))
    }

    /// Mark `path` as changed for this run without touching its record.
    pub fn force(&self, path: &Path) -> bool {
        let mut state = self.state.lock();
        state.changed.insert(key(path), true);
        state.cache.insert(key(path), true);
        true
    }

    /// Record that `path` depends on `dependency`.
    ///
    /// Ignored when the regenerator is disabled or `path` has no record.
    pub fn add_dependency(&self, path: &Path, dependency: &Path) {
        if self.disabled {
            return;
        }
        let mut state = self.state.lock();
        let path = key(path);
        let dependency = key(dependency);
        let Some(entry) = state.metadata.get_mut(&path) else {
            return;
        };
        entry.deps.insert(dependency.clone());
        if !state.metadata.contains_key(&dependency) {
            add_locked(&mut state, &dependency);
        }
    }

    /// The record for `path`, if any.
    pub fn entry(&self, path: &Path) -> Option<Entry> {
        self.state.lock().metadata.get(&key(path)).cloned()
    }

    /// Forget all records and decisions.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.metadata.clear();
        state.cache.clear();
        state.changed.clear();
    }

    /// Forget this run's decisions, keeping the records.
    pub fn clear_cache(&self) {
        let mut state = self.state.lock();
        state.cache.clear();
        state.changed.clear();
    }

    /// Persist the records unless disabled.
    pub fn write_metadata(&self) -> Result<()> {
        if self.disabled {
            return Ok(());
        }
        let state = self.state.lock();
        let file = MetadataFile {
            version: METADATA_VERSION,
            entries: state.metadata.clone(),
        };
        let json = serde_json::to_string_pretty(&file)?;
        fs::write(&self.metadata_file, json).map_err(|source| RegeneratorError::Io {
            path: self.metadata_file.clone(),
            source,
        })?;
        debug!(
            path = %self.metadata_file.display(),
            entries = state.metadata.len(),
            "wrote regeneration metadata"
        );
        Ok(())
    }
}

/// Walks the dependency closure of `path` and reports whether any member
/// changed. Only the decision for `path` itself is memoized, so a cycle in
/// the graph cannot leave a member with a decision taken before the rest of
/// the cycle was seen.
fn modified_locked(state: &mut State, path: &str) -> bool {
    if let Some(&cached) = state.cache.get(path) {
        return cached;
    }

    let mut seen = HashSet::new();
    let mut pending = vec![path.to_string()];
    let mut modified = false;
    while let Some(current) = pending.pop() {
        if !seen.insert(current.clone()) {
            continue;
        }
        if current != path {
            match state.cache.get(&current) {
                Some(true) => {
                    modified = true;
                    break;
                }
                // Its whole closure is known to be unchanged.
                Some(false) => continue,
                None => {}
            }
        }
        if changed_locked(state, &current) {
            modified = true;
            break;
        }
        if let Some(entry) = state.metadata.get(&current) {
            pending.extend(entry.deps.iter().filter(|d| !seen.contains(*d)).cloned());
        }
    }

    state.cache.insert(path.to_string(), modified);
    modified
}

/// Whether the contents of `path` differ from its record. A changed path
/// gets its fingerprint refreshed, keeping its dependencies.
fn changed_locked(state: &mut State, path: &str) -> bool {
    if let Some(&changed) = state.changed.get(path) {
        return changed;
    }
    let current = fingerprint(Path::new(path));
    let recorded = state.metadata.get(path).map(|entry| entry.fingerprint.as_str());
    let changed = current.as_deref() != recorded || current.is_none();
    if changed {
        match current {
            Some(fingerprint) => {
                state.metadata.entry(path.to_string()).or_default().fingerprint = fingerprint;
            }
            None => {
                state.metadata.remove(path);
            }
        }
    }
    state.changed.insert(path.to_string(), changed);
    changed
}

fn add_locked(state: &mut State, path: &str) -> bool {
    reset_locked(state, path);
    state.cache.insert(path.to_string(), true);
    true
}

/// Record the current fingerprint of `path` with no dependencies.
fn reset_locked(state: &mut State, path: &str) {
    if let Some(fingerprint) = fingerprint(Path::new(path)) {
        state.metadata.insert(
            path.to_string(),
            Entry {
                fingerprint,
                deps: BTreeSet::new(),
            },
        );
    }
}

fn read_metadata(path: &Path) -> BTreeMap<String, Entry> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(_) => return BTreeMap::new(),
    };
    match serde_json::from_str::<MetadataFile>(&content) {
        Ok(file) if file.version == METADATA_VERSION => file.entries,
        Ok(file) => {
            debug!(version = file.version, "discarding old regeneration metadata");
            BTreeMap::new()
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "discarding unreadable regeneration metadata");
            BTreeMap::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use kiln_core::StaticFile;
    use tempfile::TempDir;

    use super::*;

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_disabled_always_regenerates() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.md");
        write(&file, "a");

        let regen = Regenerator::new(dir.path(), false, false);
        assert!(regen.disabled());
        assert!(regen.modified(&file));

        let full = Regenerator::new(dir.path(), true, true);
        assert!(full.disabled());
    }

    #[test]
    fn test_unknown_path_is_modified_and_recorded() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.md");
        write(&file, "a");

        let regen = Regenerator::new(dir.path(), true, false);
        assert!(regen.modified(&file));
        let entry = regen.entry(&file).expect("recorded");
        assert_eq!(entry.fingerprint, fingerprint(&file).unwrap());
        assert!(entry.deps.is_empty());
    }

    #[test]
    fn test_unchanged_across_runs() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.md");
        write(&file, "a");

        let first = Regenerator::new(dir.path(), true, false);
        assert!(first.modified(&file));
        first.write_metadata().unwrap();

        let second = Regenerator::new(dir.path(), true, false);
        assert!(!second.modified(&file));

        write(&file, "changed");
        second.clear_cache();
        assert!(second.modified(&file));
    }

    #[test]
    fn test_dependency_change_propagates() {
        let dir = TempDir::new().unwrap();
        let page = dir.path().join("page.md");
        let layout = dir.path().join("_layouts/default.html");
        let base = dir.path().join("_layouts/base.html");
        write(&page, "page");
        write(&layout, "layout");
        write(&base, "base");

        let first = Regenerator::new(dir.path(), true, false);
        first.add(&page);
        first.add_dependency(&page, &layout);
        first.add_dependency(&layout, &base);
        first.write_metadata().unwrap();

        let second = Regenerator::new(dir.path(), true, false);
        assert!(!second.modified(&page));

        write(&base, "base changed");
        second.clear_cache();
        assert!(second.modified(&page));
    }

    #[test]
    fn test_dependency_cycle_terminates() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.md");
        let b = dir.path().join("b.md");
        write(&a, "a");
        write(&b, "b");

        let first = Regenerator::new(dir.path(), true, false);
        first.add(&a);
        first.add(&b);
        first.add_dependency(&a, &b);
        first.add_dependency(&b, &a);
        first.write_metadata().unwrap();

        let second = Regenerator::new(dir.path(), true, false);
        assert!(!second.modified(&a));
    }

    #[test]
    fn test_mutual_dependencies_follow_a_change() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.md");
        let b = dir.path().join("b.md");
        write(&a, "a");
        write(&b, "b");

        let first = Regenerator::new(dir.path(), true, false);
        first.add(&a);
        first.add(&b);
        first.add_dependency(&a, &b);
        first.add_dependency(&b, &a);
        first.write_metadata().unwrap();

        write(&a, "a changed");
        let a_first = Regenerator::new(dir.path(), true, false);
        assert!(a_first.modified(&a));
        assert!(a_first.modified(&b));

        let b_first = Regenerator::new(dir.path(), true, false);
        assert!(b_first.modified(&b));
        assert!(b_first.modified(&a));
    }

    #[test]
    fn test_rebuilt_item_records_its_own_change() {
        let dir = TempDir::new().unwrap();
        let page = dir.path().join("src/page.md");
        let layout = dir.path().join("src/_layouts/default.html");
        let output = dir.path().join("out/page.html");
        write(&page, "page");
        write(&layout, "layout");
        write(&output, "<p>page</p>");

        let first = Regenerator::new(&dir.path().join("src"), true, false);
        first.add(&page);
        first.add_dependency(&page, &layout);
        first.write_metadata().unwrap();

        write(&page, "page edited");
        write(&layout, "layout edited");
        let second = Regenerator::new(&dir.path().join("src"), true, false);
        assert!(second.modified(&layout));
        assert!(second.source_modified_or_dest_missing(&page, &output));
        assert!(second.entry(&page).unwrap().deps.is_empty());
        second.add_dependency(&page, &layout);
        second.write_metadata().unwrap();

        let third = Regenerator::new(&dir.path().join("src"), true, false);
        assert!(!third.source_modified_or_dest_missing(&page, &output));
        let entry = third.entry(&page).unwrap();
        assert_eq!(entry.fingerprint, fingerprint(&page).unwrap());
        assert!(entry.deps.contains(&key(&layout)));
    }

    #[test]
    fn test_missing_destination_does_not_mark_dependents() {
        let dir = TempDir::new().unwrap();
        let about = dir.path().join("src/about.md");
        let index = dir.path().join("src/index.md");
        write(&about, "about");
        write(&index, "index");
        write(&dir.path().join("out/index.html"), "index");

        let first = Regenerator::new(&dir.path().join("src"), true, false);
        first.add(&about);
        first.add(&index);
        first.add_dependency(&index, &about);
        first.write_metadata().unwrap();

        let second = Regenerator::new(&dir.path().join("src"), true, false);
        assert!(second.source_modified_or_dest_missing(&about, &dir.path().join("out/about.html")));
        assert!(!second.source_modified_or_dest_missing(&index, &dir.path().join("out/index.html")));
    }

    #[test]
    fn test_add_dependency_requires_record() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.md");
        let b = dir.path().join("b.md");
        write(&a, "a");
        write(&b, "b");

        let regen = Regenerator::new(dir.path(), true, false);
        regen.add_dependency(&a, &b);
        assert!(regen.entry(&a).is_none());

        let disabled = Regenerator::new(dir.path(), false, false);
        disabled.add(&a);
        disabled.add_dependency(&a, &b);
        assert!(disabled.entry(&a).unwrap().deps.is_empty());
    }

    #[test]
    fn test_regenerate_checks_destination() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("src");
        let dest = dir.path().join("out");
        let file = source.join("style.css");
        write(&file, "body {}");

        let item = StaticFile::new(&file, "style.css", None);
        let first = Regenerator::new(&source, true, false);
        assert!(first.regenerate(&item, &dest, ""));
        first.write_metadata().unwrap();

        let second = Regenerator::new(&source, true, false);
        assert!(second.regenerate(&item, &dest, ""), "destination missing");

        write(&dest.join("style.css"), "body {}");
        second.clear_cache();
        assert!(!second.regenerate(&item, &dest, ""));
    }

    #[test]
    fn test_clear_and_corrupt_metadata() {
        let dir = TempDir::new().unwrap();
        write(&dir.path().join(METADATA_FILE), "not json");
        let regen = Regenerator::new(dir.path(), true, false);
        let file = dir.path().join("a.md");
        write(&file, "a");
        regen.add(&file);
        regen.clear();
        assert!(regen.entry(&file).is_none());
    }
}

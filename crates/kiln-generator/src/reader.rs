//! Reading the source tree.
//!
//! Walks the site source and sorts every entry into layouts, data files,
//! collection documents, pages and static files.

use std::{
    collections::BTreeMap,
    fs, io,
    path::{Path, PathBuf},
    time::SystemTime,
};

use chrono::{DateTime, Local, NaiveDateTime};
use kiln_core::{
    Collection, Config, CoreError, Document, FrontMatter, Page, StaticFile,
    config::POSTS,
    document::{DATE_FORMAT, post_name_parts},
    frontmatter::parse_front_matter,
};
use rayon::prelude::*;
use serde_yaml::{Mapping, Value};
use thiserror::Error;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::regenerator::METADATA_FILE;

/// Reader errors.
#[derive(Debug, Error)]
pub enum ReaderError {
    /// IO error on a source path.
    #[error("failed to read {path}: {source}")]
    Io {
        /// Offending path.
        path: PathBuf,
        /// Underlying error.
        source: io::Error,
    },

    /// Directory walk error.
    #[error("failed to walk source tree: {0}")]
    Walk(#[from] walkdir::Error),

    /// Invalid front matter or configuration.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Malformed data file.
    #[error("invalid data file {path}: {message}")]
    Data {
        /// Offending path.
        path: PathBuf,
        /// Parser message.
        message: String,
    },
}

/// Result type for reader operations.
pub type Result<T> = std::result::Result<T, ReaderError>;

/// A layout template from the layouts directory.
#[derive(Debug, Clone)]
pub struct Layout {
    /// Name used in front matter, the relative path without extension.
    pub name: String,
    /// Absolute path.
    pub path: PathBuf,
    /// Path relative to the source, used in error messages.
    pub relative_path: String,
    /// Front matter, which may name a parent `layout`.
    pub data: FrontMatter,
    /// Template body.
    pub content: String,
}

/// Everything read from the source tree.
#[derive(Debug, Default)]
pub struct SiteContent {
    /// Layouts by name.
    pub layouts: BTreeMap<String, Layout>,
    /// Nested data from the data directory.
    pub data: Mapping,
    /// Collections in configuration order, documents unsorted.
    pub collections: Vec<Collection>,
    /// Pages outside collections.
    pub pages: Vec<Page>,
    /// Static files outside collections.
    pub static_files: Vec<StaticFile>,
}

/// Reads a site source directory according to its configuration.
#[derive(Debug)]
pub struct Reader<'a> {
    config: &'a Config,
    source: &'a Path,
    dest: &'a Path,
    cache_dir: &'a Path,
    now: NaiveDateTime,
}

/// One file found by the walk.
struct Candidate {
    path: PathBuf,
    relative: String,
}

/// What a file turned into.
enum Parsed {
    Document(Document),
    Page(Page),
    Static(StaticFile),
    Skipped,
}

impl<'a> Reader<'a> {
    /// Create a reader; `now` decides which posts are in the future.
    pub fn new(
        config: &'a Config,
        source: &'a Path,
        dest: &'a Path,
        cache_dir: &'a Path,
        now: NaiveDateTime,
    ) -> Self {
        Self {
            config,
            source,
            dest,
            cache_dir,
            now,
        }
    }

    /// Read the whole site.
    pub fn read(&self) -> Result<SiteContent> {
        info!(source = %self.source.display(), "reading site");

        let mut content = SiteContent {
            layouts: self.read_layouts()?,
            data: self.read_data()?,
            ..SiteContent::default()
        };

        for (label, options) in self.config.collections_config()? {
            let mut collection =
                Collection::new(&label, options, self.source, &self.config.collections_dir);
            self.read_collection(&mut collection)?;
            content.collections.push(collection);
        }

        self.read_pages(&mut content)?;

        info!(
            layouts = content.layouts.len(),
            collections = content.collections.len(),
            pages = content.pages.len(),
            static_files = content.static_files.len(),
            "read complete"
        );
        Ok(content)
    }

    fn relative(&self, path: &Path) -> String {
        path.strip_prefix(self.source)
            .unwrap_or(path)
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }

    /// Whether a walked entry below the source root is skipped.
    fn filtered(&self, path: &Path) -> bool {
        if path == self.dest || path == self.cache_dir || path.starts_with(self.dest) {
            return true;
        }
        let relative = self.relative(path);
        if relative.is_empty() {
            return false;
        }
        if self.config.include.iter().any(|inc| relative == *inc) {
            return false;
        }
        if self
            .config
            .exclude
            .iter()
            .any(|ex| relative == *ex || relative.starts_with(&format!("{}/", ex.trim_end_matches('/'))))
        {
            return true;
        }
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if name == METADATA_FILE {
            return true;
        }
        if self
            .config
            .include
            .iter()
            .any(|inc| name == *inc)
        {
            return false;
        }
        name.starts_with('.') || name.starts_with('_') || name.starts_with('#') || name.ends_with('~')
    }

    /// Files below `dir`, sorted, honoring exclusions and safe mode.
    fn walk(&self, dir: &Path, prune: bool) -> Result<Vec<Candidate>> {
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut files = Vec::new();
        let walker = WalkDir::new(dir)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| entry.depth() == 0 || !prune || !self.filtered(entry.path()));
        for entry in walker {
            let entry = entry?;
            if !entry.file_type().is_file() && !entry.path_is_symlink() {
                continue;
            }
            if entry.path_is_symlink() && (self.config.safe || !entry.path().is_file()) {
                debug!(path = %entry.path().display(), "skipping symlink");
                continue;
            }
            let name = entry.file_name().to_string_lossy();
            if name.starts_with('.') && !self.config.include.iter().any(|inc| *inc == name) {
                continue;
            }
            let path = entry.into_path();
            files.push(Candidate {
                relative: self.relative(&path),
                path,
            });
        }
        Ok(files)
    }

    fn read_file(&self, path: &Path) -> Result<String> {
        fs::read_to_string(path).map_err(|source| ReaderError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    fn read_layouts(&self) -> Result<BTreeMap<String, Layout>> {
        let dir = self.source.join(&self.config.layouts_dir);
        let mut layouts = BTreeMap::new();
        for candidate in self.walk(&dir, false)? {
            let raw = self.read_file(&candidate.path)?;
            let (data, content) = match parse_front_matter(&raw, &candidate.path)? {
                Some(parsed) => parsed,
                None => (FrontMatter::new(), raw),
            };
            let inner = candidate
                .path
                .strip_prefix(&dir)
                .unwrap_or(&candidate.path)
                .with_extension("");
            let name = inner
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            debug!(layout = %name, "read layout");
            layouts.insert(
                name.clone(),
                Layout {
                    name,
                    path: candidate.path,
                    relative_path: candidate.relative,
                    data,
                    content,
                },
            );
        }
        Ok(layouts)
    }

    fn read_data(&self) -> Result<Mapping> {
        let dir = self.source.join(&self.config.data_dir);
        let mut root = Mapping::new();
        for candidate in self.walk(&dir, false)? {
            let ext = candidate
                .path
                .extension()
                .map(|e| e.to_string_lossy().to_lowercase())
                .unwrap_or_default();
            let raw = self.read_file(&candidate.path)?;
            let data_error = |message: String| ReaderError::Data {
                path: candidate.path.clone(),
                message,
            };
            let value: Value = match ext.as_str() {
                "yml" | "yaml" => serde_yaml::from_str(&raw).map_err(|e| data_error(e.to_string()))?,
                "json" => serde_json::from_str(&raw).map_err(|e| data_error(e.to_string()))?,
                "toml" => toml::from_str(&raw).map_err(|e| data_error(e.to_string()))?,
                _ => {
                    debug!(path = %candidate.path.display(), "ignoring data file");
                    continue;
                }
            };

            let inner = candidate
                .path
                .strip_prefix(&dir)
                .unwrap_or(&candidate.path)
                .with_extension("");
            let keys: Vec<String> = inner
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect();
            insert_nested(&mut root, &keys, value);
        }
        Ok(root)
    }

    fn read_collection(&self, collection: &mut Collection) -> Result<()> {
        let mut candidates = self.walk(collection.directory(), true)?;
        let is_posts = collection.is_posts();
        if is_posts && self.config.show_drafts {
            let drafts = self.source.join(&self.config.collections_dir).join("_drafts");
            candidates.extend(self.walk(&drafts, true)?);
        }

        let label = collection.label().to_string();
        let output = collection.write();
        let parsed: Vec<Parsed> = candidates
            .par_iter()
            .map(|candidate| self.parse_collection_file(candidate, &label, output))
            .collect::<Result<_>>()?;

        for item in parsed {
            match item {
                Parsed::Document(doc) => collection.docs.push(doc),
                Parsed::Static(file) => collection.files.push(file),
                Parsed::Page(_) | Parsed::Skipped => {}
            }
        }
        debug!(
            collection = %label,
            docs = collection.docs.len(),
            files = collection.files.len(),
            "read collection"
        );
        Ok(())
    }

    fn parse_collection_file(&self, candidate: &Candidate, label: &str, output: bool) -> Result<Parsed> {
        let raw = fs::read(&candidate.path).map_err(|source| ReaderError::Io {
            path: candidate.path.clone(),
            source,
        })?;
        let parsed = match std::str::from_utf8(&raw) {
            Ok(text) => parse_front_matter(text, &candidate.path)?,
            Err(_) => None,
        };
        let Some((mut data, body)) = parsed else {
            let mut file = StaticFile::new(&candidate.path, &candidate.relative, Some(label));
            file.set_write(output);
            return Ok(Parsed::Static(file));
        };

        let is_draft = label == POSTS && candidate.relative.split('/').any(|part| part == "_drafts");
        if label == POSTS && !is_draft {
            let stem = candidate
                .path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            if post_name_parts(&stem).is_none() {
                warn!(path = %candidate.relative, "skipping post without a YYYY-MM-DD-slug name");
                return Ok(Parsed::Skipped);
            }
        }
        if is_draft {
            data.insert("draft", true);
            if !data.contains("date") {
                data.insert("date", modified_time(&candidate.path).format(DATE_FORMAT).to_string());
            }
        }

        data.merge_defaults(&self.config.defaults_for(&candidate.relative, label));
        let mut doc = Document::new(&candidate.path, &candidate.relative, label, data, body)?;
        doc.set_output_enabled(output);

        if !doc.published() && !self.config.unpublished {
            debug!(path = %candidate.relative, "skipping unpublished document");
            return Ok(Parsed::Skipped);
        }
        if label == POSTS && !self.config.future && doc.date().is_some_and(|date| date > self.now) {
            debug!(path = %candidate.relative, "skipping future post");
            return Ok(Parsed::Skipped);
        }
        Ok(Parsed::Document(doc))
    }

    fn read_pages(&self, content: &mut SiteContent) -> Result<()> {
        let candidates = self.walk(self.source, true)?;
        let parsed: Vec<Parsed> = candidates
            .par_iter()
            .map(|candidate| self.parse_page_file(candidate))
            .collect::<Result<_>>()?;

        for item in parsed {
            match item {
                Parsed::Page(page) => content.pages.push(page),
                Parsed::Static(file) => content.static_files.push(file),
                Parsed::Document(_) | Parsed::Skipped => {}
            }
        }
        Ok(())
    }

    fn parse_page_file(&self, candidate: &Candidate) -> Result<Parsed> {
        let raw = fs::read(&candidate.path).map_err(|source| ReaderError::Io {
            path: candidate.path.clone(),
            source,
        })?;
        let parsed = match std::str::from_utf8(&raw) {
            Ok(text) => parse_front_matter(text, &candidate.path)?,
            Err(_) => None,
        };
        match parsed {
            Some((mut data, body)) => {
                data.merge_defaults(&self.config.defaults_for(&candidate.relative, "pages"));
                if data.get_bool("published") == Some(false) && !self.config.unpublished {
                    debug!(path = %candidate.relative, "skipping unpublished page");
                    return Ok(Parsed::Skipped);
                }
                Ok(Parsed::Page(Page::new(&candidate.path, &candidate.relative, data, body)))
            }
            None => Ok(Parsed::Static(StaticFile::new(
                &candidate.path,
                &candidate.relative,
                None,
            ))),
        }
    }
}

fn modified_time(path: &Path) -> NaiveDateTime {
    let modified = fs::metadata(path)
        .and_then(|m| m.modified())
        .unwrap_or(SystemTime::UNIX_EPOCH);
    DateTime::<Local>::from(modified).naive_local()
}

fn insert_nested(root: &mut Mapping, keys: &[String], value: Value) {
    let Some((last, parents)) = keys.split_last() else {
        return;
    };
    let mut current = root;
    for key in parents {
        let entry = current
            .entry(Value::from(key.as_str()))
            .or_insert_with(|| Value::Mapping(Mapping::new()));
        if !entry.is_mapping() {
            *entry = Value::Mapping(Mapping::new());
        }
        let Value::Mapping(next) = entry else {
            return;
        };
        current = next;
    }
    current.insert(Value::from(last.as_str()), value);
}

#[cfg(test)]
mod tests {
    use kiln_core::Renderable;
    use tempfile::TempDir;

    use super::*;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn read(source: &Path, config: &Config) -> SiteContent {
        let dest = source.join("_site");
        let cache = source.join(".kiln-cache");
        let now = chrono::NaiveDate::from_ymd_opt(2025, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        Reader::new(config, source, &dest, &cache, now).read().unwrap()
    }

    #[test]
    fn test_sorts_entries() {
        let dir = TempDir::new().unwrap();
        let src = dir.path();
        write(src, "_layouts/default.html", "<html>{{ content }}</html>");
        write(src, "_layouts/post.html", "---\nlayout: default\n---\n<article>{{ content }}</article>");
        write(src, "_data/authors.yml", "alice: Alice");
        write(src, "_data/nav/main.json", "[\"Home\"]");
        write(src, "_posts/2024-01-14-hello.md", "---\ntitle: Hello\n---\nHi");
        write(src, "_posts/not-a-post.md", "---\n---\nx");
        write(src, "_posts/img/a.png", "png");
        write(src, "about.md", "---\ntitle: About\n---\nAbout");
        write(src, "css/main.css", "body {}");
        write(src, "_site/stale.html", "old");
        write(src, ".hidden", "x");
        write(src, ".htaccess", "x");
        write(src, "_config.yml", "title: x");

        let content = read(src, &Config::default());

        assert_eq!(content.layouts.len(), 2);
        assert_eq!(
            content.layouts["post"].data.get_str("layout").as_deref(),
            Some("default")
        );
        assert_eq!(content.data["authors"]["alice"], Value::from("Alice"));
        assert_eq!(content.data["nav"]["main"][0], Value::from("Home"));

        let posts = &content.collections[0];
        assert_eq!(posts.label(), "posts");
        assert_eq!(posts.docs.len(), 1);
        assert_eq!(posts.files.len(), 1);

        let pages: Vec<_> = content.pages.iter().map(|p| p.name().to_string()).collect();
        assert_eq!(pages, vec!["about.md"]);

        let statics: Vec<_> = content
            .static_files
            .iter()
            .map(|f| kiln_core::SiteFile::relative_path(f).to_string())
            .collect();
        assert_eq!(statics, vec![".htaccess", "css/main.css"]);
    }

    #[test]
    fn test_publication_filters() {
        let dir = TempDir::new().unwrap();
        let src = dir.path();
        write(src, "_posts/2024-01-01-old.md", "---\n---\nx");
        write(src, "_posts/2030-01-01-future.md", "---\n---\nx");
        write(src, "_posts/2024-02-01-hidden.md", "---\npublished: false\n---\nx");
        write(src, "_drafts/idea.md", "---\ntitle: Idea\n---\nx");

        let content = read(src, &Config::default());
        assert_eq!(content.collections[0].docs.len(), 1);

        let config = Config {
            future: true,
            unpublished: true,
            show_drafts: true,
            ..Config::default()
        };
        let content = read(src, &config);
        let docs = &content.collections[0].docs;
        assert_eq!(docs.len(), 4);
        assert!(docs.iter().any(|d| d.data().get_bool("draft") == Some(true)));
    }

    #[test]
    fn test_custom_collection_and_defaults() {
        let dir = TempDir::new().unwrap();
        let src = dir.path();
        write(src, "_recipes/soup.md", "---\ntitle: Soup\n---\nx");
        write(src, "_recipes/photo.jpg", "jpg");

        let config = Config::from_yaml_str(
            "collections:\n  recipes:\n    output: true\ndefaults:\n  - scope: {type: recipes}\n    values: {layout: recipe}\n",
        )
        .unwrap();
        let content = read(src, &config);
        let recipes = content
            .collections
            .iter()
            .find(|c| c.label() == "recipes")
            .unwrap();
        assert_eq!(recipes.docs.len(), 1);
        assert_eq!(
            recipes.docs[0].data().get_str("layout").as_deref(),
            Some("recipe")
        );
        assert_eq!(kiln_core::SiteFile::url(&recipes.files[0]), "/recipes/photo.jpg");
    }

    #[test]
    fn test_exclude_and_invalid_data() {
        let dir = TempDir::new().unwrap();
        let src = dir.path();
        write(src, "node_modules/pkg/index.js", "x");
        write(src, "drafts/notes.txt", "x");

        let config = Config {
            exclude: vec!["drafts".to_string(), "node_modules".to_string()],
            ..Config::default()
        };
        let content = read(src, &config);
        assert!(content.static_files.is_empty());

        write(src, "_data/bad.yml", "a: [unclosed");
        let dest = src.join("_site");
        let cache = src.join(".kiln-cache");
        let now = Local::now().naive_local();
        let err = Reader::new(&config, src, &dest, &cache, now).read().unwrap_err();
        assert!(err.to_string().contains("bad.yml"));
    }

    #[test]
    fn test_insert_nested() {
        let mut root = Mapping::new();
        insert_nested(&mut root, &["a".into(), "b".into()], Value::from(1));
        insert_nested(&mut root, &["a".into(), "c".into()], Value::from(2));
        assert_eq!(root["a"]["b"], Value::from(1));
        assert_eq!(root["a"]["c"], Value::from(2));
    }
}

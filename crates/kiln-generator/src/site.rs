//! Build orchestration.
//!
//! A [`Site`] owns the configuration, the content read from the source and
//! the services used while building (converters, cache, regenerator,
//! plugins). [`Site::process`] runs the phases in a fixed order:
//! reset, read, generate, render, cleanup, write.

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    fs, io,
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Instant,
};

use chrono::{Local, NaiveDateTime};
use kiln_core::{
    Collection, Config, CoreError, Page, PermalinkStyle, Renderable, SiteFile, StaticFile,
    config::POSTS, document::DATE_FORMAT, frontmatter::parse_date,
};
use kiln_parser::ConverterRegistry;
use rayon::prelude::*;
use serde_yaml::{Mapping, Value};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
    cache::{CacheError, CacheStore},
    cleaner::{self, CleanerError},
    hooks::{HookError, Hooks, ItemHook, SiteHook},
    plugin::{PluginError, Plugins},
    reader::{Layout, Reader, ReaderError},
    regenerator::{RegeneratorError, Regenerator},
    renderer::{LinkIndex, RenderError, Renderer},
    template::{SimpleEngine, TemplateEngine},
};

/// Build errors.
#[derive(Debug, Error)]
pub enum BuildError {
    /// Configuration, front matter or lookup error from the entity model.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Reading the source failed.
    #[error(transparent)]
    Reader(#[from] ReaderError),

    /// Rendering an item failed.
    #[error(transparent)]
    Render(#[from] RenderError),

    /// The cache failed.
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// Regeneration metadata could not be written.
    #[error(transparent)]
    Regenerator(#[from] RegeneratorError),

    /// Removing obsolete files failed.
    #[error(transparent)]
    Cleaner(#[from] CleanerError),

    /// A site hook failed.
    #[error(transparent)]
    Hook(#[from] HookError),

    /// A generator failed.
    #[error("generator `{name}` failed: {source}")]
    Generator {
        /// Generator name.
        name: String,
        /// Underlying error.
        source: PluginError,
    },

    /// Two items would be written to the same file.
    #[error("destination {destination} is shared by {first} and {second}")]
    Collision {
        /// Shared destination.
        destination: PathBuf,
        /// First item.
        first: String,
        /// Second item.
        second: String,
    },

    /// Writing the destination failed.
    #[error("failed to write {path}: {source}")]
    Io {
        /// Offending path.
        path: PathBuf,
        /// Underlying error.
        source: io::Error,
    },
}

/// Broad classes of build failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Invalid configuration or site layout.
    Configuration,
    /// Something named could not be found.
    Lookup,
    /// File system failure.
    Io,
    /// A plugin, generator or hook failed.
    Plugin,
    /// Malformed content.
    Content,
}

impl BuildError {
    /// The class of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Core(e) | Self::Reader(ReaderError::Core(e)) => core_kind(e),
            Self::Reader(ReaderError::Data { .. }) => ErrorKind::Content,
            Self::Reader(_) => ErrorKind::Io,
            Self::Render(RenderError::Hook { .. }) => ErrorKind::Plugin,
            Self::Render(RenderError::Cache(_)) => ErrorKind::Io,
            Self::Render(e) if e.is_lookup() => ErrorKind::Lookup,
            Self::Render(_) => ErrorKind::Content,
            Self::Cache(_) | Self::Regenerator(_) | Self::Cleaner(_) | Self::Io { .. } => {
                ErrorKind::Io
            }
            Self::Hook(_) | Self::Generator { .. } => ErrorKind::Plugin,
            Self::Collision { .. } => ErrorKind::Configuration,
        }
    }
}

fn core_kind(error: &CoreError) -> ErrorKind {
    match error {
        e if e.is_config() => ErrorKind::Configuration,
        CoreError::Lookup(_) => ErrorKind::Lookup,
        CoreError::Io(_) | CoreError::PathIo { .. } => ErrorKind::Io,
        _ => ErrorKind::Content,
    }
}

/// Result type for site operations.
pub type Result<T> = std::result::Result<T, BuildError>;

/// Build statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildStats {
    /// Documents across all collections.
    pub documents: usize,

    /// Pages, including generated ones.
    pub pages: usize,

    /// Static files, including collection files.
    pub static_files: usize,

    /// Documents and pages rendered this run.
    pub rendered: usize,

    /// Documents and pages left untouched by incremental regeneration.
    pub skipped: usize,

    /// Files written or copied this run.
    pub written: usize,

    /// Build duration in milliseconds.
    pub duration_ms: u64,
}

/// A site being built.
pub struct Site {
    source: PathBuf,
    dest: PathBuf,
    config: Config,

    cache_dir: PathBuf,
    plugin_paths: Vec<PathBuf>,
    include_paths: Vec<PathBuf>,
    permalink_style: PermalinkStyle,
    baseurl: String,

    time: NaiveDateTime,
    layouts: BTreeMap<String, Layout>,
    data: Mapping,
    collections: Vec<Collection>,
    pages: Vec<Page>,
    static_files: Vec<StaticFile>,

    regenerator: Regenerator,
    cache: CacheStore,
    converters: ConverterRegistry,
    plugins: Plugins,
    engine: Arc<dyn TemplateEngine>,
    stats: BuildStats,
}

impl std::fmt::Debug for Site {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Site")
            .field("source", &self.source)
            .field("dest", &self.dest)
            .field("baseurl", &self.baseurl)
            .field("collections", &self.collections.len())
            .field("pages", &self.pages.len())
            .field("static_files", &self.static_files.len())
            .field("plugins", &self.plugins)
            .finish()
    }
}

impl Site {
    /// Create a site with the built-in converters and no plugins.
    pub fn new(config: Config) -> Result<Self> {
        Self::with_plugins(config, Plugins::new())
    }

    /// Create a site with explicitly registered plugins.
    pub fn with_plugins(config: Config, plugins: Plugins) -> Result<Self> {
        let engine = plugins
            .engine()
            .unwrap_or_else(|| Arc::new(SimpleEngine) as Arc<dyn TemplateEngine>);
        let mut site = Self {
            source: PathBuf::new(),
            dest: PathBuf::new(),
            config: Config::default(),
            cache_dir: PathBuf::new(),
            plugin_paths: Vec::new(),
            include_paths: Vec::new(),
            permalink_style: PermalinkStyle::Date,
            baseurl: String::new(),
            time: Local::now().naive_local(),
            layouts: BTreeMap::new(),
            data: Mapping::new(),
            collections: Vec::new(),
            pages: Vec::new(),
            static_files: Vec::new(),
            regenerator: Regenerator::new(Path::new(""), false, true),
            cache: CacheStore::default(),
            converters: ConverterRegistry::new(),
            plugins,
            engine,
            stats: BuildStats::default(),
        };
        site.set_config(config)?;
        site.reset()?;
        site.trigger(SiteHook::AfterInit, None)?;
        Ok(site)
    }

    /// Install a configuration snapshot and re-derive everything from it.
    pub fn set_config(&mut self, config: Config) -> Result<()> {
        config.validate()?;

        let source = absolute(Path::new(&config.source))?;
        let dest = absolute(Path::new(&config.destination))?;
        if source == dest || source.starts_with(&dest) {
            return Err(CoreError::config(format!(
                "destination directory {} cannot be or contain the source directory",
                dest.display()
            ))
            .into());
        }

        if !config.encoding.eq_ignore_ascii_case("utf-8") {
            warn!(encoding = %config.encoding, "only UTF-8 sources are supported, reading as UTF-8");
        }

        self.cache_dir = source.join(&config.cache_dir);
        self.plugin_paths = vec![source.join(&config.plugins_dir)];
        self.include_paths = vec![source.join(&config.includes_dir)];
        self.permalink_style = config.permalink_style();
        self.baseurl = config.baseurl();
        self.regenerator = Regenerator::new(&source, config.incremental, config.full_rebuild);
        self.cache
            .reconfigure(config.disk_cache_enabled().then(|| self.cache_dir.clone()));

        let mut converters = ConverterRegistry::with_defaults(config.markdown_extensions());
        for converter in self.plugins.converters() {
            converters.register_shared(Arc::clone(converter));
        }
        self.converters = converters;

        debug!(
            source = %source.display(),
            dest = %dest.display(),
            baseurl = %self.baseurl,
            "configured site"
        );
        self.source = source;
        self.dest = dest;
        self.config = config;
        Ok(())
    }

    /// Run a full build.
    pub fn process(&mut self) -> Result<BuildStats> {
        let start = Instant::now();
        info!(
            source = %self.source.display(),
            destination = %self.dest.display(),
            incremental = !self.regenerator.disabled(),
            "starting build"
        );

        self.reset()?;
        self.read()?;
        self.generate()?;
        self.render()?;
        self.cleanup()?;
        self.write()?;

        self.stats.duration_ms = start.elapsed().as_millis() as u64;
        info!(
            documents = self.stats.documents,
            pages = self.stats.pages,
            static_files = self.stats.static_files,
            rendered = self.stats.rendered,
            skipped = self.stats.skipped,
            written = self.stats.written,
            duration_ms = self.stats.duration_ms,
            "build complete"
        );
        Ok(self.stats.clone())
    }

    /// Clear run-scoped state.
    pub fn reset(&mut self) -> Result<()> {
        if self.config.limit_posts < 0 {
            return Err(CoreError::config("limit_posts must be a non-negative number").into());
        }

        self.time = match self.config.extra.get("time").and_then(Value::as_str) {
            Some(raw) => parse_date(raw)
                .ok_or_else(|| CoreError::config(format!("invalid time `{raw}`")))?,
            None => Local::now().naive_local(),
        };
        self.layouts.clear();
        self.data = Mapping::new();
        self.collections.clear();
        self.pages.clear();
        self.static_files.clear();
        self.stats = BuildStats::default();
        self.regenerator.clear_cache();
        if self.cache.clear_if_config_changed(&self.config.fingerprint()?)? {
            info!("configuration changed, cache cleared");
        }

        self.trigger(SiteHook::AfterReset, None)
    }

    /// Read the source tree and apply `limit_posts`.
    pub fn read(&mut self) -> Result<()> {
        let content = Reader::new(
            &self.config,
            &self.source,
            &self.dest,
            &self.cache_dir,
            self.time,
        )
        .read()?;

        self.layouts = content.layouts;
        self.data = content.data;
        self.collections = content.collections;
        self.pages = content.pages;
        self.static_files = content.static_files;

        for collection in &mut self.collections {
            collection.sort_docs();
        }
        let limit = self.config.limit_posts;
        if limit > 0
            && let Some(posts) = self.collection_mut(POSTS)
        {
            posts.keep_last(limit as usize);
        }

        self.assign_urls()?;
        self.trigger(SiteHook::PostRead, None)
    }

    /// Run every generator in order.
    pub fn generate(&mut self) -> Result<()> {
        for generator in self.plugins.generators(self.config.safe) {
            let start = Instant::now();
            generator
                .generate(self)
                .map_err(|source| BuildError::Generator {
                    name: generator.name().to_string(),
                    source,
                })?;
            info!(
                generator = generator.name(),
                duration_ms = start.elapsed().as_millis() as u64,
                "generator finished"
            );
        }
        self.assign_urls()
    }

    /// Render every document and page that needs regenerating.
    pub fn render(&mut self) -> Result<()> {
        self.check_collisions()?;
        self.stats.documents = self.collections.iter().map(|c| c.docs.len()).sum();
        self.stats.pages = self.pages.len();
        self.stats.static_files = self.static_files.len()
            + self.collections.iter().map(|c| c.files.len()).sum::<usize>();

        let links = self.link_index();
        let mut payload = self.site_payload()?;
        self.trigger(SiteHook::PreRender, Some(&mut payload))?;

        let hooks = self.plugins.hooks().clone();
        let renderer = Renderer {
            converters: &self.converters,
            engine: &*self.engine,
            layouts: &self.layouts,
            regenerator: &self.regenerator,
            cache: &self.cache,
            hooks: &hooks,
            links: &links,
            include_paths: &self.include_paths,
            site_payload: &payload,
            baseurl: &self.baseurl,
        };
        let dest = self.dest.as_path();
        let rendered = AtomicUsize::new(0);
        let skipped = AtomicUsize::new(0);
        let render_one = |item: &mut dyn Renderable| -> Result<()> {
            if self.regenerator.regenerate(&*item, dest, &self.baseurl) {
                renderer.render(item)?;
                rendered.fetch_add(1, Ordering::Relaxed);
            } else {
                debug!(item = %item.relative_path(), "unchanged, skipping");
                skipped.fetch_add(1, Ordering::Relaxed);
            }
            Ok(())
        };

        for collection in &mut self.collections {
            collection
                .docs
                .par_iter_mut()
                .try_for_each(|doc| render_one(doc))?;
        }
        self.pages
            .par_iter_mut()
            .try_for_each(|page| render_one(page))?;

        self.stats.rendered = rendered.into_inner();
        self.stats.skipped = skipped.into_inner();
        info!(
            rendered = self.stats.rendered,
            skipped = self.stats.skipped,
            "render complete"
        );

        self.trigger(SiteHook::PostRender, Some(&mut payload))
    }

    /// Remove destination files no item will produce.
    pub fn cleanup(&mut self) -> Result<()> {
        let outputs: HashSet<PathBuf> = self
            .output_items()
            .map(|item| item.destination(&self.dest, &self.baseurl))
            .collect();
        let removed = cleaner::cleanup(&self.dest, &outputs, &self.config.keep_files)?;
        if !removed.is_empty() {
            info!(count = removed.len(), "removed obsolete files");
        }

        if !self.config.incremental {
            remove_file(self.regenerator.metadata_file())?;
        }
        Ok(())
    }

    /// Write rendered output and copy static files.
    pub fn write(&mut self) -> Result<()> {
        let dest = self.dest.as_path();
        let baseurl = self.baseurl.as_str();
        let regenerator = &self.regenerator;
        let hooks = self.plugins.hooks().clone();
        let written = AtomicUsize::new(0);

        let static_files = self
            .static_files
            .iter()
            .chain(self.collections.iter().flat_map(|c| c.files.iter()))
            .collect::<Vec<_>>();
        static_files.par_iter().try_for_each(|file| -> Result<()> {
            if !file.write() || !regenerator.regenerate(*file, dest, baseurl) {
                return Ok(());
            }
            let target = file.destination(dest, baseurl);
            create_parent(&target)?;
            fs::copy(file.path(), &target).map_err(|source| BuildError::Io {
                path: target.clone(),
                source,
            })?;
            written.fetch_add(1, Ordering::Relaxed);
            Ok(())
        })?;

        let write_one = |item: &mut dyn Renderable| -> Result<()> {
            let Some(output) = item.output().filter(|_| item.write()) else {
                return Ok(());
            };
            let target = item.destination(dest, baseurl);
            create_parent(&target)?;
            fs::write(&target, output).map_err(|source| BuildError::Io {
                path: target.clone(),
                source,
            })?;
            written.fetch_add(1, Ordering::Relaxed);
            trigger_item(&hooks, ItemHook::PostWrite, item)
        };
        for collection in &mut self.collections {
            collection
                .docs
                .par_iter_mut()
                .try_for_each(|doc| write_one(doc))?;
        }
        self.pages
            .par_iter_mut()
            .try_for_each(|page| write_one(page))?;

        self.stats.written = written.into_inner();
        self.regenerator.write_metadata()?;
        self.cache.record_config(&self.config.fingerprint()?)?;
        debug!(written = self.stats.written, "write complete");

        self.trigger(SiteHook::PostWrite, None)
    }

    /// Delete the destination, the regeneration metadata and the cache.
    pub fn clean_all(&mut self) -> Result<()> {
        info!(dest = %self.dest.display(), "cleaning site");
        remove_dir(&self.dest)?;
        remove_file(self.regenerator.metadata_file())?;
        self.regenerator.clear();
        self.cache.clear()?;
        remove_dir(&self.cache_dir)
    }

    /// Assign output extensions and URLs to every document and page.
    pub fn assign_urls(&mut self) -> Result<()> {
        let converters = &self.converters;
        let output_ext = |ext: &str, path: &str| -> Result<String> {
            converters
                .converter_for(ext)
                .map(|c| c.output_ext(ext))
                .map_err(|source| {
                    RenderError::Convert {
                        path: path.to_string(),
                        source,
                    }
                    .into()
                })
        };

        for collection in &mut self.collections {
            let template = collection.url_template(&self.permalink_style);
            for doc in &mut collection.docs {
                let ext = output_ext(doc.extname(), doc.relative_path())?;
                doc.set_output_ext(ext);
                doc.assign_url(&template);
            }
        }
        for page in &mut self.pages {
            let ext = output_ext(page.extname(), page.relative_path())?;
            page.set_output_ext(ext);
            page.assign_url(&self.permalink_style);
        }
        Ok(())
    }

    /// Fail when two items share a destination.
    pub fn check_collisions(&self) -> Result<()> {
        let mut seen: HashMap<PathBuf, &str> = HashMap::new();
        for item in self.output_items() {
            let destination = item.destination(&self.dest, &self.baseurl);
            if let Some(first) = seen.insert(destination.clone(), item.relative_path()) {
                return Err(BuildError::Collision {
                    destination,
                    first: first.to_string(),
                    second: item.relative_path().to_string(),
                });
            }
        }
        Ok(())
    }

    /// The `site` payload exposed to templates.
    pub fn site_payload(&self) -> Result<Value> {
        let mut site = match self.config.to_value()? {
            Value::Mapping(map) => map,
            _ => Mapping::new(),
        };
        site.insert("baseurl".into(), self.baseurl.clone().into());
        site.insert("time".into(), self.time.format(DATE_FORMAT).to_string().into());
        site.insert("data".into(), Value::Mapping(self.data.clone()));
        site.insert(
            "pages".into(),
            Value::Sequence(self.pages.iter().map(Renderable::to_value).collect()),
        );

        let mut collections = Vec::new();
        let mut documents = Vec::new();
        for collection in &self.collections {
            let docs: Vec<Value> = collection.docs.iter().map(Renderable::to_value).collect();
            if collection.is_posts() {
                site.insert(
                    "posts".into(),
                    Value::Sequence(docs.iter().rev().cloned().collect()),
                );
            } else {
                site.insert(collection.label().into(), Value::Sequence(docs.clone()));
            }
            let mut value = collection.to_value();
            if let Value::Mapping(map) = &mut value {
                map.insert("docs".into(), Value::Sequence(docs.clone()));
            }
            collections.push(value);
            documents.extend(docs);
        }
        site.insert("collections".into(), Value::Sequence(collections));
        site.insert("documents".into(), Value::Sequence(documents));

        let static_files = self
            .static_files
            .iter()
            .map(|file| {
                let mut map = Mapping::new();
                map.insert("path".into(), file.relative_path().into());
                map.insert("url".into(), file.url().into());
                map.insert("extname".into(), file.extname().into());
                Value::Mapping(map)
            })
            .collect();
        site.insert("static_files".into(), Value::Sequence(static_files));

        Ok(Value::Mapping(site))
    }

    fn link_index(&self) -> LinkIndex {
        let mut links = LinkIndex::new();
        for collection in &self.collections {
            for doc in &collection.docs {
                links.insert(doc);
                if collection.is_posts() {
                    links.insert_post(doc);
                }
            }
            for file in &collection.files {
                links.insert(file);
            }
        }
        for page in &self.pages {
            links.insert(page);
        }
        for file in &self.static_files {
            links.insert(file);
        }
        links
    }

    /// Every item that is written to the destination.
    fn output_items(&self) -> impl Iterator<Item = &dyn SiteFile> {
        let docs = self
            .collections
            .iter()
            .flat_map(|c| c.docs.iter().map(|d| d as &dyn SiteFile));
        let files = self
            .collections
            .iter()
            .flat_map(|c| c.files.iter().map(|f| f as &dyn SiteFile));
        let pages = self.pages.iter().map(|p| p as &dyn SiteFile);
        let statics = self.static_files.iter().map(|f| f as &dyn SiteFile);
        docs.chain(files)
            .chain(pages)
            .chain(statics)
            .filter(|item| item.write())
    }

    fn trigger(&mut self, point: SiteHook, mut payload: Option<&mut Value>) -> Result<()> {
        let callbacks = self.plugins.hooks().site_callbacks(point).to_vec();
        for callback in callbacks {
            callback(self, payload.as_deref_mut())?;
        }
        Ok(())
    }

    /// Absolute source directory.
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Absolute destination directory.
    pub fn dest(&self) -> &Path {
        &self.dest
    }

    /// The configuration snapshot.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Normalized `baseurl`.
    pub fn baseurl(&self) -> &str {
        &self.baseurl
    }

    /// Permalink style in effect.
    pub fn permalink_style(&self) -> &PermalinkStyle {
        &self.permalink_style
    }

    /// Directory of the persisted cache.
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Directories searched for plugin files.
    pub fn plugin_paths(&self) -> &[PathBuf] {
        &self.plugin_paths
    }

    /// Directories searched by `include`.
    pub fn include_paths(&self) -> &[PathBuf] {
        &self.include_paths
    }

    /// Build time exposed as `site.time`.
    pub fn time(&self) -> NaiveDateTime {
        self.time
    }

    /// Layouts by name.
    pub fn layouts(&self) -> &BTreeMap<String, Layout> {
        &self.layouts
    }

    /// Data read from the data directory.
    pub fn data(&self) -> &Mapping {
        &self.data
    }

    /// Collections in configuration order.
    pub fn collections(&self) -> &[Collection] {
        &self.collections
    }

    /// A collection by label.
    pub fn collection(&self, label: &str) -> Option<&Collection> {
        self.collections.iter().find(|c| c.label() == label)
    }

    /// A collection by label, mutably.
    pub fn collection_mut(&mut self, label: &str) -> Option<&mut Collection> {
        self.collections.iter_mut().find(|c| c.label() == label)
    }

    /// Pages outside collections.
    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    /// Pages outside collections, for generators to extend.
    pub fn pages_mut(&mut self) -> &mut Vec<Page> {
        &mut self.pages
    }

    /// Static files outside collections.
    pub fn static_files(&self) -> &[StaticFile] {
        &self.static_files
    }

    /// Converter registry.
    pub fn converters(&self) -> &ConverterRegistry {
        &self.converters
    }

    /// The site's cache.
    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    /// The site's regenerator.
    pub fn regenerator(&self) -> &Regenerator {
        &self.regenerator
    }

    /// Statistics of the last build.
    pub fn stats(&self) -> &BuildStats {
        &self.stats
    }
}

fn trigger_item(hooks: &Hooks, point: ItemHook, item: &mut dyn Renderable) -> Result<()> {
    let path = item.relative_path().to_string();
    hooks
        .trigger_item(point, item)
        .map_err(|source| RenderError::Hook { path, source }.into())
}

fn absolute(path: &Path) -> Result<PathBuf> {
    std::path::absolute(path).map_err(|e| CoreError::io_at(path, e).into())
}

fn create_parent(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) => fs::create_dir_all(parent).map_err(|source| BuildError::Io {
            path: parent.to_path_buf(),
            source,
        }),
        None => Ok(()),
    }
}

fn remove_file(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(BuildError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn remove_dir(path: &Path) -> Result<()> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(BuildError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

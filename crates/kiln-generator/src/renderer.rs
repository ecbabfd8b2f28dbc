//! Rendering of documents and pages.
//!
//! An item is templated against the payload, converted, then wrapped in its
//! layout chain. Cross-references and layouts record dependency edges with
//! the regenerator so incremental builds know what to rebuild.

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    fs,
    path::{Component, Path, PathBuf},
};

use kiln_core::{Renderable, SiteFile};
use kiln_parser::{ConvertError, ConverterRegistry};
use serde_yaml::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::{
    cache::{CacheError, CacheStore, digest},
    hooks::{HookError, Hooks, ItemHook},
    reader::Layout,
    regenerator::Regenerator,
    template::{Payload, TemplateEngine, TemplateError, TemplateScope},
};

/// Layout chains longer than this are treated as a cycle.
const MAX_LAYOUT_DEPTH: usize = 32;

/// Render errors, each naming the item being rendered.
#[derive(Debug, Error)]
pub enum RenderError {
    /// Template evaluation failed.
    #[error("failed to render {path}: {source}")]
    Template {
        /// Item relative path.
        path: String,
        /// Underlying error.
        source: TemplateError,
    },

    /// No usable converter or conversion failed.
    #[error("failed to convert {path}: {source}")]
    Convert {
        /// Item relative path.
        path: String,
        /// Underlying error.
        source: ConvertError,
    },

    /// A hook callback failed.
    #[error("hook failed for {path}: {source}")]
    Hook {
        /// Item relative path.
        path: String,
        /// Underlying error.
        source: HookError,
    },

    /// The conversion cache failed.
    #[error(transparent)]
    Cache(#[from] CacheError),
}

impl RenderError {
    /// Whether the error is an unresolved reference or converter lookup.
    pub fn is_lookup(&self) -> bool {
        match self {
            Self::Template { source, .. } => source.is_lookup(),
            Self::Convert { source, .. } => matches!(
                source,
                ConvertError::Lookup(_) | ConvertError::NoMatch(_) | ConvertError::Ambiguous { .. }
            ),
            _ => false,
        }
    }
}

/// Result type for render operations.
pub type Result<T> = std::result::Result<T, RenderError>;

/// A resolved cross-reference target.
#[derive(Debug, Clone)]
pub struct LinkTarget {
    /// URL without `baseurl`.
    pub url: String,
    /// Source file, recorded as a dependency.
    pub source: Option<PathBuf>,
}

/// Lookup tables for `link` and `post_url`.
#[derive(Debug, Clone, Default)]
pub struct LinkIndex {
    by_path: HashMap<String, LinkTarget>,
    posts: HashMap<String, LinkTarget>,
}

impl LinkIndex {
    /// An empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an item under its relative path.
    pub fn insert(&mut self, item: &dyn SiteFile) {
        self.by_path.insert(
            item.relative_path().to_string(),
            LinkTarget {
                url: item.url().to_string(),
                source: item.source_path().map(Path::to_path_buf),
            },
        );
    }

    /// Register a post under its file stem, e.g. `2024-01-14-hello`.
    pub fn insert_post(&mut self, item: &dyn SiteFile) {
        let relative = item.relative_path();
        let name = relative.rsplit('/').next().unwrap_or(relative);
        let stem = name.rfind('.').map_or(name, |idx| &name[..idx]);
        self.posts.insert(
            stem.to_string(),
            LinkTarget {
                url: item.url().to_string(),
                source: item.source_path().map(Path::to_path_buf),
            },
        );
    }

    /// Target of a relative source path.
    pub fn path(&self, path: &str) -> Option<&LinkTarget> {
        self.by_path.get(path.trim_start_matches('/'))
    }

    /// Target of a post name.
    pub fn post(&self, name: &str) -> Option<&LinkTarget> {
        self.posts.get(name)
    }

    /// Number of registered paths.
    pub fn len(&self) -> usize {
        self.by_path.len()
    }

    /// Whether the index is empty.
    pub fn is_empty(&self) -> bool {
        self.by_path.is_empty()
    }
}

/// Shared, read-only state for one render phase.
pub struct Renderer<'a> {
    /// Converter registry.
    pub converters: &'a ConverterRegistry,
    /// Template engine.
    pub engine: &'a dyn TemplateEngine,
    /// Layouts by name.
    pub layouts: &'a BTreeMap<String, Layout>,
    /// Dependency tracking.
    pub regenerator: &'a Regenerator,
    /// Conversion cache.
    pub cache: &'a CacheStore,
    /// Item hooks.
    pub hooks: &'a Hooks,
    /// Cross-reference targets.
    pub links: &'a LinkIndex,
    /// Directories searched by `include`.
    pub include_paths: &'a [PathBuf],
    /// The `site` payload.
    pub site_payload: &'a Value,
    /// Normalized `baseurl`.
    pub baseurl: &'a str,
}

impl std::fmt::Debug for Renderer<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Renderer")
            .field("converters", self.converters)
            .field("layouts", &self.layouts.keys().collect::<Vec<_>>())
            .field("links", &self.links.len())
            .field("include_paths", &self.include_paths)
            .field("baseurl", &self.baseurl)
            .finish()
    }
}

impl Renderer<'_> {
    /// Render one item, storing its output.
    pub fn render(&self, item: &mut dyn Renderable) -> Result<()> {
        let path = item.relative_path().to_string();
        debug!(item = %path, "rendering");

        self.trigger(ItemHook::PreRender, item, &path)?;

        let scope = RenderScope {
            renderer: self,
            dependent: item.source_path().map(Path::to_path_buf),
        };
        let page = item.to_value();

        let mut payload = Payload::new(self.site_payload, page);
        let templated = self
            .engine
            .render(&path, item.content(), &payload, &scope)
            .map_err(|source| RenderError::Template {
                path: path.clone(),
                source,
            })?;

        let converted = self.convert(item.extname(), &templated, &path)?;
        item.set_output(converted);
        self.trigger(ItemHook::PostConvert, item, &path)?;

        let mut output = item.output().unwrap_or_default().to_string();
        if item.is_html() {
            output = self.place_in_layouts(item, output, &mut payload, &scope)?;
        }
        item.set_output(output);

        self.trigger(ItemHook::PostRender, item, &path)
    }

    fn trigger(&self, point: ItemHook, item: &mut dyn Renderable, path: &str) -> Result<()> {
        self.hooks
            .trigger_item(point, item)
            .map_err(|source| RenderError::Hook {
                path: path.to_string(),
                source,
            })
    }

    /// Convert `content`, memoized by converter and content digest.
    fn convert(&self, ext: &str, content: &str, path: &str) -> Result<String> {
        let converter = self
            .converters
            .converter_for(ext)
            .map_err(|source| RenderError::Convert {
                path: path.to_string(),
                source,
            })?;
        self.cache
            .namespace(converter.name())
            .getset(&digest(content), || {
                converter
                    .convert(content)
                    .map_err(|source| RenderError::Convert {
                        path: path.to_string(),
                        source,
                    })
            })
    }

    fn place_in_layouts(
        &self,
        item: &dyn Renderable,
        mut output: String,
        payload: &mut Payload<'_>,
        scope: &RenderScope<'_>,
    ) -> Result<String> {
        let mut used = HashSet::new();
        let mut next = item.layout();

        while let Some(name) = next {
            let Some(layout) = self.layouts.get(&name) else {
                warn!(
                    layout = %name,
                    item = %item.relative_path(),
                    "requested layout does not exist"
                );
                break;
            };
            if !used.insert(name.clone()) || used.len() > MAX_LAYOUT_DEPTH {
                warn!(layout = %name, item = %item.relative_path(), "layout cycle");
                break;
            }

            if let Some(source) = item.source_path() {
                self.regenerator.add_dependency(source, &layout.path);
            }

            payload.layout = Some(Value::Mapping(layout.data.as_mapping().clone()));
            payload.content = Some(Value::String(output));
            output = self
                .engine
                .render(&layout.relative_path, &layout.content, payload, scope)
                .map_err(|source| RenderError::Template {
                    path: item.relative_path().to_string(),
                    source,
                })?;

            next = layout
                .data
                .get_str("layout")
                .filter(|parent| !parent.is_empty() && parent != "none");
        }
        Ok(output)
    }
}

/// Cross-reference resolution for one item.
struct RenderScope<'a> {
    renderer: &'a Renderer<'a>,
    dependent: Option<PathBuf>,
}

impl RenderScope<'_> {
    fn depend_on(&self, dependency: Option<&Path>) {
        if let (Some(dependent), Some(dependency)) = (&self.dependent, dependency) {
            self.renderer.regenerator.add_dependency(dependent, dependency);
        }
    }

    fn resolve(&self, target: Option<&LinkTarget>) -> Option<String> {
        let target = target?;
        self.depend_on(target.source.as_deref());
        Some(format!("{}{}", self.renderer.baseurl, target.url))
    }
}

impl TemplateScope for RenderScope<'_> {
    fn link(&self, path: &str) -> Option<String> {
        self.resolve(self.renderer.links.path(path))
    }

    fn post_url(&self, name: &str) -> Option<String> {
        self.resolve(self.renderer.links.post(name))
    }

    fn include(&self, name: &str) -> Option<String> {
        let relative = Path::new(name);
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            warn!(include = %name, "include paths must stay inside the include directory");
            return None;
        }
        self.renderer.include_paths.iter().find_map(|dir| {
            let path = dir.join(relative);
            let content = fs::read_to_string(&path).ok()?;
            self.depend_on(Some(&path));
            Some(content)
        })
    }
}

//! Kiln Generator Library
//!
//! Build engine for Kiln sites.
//!
//! # Modules
//!
//! - [`site`] - Build orchestration
//! - [`reader`] - Reading layouts, data, collections, pages and static files
//! - [`renderer`] - Templating, conversion and layout wrapping
//! - [`template`] - Template engine capability and the built-in engine
//! - [`regenerator`] - Incremental regeneration metadata
//! - [`cache`] - Memoization store with optional disk persistence
//! - [`cleaner`] - Removal of obsolete destination files
//! - [`plugin`] - Generator trait and plugin registry
//! - [`hooks`] - Lifecycle callbacks
//! - [`sitemap`] - XML sitemap generator

pub mod cache;
pub mod cleaner;
pub mod hooks;
pub mod plugin;
pub mod reader;
pub mod regenerator;
pub mod renderer;
pub mod site;
pub mod sitemap;
pub mod template;

pub use cache::{Cache, CacheStore};
pub use hooks::{HookError, Hooks, ItemHook, SiteHook};
pub use plugin::{Generator, PluginError, Plugins};
pub use reader::Layout;
pub use regenerator::Regenerator;
pub use renderer::{LinkIndex, Renderer};
pub use site::{BuildError, BuildStats, ErrorKind, Site};
pub use sitemap::SitemapGenerator;
pub use template::{Payload, SimpleEngine, TemplateEngine, TemplateScope};

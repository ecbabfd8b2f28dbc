//! Explicit plugin registration.
//!
//! A [`Plugins`] value collects extra converters, generators, hook
//! callbacks and an optional template engine, and is handed to
//! [`Site::with_plugins`]. Nothing is registered globally.

use std::sync::Arc;

use kiln_parser::{Converter, Priority};
use thiserror::Error;

use crate::{hooks::Hooks, site::Site, template::TemplateEngine};

/// Error returned by a generator.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct PluginError {
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl PluginError {
    /// Create a plugin error.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Create a plugin error wrapping its cause.
    pub fn with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

impl From<std::io::Error> for PluginError {
    fn from(e: std::io::Error) -> Self {
        Self::with_source("IO error", e)
    }
}

/// Result type for generators.
pub type Result<T> = std::result::Result<T, PluginError>;

/// Produces additional content after the site is read.
pub trait Generator: Send + Sync {
    /// Name used in logs and errors.
    fn name(&self) -> &str;

    /// Generators with higher priority run first.
    fn priority(&self) -> Priority {
        Priority::Normal
    }

    /// Whether the generator may run in safe mode.
    fn safe(&self) -> bool {
        false
    }

    /// Mutate the site, typically by adding pages.
    fn generate(&self, site: &mut Site) -> Result<()>;
}

/// Converters, generators and hooks registered for one site.
#[derive(Clone, Default)]
pub struct Plugins {
    converters: Vec<Arc<dyn Converter>>,
    generators: Vec<Arc<dyn Generator>>,
    hooks: Hooks,
    engine: Option<Arc<dyn TemplateEngine>>,
}

impl std::fmt::Debug for Plugins {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Plugins")
            .field(
                "converters",
                &self.converters.iter().map(|c| c.name()).collect::<Vec<_>>(),
            )
            .field(
                "generators",
                &self.generators.iter().map(|g| g.name()).collect::<Vec<_>>(),
            )
            .field("hooks", &self.hooks)
            .field("custom_engine", &self.engine.is_some())
            .finish()
    }
}

impl Plugins {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a converter next to the built-in ones.
    #[must_use]
    pub fn with_converter(mut self, converter: impl Converter + 'static) -> Self {
        self.converters.push(Arc::new(converter));
        self
    }

    /// Add a generator.
    #[must_use]
    pub fn with_generator(mut self, generator: impl Generator + 'static) -> Self {
        self.generators.push(Arc::new(generator));
        self
    }

    /// Replace the built-in template engine.
    #[must_use]
    pub fn with_engine(mut self, engine: impl TemplateEngine + 'static) -> Self {
        self.engine = Some(Arc::new(engine));
        self
    }

    /// The custom template engine, if any.
    pub fn engine(&self) -> Option<Arc<dyn TemplateEngine>> {
        self.engine.clone()
    }

    /// Hook registry, for adding callbacks.
    pub fn hooks_mut(&mut self) -> &mut Hooks {
        &mut self.hooks
    }

    /// Registered hooks.
    pub fn hooks(&self) -> &Hooks {
        &self.hooks
    }

    /// Extra converters in registration order.
    pub fn converters(&self) -> &[Arc<dyn Converter>] {
        &self.converters
    }

    /// Generators in run order: by priority, highest first, then by
    /// registration order. In safe mode only safe generators are kept.
    pub fn generators(&self, safe: bool) -> Vec<Arc<dyn Generator>> {
        let mut generators: Vec<_> = self
            .generators
            .iter()
            .filter(|g| !safe || g.safe())
            .cloned()
            .collect();
        generators.sort_by_key(|g| std::cmp::Reverse(g.priority()));
        generators
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named(&'static str, Priority, bool);

    impl Generator for Named {
        fn name(&self) -> &str {
            self.0
        }

        fn priority(&self) -> Priority {
            self.1
        }

        fn safe(&self) -> bool {
            self.2
        }

        fn generate(&self, _site: &mut Site) -> Result<()> {
            Ok(())
        }
    }

    fn names(generators: &[Arc<dyn Generator>]) -> Vec<&str> {
        generators.iter().map(|g| g.name()).collect()
    }

    #[test]
    fn test_generator_order() {
        let plugins = Plugins::new()
            .with_generator(Named("a", Priority::Normal, false))
            .with_generator(Named("b", Priority::High, true))
            .with_generator(Named("c", Priority::Normal, true))
            .with_generator(Named("d", Priority::Lowest, true));

        assert_eq!(names(&plugins.generators(false)), vec!["b", "a", "c", "d"]);
        assert_eq!(names(&plugins.generators(true)), vec!["b", "c", "d"]);
    }

    #[test]
    fn test_plugin_error_source() {
        let io = std::io::Error::other("disk full");
        let err = PluginError::from(io);
        assert_eq!(err.to_string(), "IO error");
        assert!(std::error::Error::source(&err).is_some());
    }
}

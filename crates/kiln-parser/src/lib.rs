//! Kiln Parser Library
//!
//! Converters turn raw content into output markup. They are registered in
//! an explicit, ordered [`ConverterRegistry`]; each item picks exactly one
//! converter from its source extension.

pub mod identity;
pub mod markdown;

use std::sync::Arc;

pub use identity::IdentityConverter;
pub use markdown::MarkdownConverter;
use thiserror::Error;

/// Converter errors.
#[derive(Debug, Error)]
pub enum ConvertError {
    /// No converter with the requested name, or more than one.
    #[error("no converter for class {0}")]
    Lookup(String),

    /// No converter claims the extension.
    #[error("no converter matches extension `{0}`")]
    NoMatch(String),

    /// Several converters claim the extension at the same top priority.
    #[error("converters {names:?} all claim `{ext}` at the same priority")]
    Ambiguous {
        /// Extension being converted.
        ext: String,
        /// Names of the tied converters.
        names: Vec<String>,
    },

    /// A converter failed on its input.
    #[error("{converter} failed: {message}")]
    Failed {
        /// Converter name.
        converter: String,
        /// What went wrong.
        message: String,
    },
}

/// Result type for converter operations.
pub type Result<T> = std::result::Result<T, ConvertError>;

/// Ordering weight of a converter or generator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    /// Runs last, used by fallbacks.
    Lowest,
    /// Below normal.
    Low,
    /// The default.
    #[default]
    Normal,
    /// Above normal.
    High,
    /// Wins over everything else.
    Highest,
}

/// A pluggable content transformer.
pub trait Converter: Send + Sync {
    /// Unique name, used by [`ConverterRegistry::converter_named`].
    fn name(&self) -> &str;

    /// Priority among converters claiming the same extension.
    fn priority(&self) -> Priority {
        Priority::Normal
    }

    /// Whether this converter claims the extension (with leading dot).
    fn matches(&self, ext: &str) -> bool;

    /// Extension of the converted output for a given input extension.
    fn output_ext(&self, ext: &str) -> String;

    /// Convert raw content.
    fn convert(&self, content: &str) -> Result<String>;
}

/// Explicit, ordered list of converters.
#[derive(Clone, Default)]
pub struct ConverterRegistry {
    converters: Vec<Arc<dyn Converter>>,
}

impl std::fmt::Debug for ConverterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.converters.iter().map(|c| c.name()))
            .finish()
    }
}

impl ConverterRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the markdown converter and the identity fallback.
    pub fn with_defaults(markdown_extensions: Vec<String>) -> Self {
        let mut registry = Self::new();
        registry.register(MarkdownConverter::new(markdown_extensions));
        registry.register(IdentityConverter);
        registry
    }

    /// Append a converter.
    pub fn register(&mut self, converter: impl Converter + 'static) {
        self.register_shared(Arc::new(converter));
    }

    /// Append a converter that is shared with other registries.
    pub fn register_shared(&mut self, converter: Arc<dyn Converter>) {
        tracing::debug!(
            name = converter.name(),
            priority = ?converter.priority(),
            "registered converter"
        );
        self.converters.push(converter);
    }

    /// Number of registered converters.
    pub fn len(&self) -> usize {
        self.converters.len()
    }

    /// Whether no converter is registered.
    pub fn is_empty(&self) -> bool {
        self.converters.is_empty()
    }

    /// Registered converters in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &dyn Converter> {
        self.converters.iter().map(|c| &**c)
    }

    /// The single converter registered under `name`.
    pub fn converter_named(&self, name: &str) -> Result<&dyn Converter> {
        let mut found = self.iter().filter(|c| c.name() == name);
        match (found.next(), found.next()) {
            (Some(converter), None) => Ok(converter),
            _ => Err(ConvertError::Lookup(name.to_string())),
        }
    }

    /// The converter for a source extension: the highest-priority claimant.
    pub fn converter_for(&self, ext: &str) -> Result<&dyn Converter> {
        let claimants: Vec<&dyn Converter> = self.iter().filter(|c| c.matches(ext)).collect();
        let top = claimants
            .iter()
            .map(|c| c.priority())
            .max()
            .ok_or_else(|| ConvertError::NoMatch(ext.to_string()))?;

        let winners: Vec<&dyn Converter> = claimants
            .into_iter()
            .filter(|c| c.priority() == top)
            .collect();
        match winners.as_slice() {
            [single] => Ok(*single),
            tied => Err(ConvertError::Ambiguous {
                ext: ext.to_string(),
                names: tied.iter().map(|c| c.name().to_string()).collect(),
            }),
        }
    }
}

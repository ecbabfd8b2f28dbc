//! Site configuration management.

use std::{collections::BTreeMap, path::Path};

use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};

use crate::{
    collection::CollectionConfig,
    error::{CoreError, Result},
    url::{PermalinkStyle, normalize_baseurl},
};

/// Configuration file names searched in the source directory, in order.
pub const CONFIG_FILES: &[&str] = &["_config.yml", "_config.yaml", "_config.toml"];

/// Label of the collection that `limit_posts` and date permalinks apply to.
pub const POSTS: &str = "posts";

/// Main configuration structure for Kiln.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Source directory, relative to the working directory.
    #[serde(default = "default_source")]
    pub source: String,

    /// Destination directory, relative to the working directory.
    #[serde(default = "default_destination")]
    pub destination: String,

    /// Directory holding `_<label>` collection directories.
    #[serde(default)]
    pub collections_dir: String,

    /// Directory for plugin files.
    #[serde(default = "default_plugins_dir")]
    pub plugins_dir: String,

    /// Directory for layouts.
    #[serde(default = "default_layouts_dir")]
    pub layouts_dir: String,

    /// Directory for data files.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Directory for include files.
    #[serde(default = "default_includes_dir")]
    pub includes_dir: String,

    /// Directory for the persisted cache.
    #[serde(default = "default_cache_dir")]
    pub cache_dir: String,

    /// Raw collections setting: a mapping, a list of labels, or absent.
    #[serde(default)]
    pub collections: Option<Value>,

    /// Restricted mode: no disk cache, only safe plugins.
    #[serde(default)]
    pub safe: bool,

    /// Disable the on-disk cache even outside safe mode.
    #[serde(default)]
    pub disable_disk_cache: bool,

    /// Only rebuild what changed since the last build.
    #[serde(default)]
    pub incremental: bool,

    /// Ignore persisted regeneration metadata for this run.
    #[serde(default)]
    pub full_rebuild: bool,

    /// Entries read even though they start with `.` or `_`.
    #[serde(default = "default_include")]
    pub include: Vec<String>,

    /// Entries never read.
    #[serde(default = "default_exclude")]
    pub exclude: Vec<String>,

    /// Destination entries the cleaner must keep.
    #[serde(default = "default_keep_files")]
    pub keep_files: Vec<String>,

    /// Encoding used to read source files.
    #[serde(default = "default_encoding")]
    pub encoding: String,

    /// Comma-separated markdown extensions.
    #[serde(default = "default_markdown_ext")]
    pub markdown_ext: String,

    /// Keep only the N most recent posts; 0 disables.
    #[serde(default)]
    pub limit_posts: i64,

    /// Publish posts dated in the future.
    #[serde(default)]
    pub future: bool,

    /// Render documents marked `published: false`.
    #[serde(default)]
    pub unpublished: bool,

    /// Read the `_drafts` directory.
    #[serde(default)]
    pub show_drafts: bool,

    /// Permalink style name or template.
    #[serde(default = "default_permalink")]
    pub permalink: String,

    /// Path prefix the site is served under.
    #[serde(default)]
    pub baseurl: String,

    /// Absolute site URL, e.g. `https://example.com`.
    #[serde(default)]
    pub url: String,

    /// Site title.
    #[serde(default)]
    pub title: String,

    /// Front matter defaults by scope.
    #[serde(default)]
    pub defaults: Vec<FrontMatterDefault>,

    /// Any other key, exposed to templates under `site`.
    #[serde(default, flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// A front matter default applied to every item in scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrontMatterDefault {
    /// Where the values apply.
    #[serde(default)]
    pub scope: DefaultScope,

    /// Values merged under explicit front matter.
    #[serde(default)]
    pub values: Mapping,
}

/// Scope of a front matter default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DefaultScope {
    /// Relative path prefix; empty matches everything.
    #[serde(default)]
    pub path: String,

    /// Collection label, or `pages`.
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}

// Default value functions
fn default_source() -> String {
    ".".to_string()
}

fn default_destination() -> String {
    "_site".to_string()
}

fn default_plugins_dir() -> String {
    "_plugins".to_string()
}

fn default_layouts_dir() -> String {
    "_layouts".to_string()
}

fn default_data_dir() -> String {
    "_data".to_string()
}

fn default_includes_dir() -> String {
    "_includes".to_string()
}

fn default_cache_dir() -> String {
    ".kiln-cache".to_string()
}

fn default_include() -> Vec<String> {
    vec![".htaccess".to_string()]
}

fn default_exclude() -> Vec<String> {
    [
        ".kiln-cache",
        ".kiln-metadata",
        "node_modules",
        "vendor",
        "target",
        "Cargo.toml",
        "Cargo.lock",
    ]
    .iter()
    .map(|s| (*s).to_string())
    .collect()
}

fn default_keep_files() -> Vec<String> {
    vec![".git".to_string(), ".svn".to_string()]
}

fn default_encoding() -> String {
    "utf-8".to_string()
}

fn default_markdown_ext() -> String {
    "markdown,mkdown,mkdn,mkd,md".to_string()
}

fn default_permalink() -> String {
    "date".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source: default_source(),
            destination: default_destination(),
            collections_dir: String::new(),
            plugins_dir: default_plugins_dir(),
            layouts_dir: default_layouts_dir(),
            data_dir: default_data_dir(),
            includes_dir: default_includes_dir(),
            cache_dir: default_cache_dir(),
            collections: None,
            safe: false,
            disable_disk_cache: false,
            incremental: false,
            full_rebuild: false,
            include: default_include(),
            exclude: default_exclude(),
            keep_files: default_keep_files(),
            encoding: default_encoding(),
            markdown_ext: default_markdown_ext(),
            limit_posts: 0,
            future: false,
            unpublished: false,
            show_drafts: false,
            permalink: default_permalink(),
            baseurl: String::new(),
            url: String::new(),
            title: String::new(),
            defaults: Vec::new(),
            extra: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML or TOML file with `KILN__` environment
    /// overrides.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(CoreError::config(format!(
                "Configuration file not found: {}",
                path.display()
            )));
        }

        let settings = config::Config::builder()
            .add_source(config::File::from(path))
            .add_source(config::Environment::with_prefix("KILN").separator("__"))
            .build()
            .map_err(|e| {
                CoreError::config_with_source(
                    format!("Failed to parse config file: {}", path.display()),
                    e,
                )
            })?;

        let config: Config = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load the first configuration file found in `dir`, or the defaults.
    pub fn discover(dir: &Path) -> Result<Self> {
        for name in CONFIG_FILES {
            let candidate = dir.join(name);
            if candidate.is_file() {
                tracing::debug!(path = %candidate.display(), "loading configuration");
                return Self::load(&candidate);
            }
        }
        tracing::debug!(dir = %dir.display(), "no configuration file, using defaults");
        Ok(Self::default())
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        self.collections_config()?;

        if self.permalink.trim().is_empty() {
            return Err(CoreError::config("permalink cannot be empty"));
        }

        if self.baseurl.len() > 1 && self.baseurl.ends_with('/') {
            tracing::warn!("baseurl should not have a trailing slash");
        }

        Ok(())
    }

    /// The parsed permalink style.
    pub fn permalink_style(&self) -> PermalinkStyle {
        PermalinkStyle::parse(&self.permalink)
    }

    /// The normalized `baseurl` (`""` or `/prefix`).
    pub fn baseurl(&self) -> String {
        normalize_baseurl(&self.baseurl)
    }

    /// Markdown extensions with a leading dot, lowercased.
    pub fn markdown_extensions(&self) -> Vec<String> {
        self.markdown_ext
            .split(',')
            .map(str::trim)
            .filter(|ext| !ext.is_empty())
            .map(|ext| format!(".{}", ext.trim_start_matches('.').to_lowercase()))
            .collect()
    }

    /// Whether the on-disk cache may be used.
    pub fn disk_cache_enabled(&self) -> bool {
        !self.safe && !self.disable_disk_cache
    }

    /// Resolve the `collections` setting into labelled options.
    ///
    /// Accepts a mapping of label to options, a list of labels, or nothing.
    /// The `posts` collection always exists and always has output enabled.
    pub fn collections_config(&self) -> Result<Vec<(String, CollectionConfig)>> {
        let mut resolved: Vec<(String, CollectionConfig)> = Vec::new();

        match &self.collections {
            None | Some(Value::Null) => {}
            Some(Value::Mapping(mapping)) => {
                for (key, options) in mapping {
                    let label = key.as_str().ok_or_else(|| {
                        CoreError::config("collection labels must be strings")
                    })?;
                    let options = match options {
                        Value::Null => CollectionConfig::default(),
                        other => serde_yaml::from_value(other.clone()).map_err(|e| {
                            CoreError::config_with_source(
                                format!("invalid options for collection `{label}`"),
                                e,
                            )
                        })?,
                    };
                    resolved.push((label.to_string(), options));
                }
            }
            Some(Value::Sequence(labels)) => {
                for label in labels {
                    let label = label.as_str().ok_or_else(|| {
                        CoreError::config("collection labels must be strings")
                    })?;
                    resolved.push((label.to_string(), CollectionConfig::default()));
                }
            }
            Some(_) => {
                return Err(CoreError::config(
                    "Your `collections` key must be a mapping or a list.",
                ));
            }
        }

        match resolved.iter_mut().find(|(label, _)| label == POSTS) {
            Some((_, posts)) => posts.output = true,
            None => resolved.insert(
                0,
                (
                    POSTS.to_string(),
                    CollectionConfig {
                        output: true,
                        ..CollectionConfig::default()
                    },
                ),
            ),
        }

        Ok(resolved)
    }

    /// Front matter defaults that apply to an item.
    pub fn defaults_for(&self, relative_path: &str, kind: &str) -> Mapping {
        let mut merged = Mapping::new();
        for default in &self.defaults {
            let path_matches = default.scope.path.is_empty()
                || relative_path.starts_with(default.scope.path.trim_start_matches("./"));
            let kind_matches = default.scope.kind.as_deref().is_none_or(|k| k == kind);
            if path_matches && kind_matches {
                for (key, value) in &default.values {
                    merged.insert(key.clone(), value.clone());
                }
            }
        }
        merged
    }

    /// Canonical serialization used to detect configuration changes.
    pub fn fingerprint(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Configuration values exposed to templates under `site`.
    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_yaml::to_value(self)?)
    }
}

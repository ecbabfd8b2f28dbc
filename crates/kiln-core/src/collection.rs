//! Collections: named, ordered groups of documents.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};

use crate::{
    config::POSTS,
    document::Document,
    item::Renderable,
    static_file::StaticFile,
    url::{PermalinkStyle, resolve_template},
};

/// Per-collection options from the `collections` setting.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectionConfig {
    /// Whether the collection's documents are written.
    #[serde(default)]
    pub output: bool,

    /// Permalink style name or template for documents.
    #[serde(default)]
    pub permalink: Option<String>,

    /// Front matter key to order documents by.
    #[serde(default)]
    pub sort_by: Option<String>,

    /// Extra keys, exposed to templates.
    #[serde(default, flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// A named group of documents and static files.
#[derive(Debug, Clone)]
pub struct Collection {
    label: String,
    config: CollectionConfig,
    directory: PathBuf,
    relative_directory: String,
    /// Documents in sort order.
    pub docs: Vec<Document>,
    /// Non-document files found in the collection directory.
    pub files: Vec<StaticFile>,
}

impl Collection {
    /// Create an empty collection rooted at `<source>/<collections_dir>/_<label>`.
    pub fn new(
        label: impl Into<String>,
        config: CollectionConfig,
        source: &Path,
        collections_dir: &str,
    ) -> Self {
        let label = label.into();
        let collections_dir = collections_dir.trim_matches('/');
        let relative_directory = if collections_dir.is_empty() {
            format!("_{label}")
        } else {
            format!("{collections_dir}/_{label}")
        };
        Self {
            directory: source.join(&relative_directory),
            relative_directory,
            label,
            config,
            docs: Vec::new(),
            files: Vec::new(),
        }
    }

    /// The collection label.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Collection options.
    pub fn config(&self) -> &CollectionConfig {
        &self.config
    }

    /// Absolute directory.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Directory relative to the site source.
    pub fn relative_directory(&self) -> &str {
        &self.relative_directory
    }

    /// Whether this is the posts collection.
    pub fn is_posts(&self) -> bool {
        self.label == POSTS
    }

    /// Whether documents of this collection are written.
    pub fn write(&self) -> bool {
        self.config.output
    }

    /// URL template for documents of this collection.
    pub fn url_template(&self, style: &PermalinkStyle) -> String {
        if let Some(permalink) = &self.config.permalink {
            return resolve_template(permalink);
        }
        if self.is_posts() {
            return style.post_template();
        }
        style.add_suffix("/:collection/:path")
    }

    /// Sort documents by the configured key, or by date, title and path.
    pub fn sort_docs(&mut self) {
        match self.config.sort_by.clone() {
            Some(key) => self.docs.sort_by(|a, b| {
                let ka = a.data().get_str(&key);
                let kb = b.data().get_str(&key);
                ka.cmp(&kb).then_with(|| a.path().cmp(b.path()))
            }),
            None => self.docs.sort_by(Document::order_cmp),
        }
    }

    /// Keep only the last `limit` documents.
    pub fn keep_last(&mut self, limit: usize) {
        if self.docs.len() > limit {
            let excess = self.docs.len() - limit;
            self.docs.drain(..excess);
        }
    }

    /// Template data describing the collection itself.
    pub fn to_value(&self) -> Value {
        let mut map = Mapping::new();
        map.insert("label".into(), self.label.clone().into());
        map.insert("output".into(), self.config.output.into());
        map.insert(
            "relative_directory".into(),
            self.relative_directory.clone().into(),
        );
        map.insert("size".into(), (self.docs.len() as u64).into());
        for (key, value) in &self.config.extra {
            map.insert(key.clone().into(), value.clone());
        }
        Value::Mapping(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontmatter::FrontMatter;

    fn post(source: &Path, name: &str) -> Document {
        let rel = format!("_posts/{name}");
        Document::new(source.join(&rel), rel, "posts", FrontMatter::new(), "")
            .expect("document")
    }

    #[test]
    fn test_directories() {
        let source = Path::new("/site");
        let c = Collection::new("recipes", CollectionConfig::default(), source, "");
        assert_eq!(c.relative_directory(), "_recipes");
        assert_eq!(c.directory(), Path::new("/site/_recipes"));

        let nested = Collection::new("recipes", CollectionConfig::default(), source, "content/");
        assert_eq!(nested.relative_directory(), "content/_recipes");
    }

    #[test]
    fn test_url_templates() {
        let source = Path::new("/site");
        let posts = Collection::new("posts", CollectionConfig::default(), source, "");
        assert_eq!(
            posts.url_template(&PermalinkStyle::Pretty),
            "/:categories/:year/:month/:day/:title/"
        );

        let docs = Collection::new("docs", CollectionConfig::default(), source, "");
        assert_eq!(
            docs.url_template(&PermalinkStyle::Date),
            "/:collection/:path:output_ext"
        );
        assert_eq!(docs.url_template(&PermalinkStyle::Pretty), "/:collection/:path/");

        let custom = Collection::new(
            "docs",
            CollectionConfig {
                permalink: Some("pretty".to_string()),
                ..CollectionConfig::default()
            },
            source,
            "",
        );
        assert_eq!(
            custom.url_template(&PermalinkStyle::Date),
            "/:categories/:year/:month/:day/:title/"
        );
    }

    #[test]
    fn test_sort_and_keep_last() {
        let source = Path::new("/site");
        let mut posts = Collection::new("posts", CollectionConfig::default(), source, "");
        posts.docs.push(post(source, "2024-03-01-c.md"));
        posts.docs.push(post(source, "2024-01-01-a.md"));
        posts.docs.push(post(source, "2024-02-01-b.md"));
        posts.sort_docs();

        let slugs: Vec<_> = posts.docs.iter().map(Document::slug).collect();
        assert_eq!(slugs, vec!["a", "b", "c"]);

        posts.keep_last(2);
        let slugs: Vec<_> = posts.docs.iter().map(Document::slug).collect();
        assert_eq!(slugs, vec!["b", "c"]);

        posts.keep_last(10);
        assert_eq!(posts.docs.len(), 2);
    }

    #[test]
    fn test_sort_by_front_matter_key() {
        let source = Path::new("/site");
        let config = CollectionConfig {
            sort_by: Some("rank".to_string()),
            ..CollectionConfig::default()
        };
        let mut docs = Collection::new("docs", config, source, "");
        for (name, rank) in [("intro", "b"), ("setup", "a"), ("usage", "c")] {
            let mut data = FrontMatter::new();
            data.insert("rank", rank);
            let rel = format!("_docs/{name}.md");
            docs.docs
                .push(Document::new(source.join(&rel), rel, "docs", data, "").unwrap());
        }
        docs.sort_docs();

        let ranks: Vec<_> = docs.docs.iter().map(|d| d.data().get_str("rank")).collect();
        assert_eq!(
            ranks,
            vec![Some("a".to_string()), Some("b".to_string()), Some("c".to_string())]
        );
    }
}

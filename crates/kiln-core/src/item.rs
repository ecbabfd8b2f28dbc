//! Traits shared by everything that ends up in the destination.

use std::path::{Path, PathBuf};

use serde_yaml::Value;

use crate::{frontmatter::FrontMatter, url::destination_path};

/// Anything with an output path: documents, pages and static files.
pub trait SiteFile {
    /// Absolute source path; `None` for generated items.
    fn source_path(&self) -> Option<&Path>;

    /// Path relative to the site source, `/`-separated.
    fn relative_path(&self) -> &str;

    /// The computed URL, without `baseurl`.
    fn url(&self) -> &str;

    /// Extension of the written file, with a leading dot.
    fn output_ext(&self) -> &str;

    /// Whether this item is written at all.
    fn write(&self) -> bool;

    /// Whether front matter forces regeneration on every build.
    fn force_regenerate(&self) -> bool {
        false
    }

    /// Absolute destination path for this item.
    fn destination(&self, dest: &Path, baseurl: &str) -> PathBuf {
        destination_path(dest, baseurl, self.url(), self.output_ext())
    }
}

/// What kind of renderable an item is, used by hooks and defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemKind {
    /// A document in the named collection.
    Document(String),
    /// A standalone page.
    Page,
}

impl ItemKind {
    /// The scope name used by front matter defaults.
    pub fn scope(&self) -> &str {
        match self {
            Self::Document(label) => label,
            Self::Page => "pages",
        }
    }
}

/// An item that goes through conversion, layouts and templating.
pub trait Renderable: SiteFile {
    /// Front matter.
    fn data(&self) -> &FrontMatter;

    /// Raw content after the front matter.
    fn content(&self) -> &str;

    /// Source extension with a leading dot.
    fn extname(&self) -> &str;

    /// Rendered output, once rendered.
    fn output(&self) -> Option<&str>;

    /// Store rendered output.
    fn set_output(&mut self, output: String);

    /// Document or page.
    fn kind(&self) -> ItemKind;

    /// Template data for `page` in the payload.
    fn to_value(&self) -> Value;

    /// Layout named in front matter, unless it is `none`.
    fn layout(&self) -> Option<String> {
        self.data()
            .get_str("layout")
            .filter(|layout| !layout.is_empty() && layout != "none")
    }

    /// Whether the output is HTML.
    fn is_html(&self) -> bool {
        matches!(self.output_ext(), ".html" | ".htm")
    }
}

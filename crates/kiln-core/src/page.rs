//! Standalone pages outside any collection.

use std::path::{Path, PathBuf};

use serde_yaml::{Mapping, Value};

use crate::{
    frontmatter::FrontMatter,
    item::{ItemKind, Renderable, SiteFile},
    url::{PermalinkStyle, expand},
};

/// A page: a front-matter file in the site tree, or one made by a generator.
#[derive(Debug, Clone)]
pub struct Page {
    path: Option<PathBuf>,
    relative_path: String,
    dir: String,
    name: String,
    basename: String,
    extname: String,
    data: FrontMatter,
    content: String,
    output: Option<String>,
    output_ext: String,
    url: String,
}

impl Page {
    /// A page read from `path`, at `relative_path` inside the source.
    pub fn new(
        path: impl Into<PathBuf>,
        relative_path: &str,
        data: FrontMatter,
        content: impl Into<String>,
    ) -> Self {
        let (dir, name) = match relative_path.rfind('/') {
            Some(idx) => (&relative_path[..idx], &relative_path[idx + 1..]),
            None => ("", relative_path),
        };
        let mut page = Self::generated(dir, name, data, content);
        page.path = Some(path.into());
        page
    }

    /// A page with no source file, such as a generated feed or sitemap.
    pub fn generated(
        dir: &str,
        name: &str,
        data: FrontMatter,
        content: impl Into<String>,
    ) -> Self {
        let (basename, extname) = match name.rfind('.') {
            Some(idx) if idx > 0 => (name[..idx].to_string(), name[idx..].to_string()),
            _ => (name.to_string(), String::new()),
        };
        let dir = dir.trim_matches('/').to_string();
        let relative_path = if dir.is_empty() {
            name.to_string()
        } else {
            format!("{dir}/{name}")
        };
        Self {
            path: None,
            relative_path,
            dir,
            name: name.to_string(),
            output_ext: extname.clone(),
            basename,
            extname,
            data,
            content: content.into(),
            output: None,
            url: String::new(),
        }
    }

    /// File name including extension.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Directory relative to the source, without slashes at either end.
    pub fn dir(&self) -> &str {
        &self.dir
    }

    /// File name without extension.
    pub fn basename(&self) -> &str {
        &self.basename
    }

    /// Whether this is an index page.
    pub fn is_index(&self) -> bool {
        self.basename == "index"
    }

    /// Mutable front matter, for generators.
    pub fn data_mut(&mut self) -> &mut FrontMatter {
        &mut self.data
    }

    /// Set the extension produced by this page's converter.
    pub fn set_output_ext(&mut self, ext: impl Into<String>) {
        self.output_ext = ext.into();
    }

    /// The URL template for this page under a permalink style.
    pub fn url_template(&self, style: &PermalinkStyle) -> String {
        if !self.is_html() {
            "/:path/:basename:output_ext".to_string()
        } else if self.is_index() {
            "/:path/".to_string()
        } else {
            style.add_suffix("/:path/:basename")
        }
    }

    /// Compute the URL from front matter `permalink` or the style.
    pub fn compute_url(&self, style: &PermalinkStyle) -> String {
        let template = self
            .data
            .get_str("permalink")
            .unwrap_or_else(|| self.url_template(style));
        expand(
            &template,
            &[
                ("path", self.dir.clone()),
                ("basename", self.basename.clone()),
                ("output_ext", self.output_ext.clone()),
            ],
        )
    }

    /// Compute and store the URL.
    pub fn assign_url(&mut self, style: &PermalinkStyle) {
        self.url = self.compute_url(style);
    }
}

impl SiteFile for Page {
    fn source_path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn relative_path(&self) -> &str {
        &self.relative_path
    }

    fn url(&self) -> &str {
        &self.url
    }

    fn output_ext(&self) -> &str {
        &self.output_ext
    }

    fn write(&self) -> bool {
        true
    }

    fn force_regenerate(&self) -> bool {
        self.data.get_bool("regenerate") == Some(true)
    }
}

impl Renderable for Page {
    fn data(&self) -> &FrontMatter {
        &self.data
    }

    fn content(&self) -> &str {
        &self.content
    }

    fn extname(&self) -> &str {
        &self.extname
    }

    fn output(&self) -> Option<&str> {
        self.output.as_deref()
    }

    fn set_output(&mut self, output: String) {
        self.output = Some(output);
    }

    fn kind(&self) -> ItemKind {
        ItemKind::Page
    }

    fn to_value(&self) -> Value {
        let mut map: Mapping = self.data.as_mapping().clone();
        map.insert("url".into(), self.url.clone().into());
        map.insert("name".into(), self.name.clone().into());
        map.insert("dir".into(), format!("/{}", self.dir).into());
        map.insert("output_ext".into(), self.output_ext.clone().into());
        map.insert("content".into(), self.content.clone().into());
        Value::Mapping(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(rel: &str) -> Page {
        Page::new(Path::new("/site").join(rel), rel, FrontMatter::new(), "")
    }

    #[test]
    fn test_page_urls() {
        let mut about = page("about.md");
        about.set_output_ext(".html");
        about.assign_url(&PermalinkStyle::Date);
        assert_eq!(about.url(), "/about.html");
        about.assign_url(&PermalinkStyle::Pretty);
        assert_eq!(about.url(), "/about/");

        let mut index = page("docs/index.md");
        index.set_output_ext(".html");
        index.assign_url(&PermalinkStyle::Pretty);
        assert_eq!(index.url(), "/docs/");
        assert_eq!(
            index.destination(Path::new("/out"), "/blog"),
            PathBuf::from("/out/blog/docs/index.html")
        );
    }

    #[test]
    fn test_non_html_page_keeps_extension() {
        let mut feed = Page::generated("", "feed.xml", FrontMatter::new(), "<rss/>");
        feed.assign_url(&PermalinkStyle::Pretty);
        assert_eq!(feed.url(), "/feed.xml");
        assert!(feed.source_path().is_none());
        assert_eq!(feed.relative_path(), "feed.xml");
    }

    #[test]
    fn test_relative_path_in_subdir() {
        let p = page("docs/guide/setup.md");
        assert_eq!(p.dir(), "docs/guide");
        assert_eq!(p.relative_path(), "docs/guide/setup.md");
    }

    #[test]
    fn test_permalink_front_matter() {
        let mut data = FrontMatter::new();
        data.insert("permalink", "/custom/");
        let mut p = Page::new("/site/x.md", "x.md", data, "");
        p.set_output_ext(".html");
        p.assign_url(&PermalinkStyle::Date);
        assert_eq!(p.url(), "/custom/");
    }
}

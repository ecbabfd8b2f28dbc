//! Documents: front-matter content items that belong to a collection.

use std::{
    cmp::Ordering,
    path::{Path, PathBuf},
};

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};
use serde_yaml::{Mapping, Value};

use crate::{
    config::POSTS,
    error::{CoreError, Result},
    frontmatter::{FrontMatter, parse_date},
    item::{ItemKind, Renderable, SiteFile},
    url::{expand, slugify, titleize_slug},
};

/// Date format used when exposing dates to templates.
pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A content item in a collection, identified by its absolute source path.
#[derive(Debug, Clone)]
pub struct Document {
    path: PathBuf,
    relative_path: String,
    cleaned_path: String,
    basename_without_ext: String,
    extname: String,
    collection: String,
    data: FrontMatter,
    content: String,
    output: Option<String>,
    output_ext: String,
    url: String,
    date: Option<NaiveDateTime>,
    slug: String,
    categories: Vec<String>,
    output_enabled: bool,
}

/// Split a post filename stem like `2024-01-14-hello` into date and slug.
pub fn post_name_parts(stem: &str) -> Option<(NaiveDate, &str)> {
    if stem.len() < 12 || stem.as_bytes().get(10) != Some(&b'-') {
        return None;
    }
    let date = NaiveDate::parse_from_str(stem.get(..10)?, "%Y-%m-%d").ok()?;
    let slug = stem.get(11..)?;
    (!slug.is_empty()).then_some((date, slug))
}

impl Document {
    /// Build a document from its source path and parsed front matter.
    ///
    /// `relative_path` is relative to the site source. Posts take their date
    /// and slug from a `YYYY-MM-DD-slug` filename unless front matter says
    /// otherwise.
    pub fn new(
        path: impl Into<PathBuf>,
        relative_path: impl Into<String>,
        collection: impl Into<String>,
        mut data: FrontMatter,
        content: impl Into<String>,
    ) -> Result<Self> {
        let path = path.into();
        let relative_path = relative_path.into();
        let collection = collection.into();

        let file_name = relative_path
            .rsplit('/')
            .next()
            .unwrap_or(relative_path.as_str())
            .to_string();
        let (stem, extname) = match file_name.rfind('.') {
            Some(idx) if idx > 0 => (file_name[..idx].to_string(), file_name[idx..].to_string()),
            _ => (file_name.clone(), String::new()),
        };

        let name_parts = if collection == POSTS {
            post_name_parts(&stem)
        } else {
            None
        };

        let date = match data.get_str("date") {
            Some(raw) => Some(parse_date(&raw).ok_or_else(|| {
                CoreError::front_matter(&path, format!("invalid date `{raw}`"))
            })?),
            None => name_parts.and_then(|(date, _)| date.and_hms_opt(0, 0, 0)),
        };

        let slug = data
            .get_str("slug")
            .or_else(|| name_parts.map(|(_, slug)| slug.to_string()))
            .unwrap_or_else(|| stem.clone());

        if !data.contains("title") {
            data.insert("title", titleize_slug(&slug));
        }

        let mut categories = data.get_list("categories");
        for category in data.get_list("category") {
            if !categories.contains(&category) {
                categories.push(category);
            }
        }

        let cleaned_path = cleaned_path(&relative_path, &collection);

        Ok(Self {
            path,
            relative_path,
            cleaned_path,
            basename_without_ext: stem,
            extname,
            collection,
            data,
            content: content.into(),
            output: None,
            output_ext: ".html".to_string(),
            url: String::new(),
            date,
            slug,
            categories,
            output_enabled: true,
        })
    }

    /// Absolute source path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Owning collection label.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Publication date.
    pub fn date(&self) -> Option<NaiveDateTime> {
        self.date
    }

    /// URL slug.
    pub fn slug(&self) -> &str {
        &self.slug
    }

    /// Title from front matter.
    pub fn title(&self) -> String {
        self.data.get_str("title").unwrap_or_default()
    }

    /// Categories from front matter.
    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    /// Path inside the collection without extension.
    pub fn cleaned_path(&self) -> &str {
        &self.cleaned_path
    }

    /// Whether front matter allows publishing.
    pub fn published(&self) -> bool {
        self.data.get_bool("published") != Some(false)
    }

    /// Mutable front matter, for generators.
    pub fn data_mut(&mut self) -> &mut FrontMatter {
        &mut self.data
    }

    /// Replace the raw content, for generators.
    pub fn set_content(&mut self, content: impl Into<String>) {
        self.content = content.into();
        self.output = None;
    }

    /// Set the extension produced by this document's converter.
    pub fn set_output_ext(&mut self, ext: impl Into<String>) {
        self.output_ext = ext.into();
    }

    /// Whether the owning collection writes its documents.
    pub fn set_output_enabled(&mut self, enabled: bool) {
        self.output_enabled = enabled;
    }

    /// Placeholders available to URL templates.
    pub fn url_placeholders(&self) -> Vec<(&'static str, String)> {
        let categories = self
            .categories
            .iter()
            .map(|c| slugify(c, false))
            .filter(|c| !c.is_empty())
            .collect::<Vec<_>>()
            .join("/");

        let mut placeholders = vec![
            ("collection", self.collection.clone()),
            ("path", self.cleaned_path.clone()),
            ("name", slugify(&self.basename_without_ext, false)),
            ("basename", self.basename_without_ext.clone()),
            ("title", slugify(&self.slug, true)),
            ("slug", slugify(&self.slug, false)),
            ("categories", categories),
            ("output_ext", self.output_ext.clone()),
        ];

        let (year, month, day, i_month, i_day, y_day, hour, minute, second) = match self.date {
            Some(date) => (
                format!("{:04}", date.year()),
                format!("{:02}", date.month()),
                format!("{:02}", date.day()),
                date.month().to_string(),
                date.day().to_string(),
                format!("{:03}", date.ordinal()),
                format!("{:02}", date.hour()),
                format!("{:02}", date.minute()),
                format!("{:02}", date.second()),
            ),
            None => Default::default(),
        };
        placeholders.extend([
            ("year", year),
            ("month", month),
            ("day", day),
            ("i_month", i_month),
            ("i_day", i_day),
            ("y_day", y_day),
            ("hour", hour),
            ("minute", minute),
            ("second", second),
        ]);
        placeholders
    }

    /// Compute the URL from front matter `permalink` or the collection template.
    pub fn compute_url(&self, template: &str) -> String {
        let template = self
            .data
            .get_str("permalink")
            .unwrap_or_else(|| template.to_string());
        expand(&template, &self.url_placeholders())
    }

    /// Compute and store the URL.
    pub fn assign_url(&mut self, template: &str) {
        self.url = self.compute_url(template);
    }

    /// Ordering by date, then title, then path.
    pub fn order_cmp(a: &Self, b: &Self) -> Ordering {
        a.date
            .cmp(&b.date)
            .then_with(|| a.title().cmp(&b.title()))
            .then_with(|| a.path.cmp(&b.path))
    }
}

/// Strip everything up to `_<label>/` and the extension.
fn cleaned_path(relative_path: &str, label: &str) -> String {
    let marker = format!("_{label}/");
    let inside = match relative_path.find(&marker) {
        Some(idx) => &relative_path[idx + marker.len()..],
        None => relative_path,
    };
    match inside.rfind('.') {
        Some(dot) if !inside[dot..].contains('/') => inside[..dot].to_string(),
        _ => inside.to_string(),
    }
}

impl SiteFile for Document {
    fn source_path(&self) -> Option<&Path> {
        Some(&self.path)
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
        self.output_enabled
    }

    fn force_regenerate(&self) -> bool {
        self.data.get_bool("regenerate") == Some(true)
    }
}

impl Renderable for Document {
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
        ItemKind::Document(self.collection.clone())
    }

    fn to_value(&self) -> Value {
        let mut map: Mapping = self.data.as_mapping().clone();
        map.insert("url".into(), self.url.clone().into());
        map.insert("path".into(), self.relative_path.clone().into());
        map.insert("collection".into(), self.collection.clone().into());
        map.insert("slug".into(), self.slug.clone().into());
        map.insert(
            "categories".into(),
            Value::Sequence(self.categories.iter().cloned().map(Value::from).collect()),
        );
        map.insert("output_ext".into(), self.output_ext.clone().into());
        if let Some(date) = self.date {
            map.insert("date".into(), date.format(DATE_FORMAT).to_string().into());
        }
        map.insert("content".into(), self.content.clone().into());
        Value::Mapping(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::url::PermalinkStyle;

    fn doc(rel: &str, label: &str, front: &str) -> Document {
        let data = if front.is_empty() {
            FrontMatter::new()
        } else {
            FrontMatter::from_mapping(serde_yaml::from_str(front).expect("yaml"))
        };
        Document::new(Path::new("/site").join(rel), rel, label, data, "body").expect("document")
    }

    #[test]
    fn test_post_name_parts() {
        let (date, slug) = post_name_parts("2024-01-14-hello-world").expect("parts");
        assert_eq!(date.to_string(), "2024-01-14");
        assert_eq!(slug, "hello-world");
        assert!(post_name_parts("hello-world").is_none());
        assert!(post_name_parts("2024-13-01-bad").is_none());
        assert!(post_name_parts("2024-01-01-").is_none());
    }

    #[test]
    fn test_post_defaults_from_filename() {
        let d = doc("_posts/2024-01-14-hello-world.md", "posts", "");
        assert_eq!(d.slug(), "hello-world");
        assert_eq!(d.title(), "Hello World");
        assert_eq!(d.date().unwrap().format("%Y-%m-%d").to_string(), "2024-01-14");
        assert_eq!(d.extname(), ".md");
        assert_eq!(d.cleaned_path(), "2024-01-14-hello-world");
    }

    #[test]
    fn test_front_matter_overrides_filename() {
        let d = doc(
            "_posts/2024-01-14-hello.md",
            "posts",
            "title: Custom\ndate: 2023-05-06 07:08:09\nslug: other",
        );
        assert_eq!(d.title(), "Custom");
        assert_eq!(d.slug(), "other");
        assert_eq!(d.date().unwrap().format(DATE_FORMAT).to_string(), "2023-05-06 07:08:09");
    }

    #[test]
    fn test_invalid_date_is_an_error() {
        let data = FrontMatter::from_mapping(serde_yaml::from_str("date: soon").unwrap());
        let err = Document::new("/site/_posts/a.md", "_posts/a.md", "posts", data, "").unwrap_err();
        assert!(err.to_string().contains("invalid date"));
    }

    #[test]
    fn test_post_urls_per_style() {
        let mut d = doc(
            "_posts/2024-01-14-hello.md",
            "posts",
            "categories: [News, Rust]",
        );
        d.assign_url(&PermalinkStyle::Date.post_template());
        assert_eq!(d.url(), "/news/rust/2024/01/14/hello.html");

        d.assign_url(&PermalinkStyle::Pretty.post_template());
        assert_eq!(d.url(), "/news/rust/2024/01/14/hello/");

        d.assign_url(&PermalinkStyle::Ordinal.post_template());
        assert_eq!(d.url(), "/news/rust/2024/014/hello.html");

        d.assign_url(&PermalinkStyle::None.post_template());
        assert_eq!(d.url(), "/news/rust/hello.html");
    }

    #[test]
    fn test_collection_document_url() {
        let mut d = doc("_guides/setup/intro.md", "guides", "");
        d.assign_url("/:collection/:path:output_ext");
        assert_eq!(d.url(), "/guides/setup/intro.html");
        assert_eq!(
            d.destination(Path::new("/out"), ""),
            PathBuf::from("/out/guides/setup/intro.html")
        );
    }

    #[test]
    fn test_front_matter_permalink_wins() {
        let mut d = doc("_guides/intro.md", "guides", "permalink: /start/:name/");
        d.assign_url("/:collection/:path:output_ext");
        assert_eq!(d.url(), "/start/intro/");
    }

    #[test]
    fn test_url_is_stable() {
        let mut d = doc("_posts/2024-02-03-x.md", "posts", "");
        let template = PermalinkStyle::Date.post_template();
        d.assign_url(&template);
        let first = d.url().to_string();
        d.assign_url(&template);
        assert_eq!(d.url(), first);
    }

    #[test]
    fn test_write_flags() {
        let d = doc("_posts/2024-02-03-x.md", "posts", "published: false");
        assert!(!d.published());
        assert!(d.write());

        let mut hidden = doc("_notes/a.md", "notes", "");
        hidden.set_output_enabled(false);
        assert!(!hidden.write());
    }

    #[test]
    fn test_to_value() {
        let mut d = doc("_posts/2024-01-14-hello.md", "posts", "layout: post");
        d.assign_url(&PermalinkStyle::None.post_template());
        let value = d.to_value();
        assert_eq!(value["url"], Value::from("/hello.html"));
        assert_eq!(value["layout"], Value::from("post"));
        assert_eq!(value["collection"], Value::from("posts"));
        assert_eq!(value["date"], Value::from("2024-01-14 00:00:00"));
    }
}

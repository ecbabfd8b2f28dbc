//! Front matter parsing for content files.
//!
//! Front matter is schema-free, so it is kept as an ordered mapping from
//! string keys to tagged YAML values rather than a fixed struct.

use std::path::Path;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_yaml::{Mapping, Value};

use crate::error::{CoreError, Result};

/// Delimiter types for front matter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrontMatterFormat {
    /// YAML front matter delimited by `---`.
    Yaml,
    /// TOML front matter delimited by `+++`.
    Toml,
}

impl FrontMatterFormat {
    /// Get the delimiter string for this format.
    pub fn delimiter(&self) -> &'static str {
        match self {
            Self::Yaml => "---",
            Self::Toml => "+++",
        }
    }
}

/// Ordered front matter metadata.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrontMatter {
    data: Mapping,
}

impl FrontMatter {
    /// Create empty front matter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an existing mapping.
    pub fn from_mapping(data: Mapping) -> Self {
        Self { data }
    }

    /// Look up a raw value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Look up a string value; numbers and bools are stringified.
    pub fn get_str(&self, key: &str) -> Option<String> {
        match self.data.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// Look up a boolean value.
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.data.get(key).and_then(Value::as_bool)
    }

    /// Look up a list of strings.
    ///
    /// A plain string is split on whitespace, so `categories: news tech`
    /// and `categories: [news, tech]` are equivalent.
    pub fn get_list(&self, key: &str) -> Vec<String> {
        match self.data.get(key) {
            Some(Value::String(s)) => s.split_whitespace().map(str::to_string).collect(),
            Some(Value::Sequence(items)) => items
                .iter()
                .filter_map(|v| match v {
                    Value::String(s) => Some(s.clone()),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Insert or replace a value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.data.insert(Value::String(key.into()), value.into());
    }

    /// Whether a key is present.
    pub fn contains(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    /// Fill in keys missing from this front matter with `defaults`.
    pub fn merge_defaults(&mut self, defaults: &Mapping) {
        for (key, value) in defaults {
            if !self.data.contains_key(key) {
                self.data.insert(key.clone(), value.clone());
            }
        }
    }

    /// Borrow the underlying mapping.
    pub fn as_mapping(&self) -> &Mapping {
        &self.data
    }

    /// Whether no keys are set.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Split content into front matter and body.
///
/// The opening delimiter must be the first line and the closing delimiter
/// must sit on a line of its own.
pub fn split_front_matter(content: &str) -> Option<(FrontMatterFormat, &str, &str)> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);

    let format = if content.starts_with("---") {
        FrontMatterFormat::Yaml
    } else if content.starts_with("+++") {
        FrontMatterFormat::Toml
    } else {
        return None;
    };
    let delimiter = format.delimiter();

    let first_line_end = content.find('\n')?;
    if content[..first_line_end].trim_end() != delimiter {
        return None;
    }
    let after_first = &content[first_line_end + 1..];

    let mut offset = 0;
    for line in after_first.split_inclusive('\n') {
        if line.trim_end() == delimiter {
            let front_matter = &after_first[..offset];
            let body = &after_first[offset + line.len()..];
            return Some((format, front_matter, body));
        }
        offset += line.len();
    }
    None
}

/// Whether the content starts with a front matter block.
pub fn has_front_matter(content: &str) -> bool {
    split_front_matter(content).is_some()
}

/// Parse front matter from a string.
///
/// Returns `None` when the content has no front matter block at all, which
/// is how static files are told apart from documents.
pub fn parse_front_matter(content: &str, path: &Path) -> Result<Option<(FrontMatter, String)>> {
    let Some((format, fm_str, body)) = split_front_matter(content) else {
        return Ok(None);
    };

    let value: Value = match format {
        FrontMatterFormat::Yaml => {
            serde_yaml::from_str(fm_str).map_err(|e| CoreError::front_matter(path, e.to_string()))?
        }
        FrontMatterFormat::Toml => {
            toml::from_str(fm_str).map_err(|e| CoreError::front_matter(path, e.to_string()))?
        }
    };

    let data = match value {
        Value::Null => Mapping::new(),
        Value::Mapping(mapping) => mapping,
        _ => {
            return Err(CoreError::front_matter(
                path,
                "front matter must be a mapping",
            ));
        }
    };

    Ok(Some((FrontMatter::from_mapping(data), body.to_string())))
}

/// Parse a front matter date.
///
/// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS [+zzzz]` and bare `YYYY-MM-DD`.
pub fn parse_date(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.naive_local());
    }
    if let Ok(dt) = DateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S %z") {
        return Some(dt.naive_local());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S") {
        return Some(dt);
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M") {
        return Some(dt);
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

#[cfg(test)]
mod tests {
    use chrono::{Datelike, Timelike};

    use super::*;

    #[test]
    fn test_split_yaml_front_matter() {
        let content = "---\ntitle: \"Hello World\"\ndate: 2024-01-14\n---\n\nThis is the body content.";

        let (format, fm, body) = split_front_matter(content).expect("split");
        assert_eq!(format, FrontMatterFormat::Yaml);
        assert!(fm.contains("title:"));
        assert_eq!(body, "\nThis is the body content.");
    }

    #[test]
    fn test_split_toml_front_matter() {
        let content = "+++\ntitle = \"Hello World\"\n+++\nBody";

        let (format, fm, body) = split_front_matter(content).expect("split");
        assert_eq!(format, FrontMatterFormat::Toml);
        assert!(fm.contains("title ="));
        assert_eq!(body, "Body");
    }

    #[test]
    fn test_dashes_inside_a_line_do_not_close() {
        let content = "---\ntitle: a---b\n---\nBody";
        let (_, fm, body) = split_front_matter(content).expect("split");
        assert_eq!(fm, "title: a---b\n");
        assert_eq!(body, "Body");
    }

    #[test]
    fn test_no_front_matter() {
        assert!(split_front_matter("Just some content.").is_none());
        assert!(split_front_matter("---not a delimiter\n---\n").is_none());
        assert!(!has_front_matter("body {}"));
    }

    #[test]
    fn test_empty_front_matter() {
        let (fm, body) = parse_front_matter("---\n---\nHi", Path::new("a.md"))
            .expect("parse")
            .expect("has front matter");
        assert!(fm.is_empty());
        assert_eq!(body, "Hi");
    }

    #[test]
    fn test_parse_keeps_key_order() {
        let content = "---\nzeta: 1\nalpha: two\nlist: [a, b]\n---\nBody";
        let (fm, _) = parse_front_matter(content, Path::new("a.md"))
            .expect("parse")
            .expect("has front matter");

        let keys: Vec<_> = fm
            .as_mapping()
            .keys()
            .filter_map(Value::as_str)
            .collect();
        assert_eq!(keys, vec!["zeta", "alpha", "list"]);
        assert_eq!(fm.get_str("zeta").as_deref(), Some("1"));
        assert_eq!(fm.get_list("list"), vec!["a", "b"]);
    }

    #[test]
    fn test_parse_rejects_non_mapping() {
        let err = parse_front_matter("---\n- a\n- b\n---\n", Path::new("bad.md")).unwrap_err();
        assert!(err.to_string().contains("bad.md"));
    }

    #[test]
    fn test_get_list_from_string() {
        let mut fm = FrontMatter::new();
        fm.insert("categories", "news tech");
        assert_eq!(fm.get_list("categories"), vec!["news", "tech"]);
    }

    #[test]
    fn test_merge_defaults_keeps_explicit_values() {
        let mut fm = FrontMatter::new();
        fm.insert("layout", "post");

        let mut defaults = Mapping::new();
        defaults.insert(Value::from("layout"), Value::from("default"));
        defaults.insert(Value::from("author"), Value::from("kiln"));
        fm.merge_defaults(&defaults);

        assert_eq!(fm.get_str("layout").as_deref(), Some("post"));
        assert_eq!(fm.get_str("author").as_deref(), Some("kiln"));
    }

    #[test]
    fn test_parse_date_formats() {
        let d = parse_date("2024-01-14").expect("date");
        assert_eq!((d.year(), d.month(), d.day()), (2024, 1, 14));

        let d = parse_date("2024-01-14 10:30:00 +0100").expect("datetime");
        assert_eq!(d.hour(), 10);

        let d = parse_date("2024-01-14T08:00:00Z").expect("rfc3339");
        assert_eq!(d.hour(), 8);

        assert!(parse_date("yesterday").is_none());
    }
}

//! Permalink styles, URL templates and destination paths.
//!
//! A URL is produced by expanding a template such as
//! `/:categories/:year/:month/:day/:title:output_ext` against a set of
//! placeholders. The destination of an item is then a pure function of that
//! URL, the site `baseurl` and the item's output extension.

use std::path::{Path, PathBuf};

/// Built-in permalink styles, or a literal template.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PermalinkStyle {
    /// `/:categories/:year/:month/:day/:title:output_ext`
    #[default]
    Date,
    /// `/:categories/:year/:month/:day/:title/`
    Pretty,
    /// `/:categories/:year/:y_day/:title:output_ext`
    Ordinal,
    /// `/:categories/:title:output_ext`
    None,
    /// A literal template given in configuration.
    Custom(String),
}

impl PermalinkStyle {
    /// Parse a style name; anything that is not a known name is a template.
    pub fn parse(value: &str) -> Self {
        match value.trim() {
            "" | "date" => Self::Date,
            "pretty" => Self::Pretty,
            "ordinal" => Self::Ordinal,
            "none" => Self::None,
            other => Self::Custom(other.to_string()),
        }
    }

    /// Template used for posts under this style.
    pub fn post_template(&self) -> String {
        match self {
            Self::Date => "/:categories/:year/:month/:day/:title:output_ext".to_string(),
            Self::Pretty => "/:categories/:year/:month/:day/:title/".to_string(),
            Self::Ordinal => "/:categories/:year/:y_day/:title:output_ext".to_string(),
            Self::None => "/:categories/:title:output_ext".to_string(),
            Self::Custom(template) => template.clone(),
        }
    }

    /// Whether URLs under this style end in a directory.
    pub fn is_pretty(&self) -> bool {
        match self {
            Self::Pretty => true,
            Self::Custom(template) => template.ends_with('/'),
            _ => false,
        }
    }

    /// Append the style's suffix to a template without one.
    pub fn add_suffix(&self, template: &str) -> String {
        match self {
            Self::Pretty => format!("{template}/"),
            Self::Custom(custom) if custom.ends_with('/') => format!("{template}/"),
            _ => format!("{template}:output_ext"),
        }
    }
}

/// Resolve a collection-level permalink setting, which may name a style.
pub fn resolve_template(value: &str) -> String {
    match PermalinkStyle::parse(value) {
        PermalinkStyle::Custom(template) => template,
        style => style.post_template(),
    }
}

/// Expand `:placeholder` tokens in a URL template and sanitize the result.
///
/// Longer placeholder names are substituted first so `:i_month` never
/// collides with `:month`.
pub fn expand(template: &str, placeholders: &[(&str, String)]) -> String {
    let mut ordered: Vec<&(&str, String)> = placeholders.iter().collect();
    ordered.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then(a.0.cmp(b.0)));

    let mut url = template.to_string();
    for (key, value) in ordered {
        url = url.replace(&format!(":{key}"), value);
    }
    sanitize(&url)
}

/// Normalize a URL: single slashes, leading slash, no `.` or `..` segments.
pub fn sanitize(url: &str) -> String {
    let trailing = url.ends_with('/');
    let segments: Vec<&str> = url
        .split('/')
        .filter(|s| !s.is_empty() && *s != "." && *s != "..")
        .collect();

    let mut out = format!("/{}", segments.join("/"));
    if trailing && out != "/" {
        out.push('/');
    }
    out
}

/// Normalize a configured baseurl to `""` or `/segment[/segment]`.
pub fn normalize_baseurl(baseurl: &str) -> String {
    let trimmed = baseurl.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{trimmed}")
    }
}

/// Compute the absolute destination for a URL.
///
/// URLs ending in `/` map onto `index` inside that directory. The output
/// extension is appended when the last segment carries none.
pub fn destination_path(dest: &Path, baseurl: &str, url: &str, output_ext: &str) -> PathBuf {
    let mut relative = url.trim_start_matches('/').to_string();
    if relative.is_empty() || relative.ends_with('/') {
        relative.push_str("index");
        relative.push_str(if output_ext.is_empty() { ".html" } else { output_ext });
    } else {
        let last = relative.rsplit('/').next().unwrap_or_default();
        if !last.contains('.') {
            relative.push_str(output_ext);
        }
    }

    let base = normalize_baseurl(baseurl);
    let mut path = dest.to_path_buf();
    if !base.is_empty() {
        path.push(base.trim_start_matches('/'));
    }
    path.push(relative);
    path
}

/// Lowercase, replace every run of non-alphanumerics with `-`.
pub fn slugify(input: &str, cased: bool) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut dash = false;
    for c in input.chars() {
        if c.is_alphanumeric() {
            if dash && !slug.is_empty() {
                slug.push('-');
            }
            dash = false;
            if cased {
                slug.push(c);
            } else {
                slug.extend(c.to_lowercase());
            }
        } else {
            dash = true;
        }
    }
    slug
}

/// Turn `hello-world` into `Hello World`.
pub fn titleize_slug(slug: &str) -> String {
    slug.split('-')
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

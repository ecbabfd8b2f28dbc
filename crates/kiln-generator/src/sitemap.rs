//! Sitemap generation.
//!
//! Generates an XML sitemap listing every HTML document and page.

use chrono::NaiveDateTime;
use kiln_core::{FrontMatter, Page, Renderable, SiteFile};
use kiln_parser::Priority;
use tracing::debug;

use crate::{
    plugin::{Generator, Result},
    site::Site,
};

/// Name of the generated file.
const SITEMAP_FILE: &str = "sitemap.xml";

/// A sitemap URL entry.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct SitemapUrl {
    /// Absolute URL.
    pub loc: String,

    /// Last modification date.
    pub lastmod: Option<NaiveDateTime>,
}

/// Adds `sitemap.xml` to the site unless the source already has one.
///
/// Items whose front matter sets `sitemap: false` are left out.
#[derive(Debug, Clone, Copy, Default)]
pub struct SitemapGenerator;

impl SitemapGenerator {
    /// Create a new sitemap generator.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Collect the entries for a site.
    pub fn entries(&self, site: &Site) -> Vec<SitemapUrl> {
        let root = format!("{}{}", site.config().url.trim_end_matches('/'), site.baseurl());
        let listed = |item: &dyn Renderable| {
            item.write() && item.is_html() && item.data().get_bool("sitemap") != Some(false)
        };

        let mut entries: Vec<SitemapUrl> = site
            .collections()
            .iter()
            .flat_map(|c| c.docs.iter())
            .filter(|doc| listed(*doc))
            .map(|doc| SitemapUrl {
                loc: format!("{root}{}", doc.url()),
                lastmod: doc.date(),
            })
            .chain(
                site.pages()
                    .iter()
                    .filter(|page| listed(*page))
                    .map(|page| SitemapUrl {
                        loc: format!("{root}{}", page.url()),
                        lastmod: None,
                    }),
            )
            .collect();
        entries.sort();
        entries.dedup_by(|a, b| a.loc == b.loc);
        entries
    }

    /// Render entries as sitemap XML.
    pub fn to_xml(&self, entries: &[SitemapUrl]) -> String {
        let mut xml = String::from(r#"<?xml version="1.0" encoding="UTF-8"?>"#);
        xml.push('\n');
        xml.push_str(r#"<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">"#);
        xml.push('\n');
        for url in entries {
            xml.push_str(&url_to_xml(url));
        }
        xml.push_str("</urlset>\n");
        xml
    }
}

impl Generator for SitemapGenerator {
    fn name(&self) -> &str {
        "sitemap"
    }

    fn priority(&self) -> Priority {
        Priority::Lowest
    }

    fn safe(&self) -> bool {
        true
    }

    fn generate(&self, site: &mut Site) -> Result<()> {
        if site.pages().iter().any(|p| p.relative_path() == SITEMAP_FILE) {
            debug!("source provides its own sitemap");
            return Ok(());
        }

        let entries = self.entries(site);
        debug!(count = entries.len(), "generating sitemap");

        let mut data = FrontMatter::new();
        data.insert("layout", "none");
        data.insert("sitemap", false);
        site.pages_mut()
            .push(Page::generated("", SITEMAP_FILE, data, self.to_xml(&entries)));
        Ok(())
    }
}

/// Convert a URL entry to XML.
fn url_to_xml(url: &SitemapUrl) -> String {
    let mut xml = String::from("  <url>\n");
    xml.push_str(&format!("    <loc>{}</loc>\n", escape_xml(&url.loc)));
    if let Some(lastmod) = &url.lastmod {
        xml.push_str(&format!(
            "    <lastmod>{}</lastmod>\n",
            lastmod.format("%Y-%m-%d")
        ));
    }
    xml.push_str("  </url>\n");
    xml
}

/// Escape special XML characters.
fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    #[test]
    fn test_escape_xml() {
        assert_eq!(escape_xml("a&b"), "a&amp;b");
        assert_eq!(escape_xml("<tag>"), "&lt;tag&gt;");
        assert_eq!(escape_xml("\"quoted\""), "&quot;quoted&quot;");
    }

    #[test]
    fn test_to_xml() {
        let entries = vec![
            SitemapUrl {
                loc: "https://example.com/".to_string(),
                lastmod: None,
            },
            SitemapUrl {
                loc: "https://example.com/2024/01/14/hello.html".to_string(),
                lastmod: NaiveDate::from_ymd_opt(2024, 1, 14).and_then(|d| d.and_hms_opt(0, 0, 0)),
            },
        ];
        let xml = SitemapGenerator::new().to_xml(&entries);

        assert!(xml.starts_with(r#"<?xml version="1.0" encoding="UTF-8"?>"#));
        assert!(xml.contains("<loc>https://example.com/</loc>"));
        assert!(xml.contains("<lastmod>2024-01-14</lastmod>"));
        assert!(xml.ends_with("</urlset>\n"));
        assert_eq!(xml.matches("<url>").count(), 2);
    }
}

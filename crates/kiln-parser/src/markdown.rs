//! Markdown converter using pulldown-cmark.

use kiln_core::url::slugify;
use pulldown_cmark::{CowStr, Event, Options, Parser, Tag, TagEnd, html};

use crate::{Converter, Result};

/// Extensions claimed when none are configured.
pub const DEFAULT_EXTENSIONS: &[&str] = &[".markdown", ".mkdown", ".mkdn", ".mkd", ".md"];

/// Markdown to HTML converter.
#[derive(Debug, Clone)]
pub struct MarkdownConverter {
    extensions: Vec<String>,
    options: Options,
}

impl Default for MarkdownConverter {
    fn default() -> Self {
        Self::new(DEFAULT_EXTENSIONS.iter().map(|e| (*e).to_string()).collect())
    }
}

impl MarkdownConverter {
    /// Create a converter claiming the given extensions (with leading dot).
    pub fn new(extensions: Vec<String>) -> Self {
        let mut options = Options::empty();
        options.insert(Options::ENABLE_TABLES);
        options.insert(Options::ENABLE_FOOTNOTES);
        options.insert(Options::ENABLE_STRIKETHROUGH);
        options.insert(Options::ENABLE_TASKLISTS);
        options.insert(Options::ENABLE_HEADING_ATTRIBUTES);

        Self {
            extensions: extensions.into_iter().map(|e| e.to_lowercase()).collect(),
            options,
        }
    }

    /// Render markdown to HTML.
    ///
    /// Headings without an explicit `{#id}` get one derived from their text.
    pub fn render(&self, content: &str) -> String {
        let mut events: Vec<Event<'_>> = Parser::new_ext(content, self.options).collect();

        let mut heading_start: Option<usize> = None;
        let mut heading_text = String::new();
        for idx in 0..events.len() {
            let closes_heading = match &events[idx] {
                Event::Start(Tag::Heading { id: None, .. }) => {
                    heading_start = Some(idx);
                    heading_text.clear();
                    false
                }
                Event::Text(text) | Event::Code(text) if heading_start.is_some() => {
                    heading_text.push_str(text);
                    false
                }
                Event::End(TagEnd::Heading(_)) => true,
                _ => false,
            };

            if closes_heading
                && let Some(start) = heading_start.take()
                && let Event::Start(Tag::Heading { id, .. }) = &mut events[start]
            {
                let slug = slugify(&heading_text, false);
                if !slug.is_empty() {
                    *id = Some(CowStr::from(slug));
                }
            }
        }

        let mut out = String::with_capacity(content.len() * 3 / 2);
        html::push_html(&mut out, events.into_iter());
        out
    }
}

impl Converter for MarkdownConverter {
    fn name(&self) -> &str {
        "markdown"
    }

    fn matches(&self, ext: &str) -> bool {
        let ext = ext.to_lowercase();
        self.extensions.iter().any(|e| *e == ext)
    }

    fn output_ext(&self, _ext: &str) -> String {
        ".html".to_string()
    }

    fn convert(&self, content: &str) -> Result<String> {
        Ok(self.render(content))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_simple_markdown() {
        let converter = MarkdownConverter::default();
        let html = converter.render("# Hello World\n\nThis is a test.");

        assert!(html.contains("<h1 id=\"hello-world\">Hello World</h1>"));
        assert!(html.contains("<p>This is a test.</p>"));
    }

    #[test]
    fn test_explicit_heading_id_is_kept() {
        let converter = MarkdownConverter::default();
        let html = converter.render("## Setup {#install}");
        assert!(html.contains("<h2 id=\"install\">Setup</h2>"));
    }

    #[test]
    fn test_code_in_heading_contributes_to_id() {
        let converter = MarkdownConverter::default();
        let html = converter.render("## The `cargo` tool");
        assert!(html.contains("id=\"the-cargo-tool\""));
    }

    #[test]
    fn test_table_rendering() {
        let converter = MarkdownConverter::default();
        let html = converter.render(
            r#"| Header 1 | Header 2 |
|----------|----------|
| Cell 1   | Cell 2   |"#,
        );

        assert!(html.contains("<table>"));
        assert!(html.contains("<thead>"));
        assert!(html.contains("<td>Cell 1</td>"));
    }

    #[test]
    fn test_task_list() {
        let converter = MarkdownConverter::default();
        let html = converter.render("- [x] Done\n- [ ] Not done");

        assert!(html.contains("checkbox"));
        assert!(html.contains("checked"));
    }

    #[test]
    fn test_matches_configured_extensions() {
        let converter = MarkdownConverter::new(vec![".md".to_string()]);
        assert!(converter.matches(".md"));
        assert!(converter.matches(".MD"));
        assert!(!converter.matches(".markdown"));
        assert_eq!(converter.output_ext(".md"), ".html");
    }

    #[test]
    fn test_raw_html_passes_through() {
        let converter = MarkdownConverter::default();
        let html = converter.convert("<div class=\"x\">hi</div>\n").unwrap();
        assert!(html.contains("<div class=\"x\">hi</div>"));
    }
}

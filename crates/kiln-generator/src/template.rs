//! Templating capability.
//!
//! The renderer only depends on the [`TemplateEngine`] trait. The built-in
//! [`SimpleEngine`] is a lightweight string interpolator rather than a full
//! template language:
//!
//! - `{{ page.title }}` looks up a dotted path in the payload
//! - `{{ page.subtitle? }}` renders nothing when the path is missing
//! - `{% link about.md %}` resolves a source path to its URL
//! - `{% post_url 2024-01-14-hello %}` resolves a post by name
//! - `{% include footer.html %}` inlines an include file

use std::borrow::Cow;

use serde_yaml::Value;
use thiserror::Error;

/// Maximum nesting of `{% include %}`.
const MAX_INCLUDE_DEPTH: usize = 16;

/// Template rendering errors.
#[derive(Debug, Error)]
pub enum TemplateError {
    /// Missing required variable.
    #[error("{template}:{line}: missing required variable `{variable}`")]
    MissingVariable {
        /// Template name.
        template: String,
        /// Line of the expression.
        line: usize,
        /// The dotted path.
        variable: String,
    },

    /// A reference that does not resolve to anything in the site.
    #[error("{template}:{line}: could not find {kind} `{target}`")]
    Lookup {
        /// Template name.
        template: String,
        /// Line of the tag.
        line: usize,
        /// What was looked up (`link`, `post_url`, `include`).
        kind: &'static str,
        /// The missing path or name.
        target: String,
    },

    /// Invalid template syntax.
    #[error("{template}:{line}: invalid template syntax: {message}")]
    InvalidSyntax {
        /// Template name.
        template: String,
        /// Line of the problem.
        line: usize,
        /// What is wrong.
        message: String,
    },
}

impl TemplateError {
    /// Whether the error is an unresolved reference.
    pub fn is_lookup(&self) -> bool {
        matches!(self, Self::Lookup { .. })
    }
}

/// Result type for template operations.
pub type Result<T> = std::result::Result<T, TemplateError>;

/// Data a template is rendered against.
#[derive(Debug, Clone)]
pub struct Payload<'a> {
    /// Site-wide data, shared by every render.
    pub site: &'a Value,
    /// The item being rendered.
    pub page: Value,
    /// Front matter of the current layout.
    pub layout: Option<Value>,
    /// Content being wrapped by the current layout.
    pub content: Option<Value>,
}

impl<'a> Payload<'a> {
    /// A payload for `page` with no layout context.
    pub fn new(site: &'a Value, page: Value) -> Self {
        Self {
            site,
            page,
            layout: None,
            content: None,
        }
    }

    /// Resolve a dotted path such as `site.data.nav`.
    pub fn lookup(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split('.');
        let root = match parts.next()? {
            "site" => self.site,
            "page" => &self.page,
            "layout" => self.layout.as_ref()?,
            "content" => self.content.as_ref()?,
            _ => return None,
        };
        parts.try_fold(root, |value, part| match value {
            Value::Mapping(map) => map.get(part),
            Value::Sequence(items) => part.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        })
    }
}

/// Cross-reference resolution offered to templates.
///
/// Implementations record a dependency edge from the item being rendered to
/// whatever they resolve.
pub trait TemplateScope: Sync {
    /// URL of the item at a source-relative path.
    fn link(&self, path: &str) -> Option<String>;

    /// URL of a post by file name without extension.
    fn post_url(&self, name: &str) -> Option<String>;

    /// Raw contents of an include file.
    fn include(&self, name: &str) -> Option<String>;
}

/// A scope that resolves nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyScope;

impl TemplateScope for EmptyScope {
    fn link(&self, _path: &str) -> Option<String> {
        None
    }

    fn post_url(&self, _name: &str) -> Option<String> {
        None
    }

    fn include(&self, _name: &str) -> Option<String> {
        None
    }
}

/// A template evaluator.
pub trait TemplateEngine: Send + Sync {
    /// Render `template`, named `name` for error messages.
    fn render(
        &self,
        name: &str,
        template: &str,
        payload: &Payload<'_>,
        scope: &dyn TemplateScope,
    ) -> Result<String>;
}

/// Interpolating engine with `link`, `post_url` and `include` tags.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimpleEngine;

impl TemplateEngine for SimpleEngine {
    fn render(
        &self,
        name: &str,
        template: &str,
        payload: &Payload<'_>,
        scope: &dyn TemplateScope,
    ) -> Result<String> {
        self.render_at_depth(name, template, payload, scope, 0)
    }
}

impl SimpleEngine {
    fn render_at_depth(
        &self,
        name: &str,
        template: &str,
        payload: &Payload<'_>,
        scope: &dyn TemplateScope,
        depth: usize,
    ) -> Result<String> {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;
        let mut line = 1;

        loop {
            let next = match (rest.find("{{"), rest.find("{%")) {
                (Some(a), Some(b)) => Some(a.min(b)),
                (a, b) => a.or(b),
            };
            let Some(start) = next else {
                out.push_str(rest);
                break;
            };

            let (text, tail) = rest.split_at(start);
            out.push_str(text);
            line += text.matches('\n').count();

            let is_tag = tail.starts_with("{%");
            let close = if is_tag { "%}" } else { "}}" };
            let end = tail.find(close).ok_or_else(|| TemplateError::InvalidSyntax {
                template: name.to_string(),
                line,
                message: format!("unclosed `{}`", &tail[..2]),
            })?;
            let inner = tail[2..end].trim();

            if is_tag {
                let rendered = self.tag(name, line, inner, payload, scope, depth)?;
                out.push_str(&rendered);
            } else {
                out.push_str(&self.expression(name, line, inner, payload)?);
            }

            line += tail[..end].matches('\n').count();
            rest = &tail[end + 2..];
        }

        Ok(out)
    }

    fn expression(&self, name: &str, line: usize, inner: &str, payload: &Payload<'_>) -> Result<String> {
        let (variable, optional) = match inner.strip_suffix('?') {
            Some(stripped) => (stripped.trim(), true),
            None => (inner, false),
        };
        if variable.is_empty() {
            return Err(TemplateError::InvalidSyntax {
                template: name.to_string(),
                line,
                message: "empty expression".to_string(),
            });
        }

        match payload.lookup(variable) {
            Some(value) => Ok(value_to_string(value).into_owned()),
            None if optional => Ok(String::new()),
            None => Err(TemplateError::MissingVariable {
                template: name.to_string(),
                line,
                variable: variable.to_string(),
            }),
        }
    }

    fn tag(
        &self,
        name: &str,
        line: usize,
        inner: &str,
        payload: &Payload<'_>,
        scope: &dyn TemplateScope,
        depth: usize,
    ) -> Result<String> {
        let (tag, argument) = match inner.split_once(char::is_whitespace) {
            Some((tag, argument)) => (tag, unquote(argument.trim())),
            None => (inner, ""),
        };

        let lookup = |kind: &'static str| TemplateError::Lookup {
            template: name.to_string(),
            line,
            kind,
            target: argument.to_string(),
        };
        let require_argument = || {
            if argument.is_empty() {
                Err(TemplateError::InvalidSyntax {
                    template: name.to_string(),
                    line,
                    message: format!("`{tag}` needs an argument"),
                })
            } else {
                Ok(())
            }
        };

        match tag {
            "link" => {
                require_argument()?;
                scope.link(argument).ok_or_else(|| lookup("link"))
            }
            "post_url" => {
                require_argument()?;
                scope.post_url(argument).ok_or_else(|| lookup("post_url"))
            }
            "include" => {
                require_argument()?;
                if depth >= MAX_INCLUDE_DEPTH {
                    return Err(TemplateError::InvalidSyntax {
                        template: name.to_string(),
                        line,
                        message: format!("includes nested deeper than {MAX_INCLUDE_DEPTH}"),
                    });
                }
                let source = scope.include(argument).ok_or_else(|| lookup("include"))?;
                self.render_at_depth(argument, &source, payload, scope, depth + 1)
            }
            other => Err(TemplateError::InvalidSyntax {
                template: name.to_string(),
                line,
                message: format!("unknown tag `{other}`"),
            }),
        }
    }
}

fn unquote(argument: &str) -> &str {
    argument
        .strip_prefix('"')
        .and_then(|a| a.strip_suffix('"'))
        .or_else(|| argument.strip_prefix('\'').and_then(|a| a.strip_suffix('\'')))
        .unwrap_or(argument)
}

/// Render a value as template output.
pub fn value_to_string(value: &Value) -> Cow<'_, str> {
    match value {
        Value::Null => Cow::Borrowed(""),
        Value::Bool(b) => Cow::Owned(b.to_string()),
        Value::Number(n) => Cow::Owned(n.to_string()),
        Value::String(s) => Cow::Borrowed(s),
        Value::Sequence(items) => Cow::Owned(
            items
                .iter()
                .map(value_to_string)
                .collect::<Vec<_>>()
                .join(", "),
        ),
        Value::Mapping(_) => Cow::Owned(serde_json::to_string(value).unwrap_or_default()),
        Value::Tagged(tagged) => value_to_string(&tagged.value),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    struct MapScope {
        links: HashMap<&'static str, &'static str>,
        includes: HashMap<&'static str, &'static str>,
    }

    impl TemplateScope for MapScope {
        fn link(&self, path: &str) -> Option<String> {
            self.links.get(path).map(|s| s.to_string())
        }

        fn post_url(&self, name: &str) -> Option<String> {
            self.links.get(name).map(|s| s.to_string())
        }

        fn include(&self, name: &str) -> Option<String> {
            self.includes.get(name).map(|s| s.to_string())
        }
    }

    fn site() -> Value {
        serde_yaml::from_str("title: My Site\ndata:\n  nav: [Home, About]\nsize: 3\n").unwrap()
    }

    fn render(template: &str) -> Result<String> {
        let site = site();
        let page: Value = serde_yaml::from_str("title: Hello").unwrap();
        SimpleEngine.render("t.html", template, &Payload::new(&site, page), &EmptyScope)
    }

    #[test]
    fn test_template_simple_render() {
        assert_eq!(render("<h1>{{ page.title }}</h1>").unwrap(), "<h1>Hello</h1>");
    }

    #[test]
    fn test_template_multiple_variables() {
        assert_eq!(
            render("{{ page.title }} - {{site.title}} ({{ site.size }})").unwrap(),
            "Hello - My Site (3)"
        );
    }

    #[test]
    fn test_template_sequence_values() {
        assert_eq!(render("{{ site.data.nav }}").unwrap(), "Home, About");
        assert_eq!(render("{{ site.data.nav.1 }}").unwrap(), "About");
    }

    #[test]
    fn test_template_optional_variable() {
        assert_eq!(render("[{{ page.subtitle? }}]").unwrap(), "[]");
    }

    #[test]
    fn test_template_missing_required_variable() {
        let err = render("line one\n{{ page.subtitle }}").unwrap_err();
        assert!(matches!(
            err,
            TemplateError::MissingVariable { ref variable, line: 2, .. } if variable == "page.subtitle"
        ));
        assert!(err.to_string().starts_with("t.html:2:"));
    }

    #[test]
    fn test_template_unclosed_delimiter() {
        let err = render("{{ page.title").unwrap_err();
        assert!(matches!(err, TemplateError::InvalidSyntax { .. }));
    }

    #[test]
    fn test_unknown_tag() {
        let err = render("{% for x in y %}").unwrap_err();
        assert!(err.to_string().contains("unknown tag `for`"));
    }

    #[test]
    fn test_layout_and_content() {
        let site = site();
        let mut payload = Payload::new(&site, Value::Null);
        payload.content = Some(Value::from("<p>body</p>"));
        payload.layout = Some(serde_yaml::from_str("name: base").unwrap());
        let out = SimpleEngine
            .render("base.html", "<main>{{ content }}</main>{{ layout.name }}", &payload, &EmptyScope)
            .unwrap();
        assert_eq!(out, "<main><p>body</p></main>base");
    }

    #[test]
    fn test_link_tags() {
        let scope = MapScope {
            links: HashMap::from([
                ("about.md", "/about/"),
                ("2024-01-14-hello", "/2024/01/14/hello.html"),
            ]),
            includes: HashMap::new(),
        };
        let site = site();
        let payload = Payload::new(&site, Value::Null);

        let out = SimpleEngine
            .render(
                "t",
                "{% link about.md %} {% post_url \"2024-01-14-hello\" %}",
                &payload,
                &scope,
            )
            .unwrap();
        assert_eq!(out, "/about/ /2024/01/14/hello.html");

        let err = SimpleEngine
            .render("t", "{% link missing.md %}", &payload, &scope)
            .unwrap_err();
        assert!(err.is_lookup());
        assert!(err.to_string().contains("missing.md"));
    }

    #[test]
    fn test_include_renders_with_same_payload() {
        let scope = MapScope {
            links: HashMap::new(),
            includes: HashMap::from([
                ("footer.html", "<footer>{{ site.title }}{% include inner.html %}</footer>"),
                ("inner.html", "!"),
                ("loop.html", "{% include loop.html %}"),
            ]),
        };
        let site = site();
        let payload = Payload::new(&site, Value::Null);

        let out = SimpleEngine
            .render("t", "{% include footer.html %}", &payload, &scope)
            .unwrap();
        assert_eq!(out, "<footer>My Site!</footer>");

        let err = SimpleEngine
            .render("t", "{% include loop.html %}", &payload, &scope)
            .unwrap_err();
        assert!(err.to_string().contains("nested"));
    }
}

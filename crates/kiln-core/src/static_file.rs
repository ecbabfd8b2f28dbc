//! Files copied to the destination unchanged.

use std::path::{Path, PathBuf};

use crate::item::SiteFile;

/// A file without front matter, copied verbatim.
#[derive(Debug, Clone)]
pub struct StaticFile {
    path: PathBuf,
    relative_path: String,
    extname: String,
    collection: Option<String>,
    url: String,
    write: bool,
}

impl StaticFile {
    /// A static file at `relative_path`, optionally inside a collection.
    ///
    /// Collection files drop the leading underscore of their directory, so
    /// `_docs/img/a.png` is served from `/docs/img/a.png`.
    pub fn new(
        path: impl Into<PathBuf>,
        relative_path: impl Into<String>,
        collection: Option<&str>,
    ) -> Self {
        let relative_path = relative_path.into();
        let extname = relative_path
            .rsplit('/')
            .next()
            .and_then(|name| name.rfind('.').filter(|&i| i > 0).map(|i| name[i..].to_string()))
            .unwrap_or_default();

        let url = match collection {
            Some(label) => {
                let marker = format!("_{label}/");
                match relative_path.find(&marker) {
                    Some(idx) => format!("/{label}/{}", &relative_path[idx + marker.len()..]),
                    None => format!("/{relative_path}"),
                }
            }
            None => format!("/{relative_path}"),
        };

        Self {
            path: path.into(),
            relative_path,
            extname,
            collection: collection.map(str::to_string),
            url,
            write: true,
        }
    }

    /// Absolute source path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Source extension with a leading dot, or empty.
    pub fn extname(&self) -> &str {
        &self.extname
    }

    /// Owning collection, if any.
    pub fn collection(&self) -> Option<&str> {
        self.collection.as_deref()
    }

    /// Whether the file is copied.
    pub fn set_write(&mut self, write: bool) {
        self.write = write;
    }
}

impl SiteFile for StaticFile {
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
        &self.extname
    }

    fn write(&self) -> bool {
        self.write
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_site_static_file() {
        let f = StaticFile::new("/site/css/main.css", "css/main.css", None);
        assert_eq!(f.url(), "/css/main.css");
        assert_eq!(f.extname(), ".css");
        assert_eq!(
            f.destination(Path::new("/out"), "/base"),
            PathBuf::from("/out/base/css/main.css")
        );
    }

    #[test]
    fn test_collection_static_file() {
        let f = StaticFile::new("/site/_docs/img/a.png", "_docs/img/a.png", Some("docs"));
        assert_eq!(f.url(), "/docs/img/a.png");
        assert_eq!(f.collection(), Some("docs"));
    }

    #[test]
    fn test_file_without_extension() {
        let f = StaticFile::new("/site/CNAME", "CNAME", None);
        assert_eq!(f.extname(), "");
        assert_eq!(f.destination(Path::new("/out"), ""), PathBuf::from("/out/CNAME"));
    }
}

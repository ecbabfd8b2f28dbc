//! Kiln Core Library
//!
//! Entity model, configuration and error handling for the Kiln site builder.

pub mod collection;
pub mod config;
pub mod document;
pub mod error;
pub mod frontmatter;
pub mod item;
pub mod page;
pub mod static_file;
pub mod url;

pub use collection::{Collection, CollectionConfig};
pub use config::Config;
pub use document::Document;
pub use error::{CoreError, Result};
pub use frontmatter::FrontMatter;
pub use item::{ItemKind, Renderable, SiteFile};
pub use page::Page;
pub use static_file::StaticFile;
pub use url::PermalinkStyle;

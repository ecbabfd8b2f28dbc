//! Pass-through converter.

use crate::{Converter, Priority, Result};

/// Claims every extension at the lowest priority and returns content as is.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityConverter;

impl Converter for IdentityConverter {
    fn name(&self) -> &str {
        "identity"
    }

    fn priority(&self) -> Priority {
        Priority::Lowest
    }

    fn matches(&self, _ext: &str) -> bool {
        true
    }

    fn output_ext(&self, ext: &str) -> String {
        ext.to_string()
    }

    fn convert(&self, content: &str) -> Result<String> {
        Ok(content.to_string())
    }
}

//! Content parsers: raw bytes in, indexable text out.
//!
//! The registry is a static list built at startup; dispatch is MIME type
//! first, then extension, then the plain-text fallback. Heavyweight
//! extraction (OCR, office documents, archives) stays outside the pipeline
//! behind this same contract.

mod json;
mod text;

pub use json::JsonParser;
pub use text::TextParser;

use anyhow::Result;

/// Extracted content for one file.
#[derive(Debug, Clone, Default)]
pub struct Parsed {
    /// Scannable text, if the bytes were readable as text.
    pub content: Option<String>,
    /// Canonical structured rendering, for formats that have one.
    pub object_content: Option<String>,
    /// Extraction metadata worth indexing alongside the content.
    pub metadata: Option<String>,
}

pub trait ContentParser: Send + Sync {
    fn name(&self) -> &'static str;

    fn extensions(&self) -> &'static [&'static str] {
        &[]
    }

    fn mime_types(&self) -> &'static [&'static str] {
        &[]
    }

    fn parse(&self, raw: &[u8]) -> Result<Parsed>;
}

/// Immutable parser registry. Add a parser by listing it in
/// [`ParserRegistry::builtin`]; the dispatch logic never changes.
pub struct ParserRegistry {
    parsers: Vec<Box<dyn ContentParser>>,
    fallback: TextParser,
}

impl ParserRegistry {
    pub fn builtin() -> Self {
        Self {
            parsers: vec![Box::new(JsonParser)],
            fallback: TextParser,
        }
    }

    pub fn for_file(&self, extension: &str, mime_type: &str) -> &dyn ContentParser {
        let mime_type = mime_type.trim();
        if !mime_type.is_empty() {
            if let Some(parser) = self
                .parsers
                .iter()
                .find(|p| p.mime_types().contains(&mime_type))
            {
                return parser.as_ref();
            }
        }

        let extension = extension.trim().to_lowercase();
        if !extension.is_empty() {
            if let Some(parser) = self
                .parsers
                .iter()
                .find(|p| p.extensions().contains(&extension.as_str()))
            {
                return parser.as_ref();
            }
        }

        &self.fallback
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_prefers_mime_then_extension_then_default() {
        let registry = ParserRegistry::builtin();
        assert_eq!(registry.for_file("", "application/json").name(), "json");
        assert_eq!(registry.for_file("json", "").name(), "json");
        assert_eq!(registry.for_file("txt", "text/plain").name(), "text");
        assert_eq!(registry.for_file("", "").name(), "text");
    }
}

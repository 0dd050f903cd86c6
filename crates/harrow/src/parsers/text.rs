use super::{ContentParser, Parsed};
use anyhow::Result;

/// Ratio of control bytes above which content is treated as binary and not
/// indexed.
const BINARY_THRESHOLD: f64 = 0.30;

/// Fallback parser: lossy UTF-8 with binary suppression.
pub struct TextParser;

impl ContentParser for TextParser {
    fn name(&self) -> &'static str {
        "text"
    }

    fn parse(&self, raw: &[u8]) -> Result<Parsed> {
        Ok(Parsed {
            content: readable_text(raw),
            ..Parsed::default()
        })
    }
}

/// Decode bytes as text, or `None` when they look binary.
pub fn readable_text(raw: &[u8]) -> Option<String> {
    if raw.is_empty() {
        return Some(String::new());
    }

    let text = String::from_utf8_lossy(raw);
    let total = text.chars().count();
    if total == 0 {
        return Some(String::new());
    }

    let junk = text
        .chars()
        .filter(|c| {
            (c.is_control() && !matches!(c, '\n' | '\r' | '\t')) || *c == char::REPLACEMENT_CHARACTER
        })
        .count();

    if junk as f64 / total as f64 > BINARY_THRESHOLD {
        return None;
    }

    Some(text.replace('\0', ""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_passes_through() {
        let parsed = TextParser.parse(b"user: admin\npass: hunter2\n").unwrap();
        assert_eq!(parsed.content.as_deref(), Some("user: admin\npass: hunter2\n"));
    }

    #[test]
    fn binary_blobs_are_suppressed() {
        let raw: Vec<u8> = (0u8..=255).cycle().take(4096).collect();
        let parsed = TextParser.parse(&raw).unwrap();
        assert!(parsed.content.is_none());
    }

    #[test]
    fn empty_input_is_empty_text() {
        assert_eq!(readable_text(b""), Some(String::new()));
    }
}

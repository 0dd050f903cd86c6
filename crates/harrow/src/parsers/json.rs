use super::text::readable_text;
use super::{ContentParser, Parsed};
use anyhow::Result;

/// JSON files: the raw text is scanned as-is, plus a canonical rendering in
/// `object_content` for structured queries in the index.
pub struct JsonParser;

impl ContentParser for JsonParser {
    fn name(&self) -> &'static str {
        "json"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["json"]
    }

    fn mime_types(&self) -> &'static [&'static str] {
        &["application/json"]
    }

    fn parse(&self, raw: &[u8]) -> Result<Parsed> {
        let content = readable_text(raw);
        let object_content = content
            .as_deref()
            .and_then(|text| serde_json::from_str::<serde_json::Value>(text).ok())
            .and_then(|value| serde_json::to_string(&value).ok());

        Ok(Parsed {
            content,
            object_content,
            metadata: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_json_gets_object_content() {
        let parsed = JsonParser.parse(br#"{ "db":  {"password": "x"} }"#).unwrap();
        assert!(parsed.content.is_some());
        assert_eq!(
            parsed.object_content.as_deref(),
            Some(r#"{"db":{"password":"x"}}"#)
        );
    }

    #[test]
    fn invalid_json_still_yields_text() {
        let parsed = JsonParser.parse(b"{ not json").unwrap();
        assert_eq!(parsed.content.as_deref(), Some("{ not json"));
        assert!(parsed.object_content.is_none());
    }
}

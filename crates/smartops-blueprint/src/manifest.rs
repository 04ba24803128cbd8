//! Multi-document manifest parsing.
//!
//! A manifest is zero or more YAML documents separated by lines holding
//! only the `---` delimiter. Blank segments are dropped; every other
//! segment must decode to a mapping.

use serde_json::Value;
use tracing::debug;

use crate::document::ResourceDocument;
use crate::error::{BlueprintError, BlueprintResult};

/// Document separator.
pub const DOCUMENT_DELIMITER: &str = "---";

/// Split manifest text into its non-blank document segments, in order.
pub fn split_documents(text: &str) -> Vec<&str> {
    let mut segments = Vec::new();
    let mut start = 0;
    let mut offset = 0;

    for line in text.split_inclusive('\n') {
        if line.trim_end() == DOCUMENT_DELIMITER {
            segments.push(&text[start..offset]);
            start = offset + line.len();
        }
        offset += line.len();
    }
    segments.push(&text[start..]);

    segments
        .into_iter()
        .filter(|segment| !is_blank(segment))
        .collect()
}

/// Whitespace and comment lines only.
fn is_blank(segment: &str) -> bool {
    segment.lines().all(|line| {
        let line = line.trim();
        line.is_empty() || line.starts_with('#')
    })
}

/// Parse manifest text into documents, preserving input order.
///
/// Segments that decode to null (for example a bare `~`) are skipped.
pub fn parse_manifest(text: &str) -> BlueprintResult<Vec<ResourceDocument>> {
    let mut documents = Vec::new();

    for (index, segment) in split_documents(text).into_iter().enumerate() {
        let value: Value = serde_yaml::from_str(segment)
            .map_err(|e| BlueprintError::Parse(format!("document {index}: {e}")))?;

        match value {
            Value::Object(fields) => documents.push(ResourceDocument::new(fields)),
            Value::Null => {
                debug!(index, "skipping empty document");
            }
            other => {
                return Err(BlueprintError::Parse(format!(
                    "document {index}: expected a mapping, found {}",
                    value_type(&other)
                )));
            }
        }
    }

    Ok(documents)
}

fn value_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a sequence",
        Value::Object(_) => "a mapping",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_discards_blank_segments() {
        let text = "---\na: 1\n---\n\n---\nb: 2\n";
        let segments = split_documents(text);
        assert_eq!(segments, vec!["a: 1\n", "b: 2\n"]);
    }

    #[test]
    fn split_ignores_dashes_inside_values() {
        let text = "name: a---b\n---\nname: c\n";
        assert_eq!(split_documents(text).len(), 2);
    }

    #[test]
    fn split_without_trailing_newline() {
        assert_eq!(split_documents("a: 1\n---\nb: 2"), vec!["a: 1\n", "b: 2"]);
    }

    #[test]
    fn split_discards_comment_only_segments() {
        let text = "# header\n---\nkind: Pod\n# trailing\n";
        assert_eq!(split_documents(text), vec!["kind: Pod\n# trailing\n"]);
    }

    #[test]
    fn parse_preserves_order() {
        let text = "kind: Service\n---\nkind: Deployment\n---\nkind: Pod\n";
        let docs = parse_manifest(text).unwrap();
        let kinds: Vec<_> = docs.iter().filter_map(|d| d.kind()).collect();
        assert_eq!(kinds, vec!["Service", "Deployment", "Pod"]);
    }

    #[test]
    fn parse_skips_null_documents() {
        let docs = parse_manifest("~\n---\nkind: Pod\n").unwrap();
        assert_eq!(docs.len(), 1);
    }

    #[test]
    fn parse_reports_malformed_yaml() {
        let err = parse_manifest("kind: Pod\n---\nmetadata: [unclosed\n").unwrap_err();
        match err {
            BlueprintError::Parse(msg) => assert!(msg.starts_with("document 1:"), "{msg}"),
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn parse_rejects_non_mapping_document() {
        let err = parse_manifest("- a\n- b\n").unwrap_err();
        assert!(matches!(err, BlueprintError::Parse(_)));
    }

    #[test]
    fn parse_empty_text() {
        assert!(parse_manifest("").unwrap().is_empty());
    }
}

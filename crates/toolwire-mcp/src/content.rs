//! Tool result content as text
//!
//! Servers answer tool calls with a plain string, a byte blob, a structured
//! map or a list of typed content items. [`ToolOutput`] names those shapes and
//! [`normalize`] turns any of them into the text handed to the agent.

use crate::protocol::{McpContent, McpToolResult};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutput {
    Text(String),
    Bytes(Vec<u8>),
    Map(Map<String, Value>),
    Items(Vec<McpContent>),
}

impl ToolOutput {
    /// Pick the shape of a `tools/call` result: typed items when present,
    /// else structured content
    pub fn from_result(result: &McpToolResult) -> Self {
        if !result.content.is_empty() {
            return ToolOutput::Items(result.content.clone());
        }
        match &result.structured_content {
            Some(value) => Self::from_value(value.clone()),
            None => ToolOutput::Text(String::new()),
        }
    }

    /// Classify an untyped JSON value
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::String(text) => ToolOutput::Text(text),
            Value::Object(map) => ToolOutput::Map(map),
            Value::Array(items) => ToolOutput::Items(
                items
                    .into_iter()
                    .map(|item| match serde_json::from_value::<McpContent>(item.clone()) {
                        Ok(content) => content,
                        Err(_) => McpContent::text(value_text(&item)),
                    })
                    .collect(),
            ),
            Value::Null => ToolOutput::Text(String::new()),
            other => ToolOutput::Text(other.to_string()),
        }
    }
}

impl From<String> for ToolOutput {
    fn from(text: String) -> Self {
        ToolOutput::Text(text)
    }
}

impl From<Vec<u8>> for ToolOutput {
    fn from(bytes: Vec<u8>) -> Self {
        ToolOutput::Bytes(bytes)
    }
}

/// Canonical text of a tool output
pub fn normalize(output: &ToolOutput) -> String {
    match output {
        ToolOutput::Text(text) => text.clone(),
        ToolOutput::Bytes(bytes) => match std::str::from_utf8(bytes) {
            Ok(text) => text.to_string(),
            Err(_) => format!("[Binary data: {} bytes]", bytes.len()),
        },
        ToolOutput::Map(map) => serde_json::to_string(map).unwrap_or_default(),
        ToolOutput::Items(items) => items
            .iter()
            .filter_map(content_text)
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

/// Text rendering of one content item; `None` for items with nothing to show
pub fn content_text(content: &McpContent) -> Option<String> {
    match content {
        McpContent::Text { text } => Some(text.clone()),
        McpContent::Image { data, mime_type } => {
            Some(format!("[Image: {} ({} bytes)]", mime_type, data.len()))
        }
        McpContent::Audio { data, mime_type } => {
            Some(format!("[Audio: {} ({} bytes)]", mime_type, data.len()))
        }
        McpContent::Resource { resource } => match (&resource.text, &resource.blob) {
            (Some(text), _) => Some(text.clone()),
            (None, Some(blob)) => Some(format!(
                "[Resource: {} ({} bytes)]",
                resource.uri,
                blob.len()
            )),
            (None, None) => Some(format!("[Resource: {}]", resource.uri)),
        },
        McpContent::ResourceLink { uri, name, .. } => Some(match name {
            Some(name) => format!("[Resource link: {} <{}>]", name, uri),
            None => format!("[Resource link: {}]", uri),
        }),
        McpContent::Unknown => None,
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_text_and_bytes() {
        assert_eq!(normalize(&ToolOutput::from("plain".to_string())), "plain");
        assert_eq!(normalize(&ToolOutput::from(b"utf8 bytes".to_vec())), "utf8 bytes");
        assert_eq!(
            normalize(&ToolOutput::Bytes(vec![0xff, 0xfe, 0x00])),
            "[Binary data: 3 bytes]"
        );
    }

    #[test]
    fn test_map_is_compact_json() {
        let output = ToolOutput::from_value(json!({"temperature": 21, "unit": "C"}));
        assert!(matches!(output, ToolOutput::Map(_)));
        let text = normalize(&output);
        let parsed: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, json!({"temperature": 21, "unit": "C"}));
    }

    #[test]
    fn test_items_joined_and_unknown_skipped() {
        let result: McpToolResult = serde_json::from_value(json!({
            "content": [
                {"type": "text", "text": "first"},
                {"type": "hologram", "payload": "?"},
                {"type": "image", "data": "aGVsbG8=", "mimeType": "image/png"},
                {"type": "resource", "resource": {"uri": "file:///a.txt", "text": "inline"}},
                {"type": "resource_link", "uri": "file:///b.txt", "name": "b"}
            ]
        }))
        .unwrap();

        let text = normalize(&ToolOutput::from_result(&result));
        assert_eq!(
            text,
            "first\n[Image: image/png (8 bytes)]\ninline\n[Resource link: b <file:///b.txt>]"
        );
    }

    #[test]
    fn test_structured_content_when_no_items() {
        let result: McpToolResult = serde_json::from_value(json!({
            "content": [],
            "structuredContent": {"ok": true}
        }))
        .unwrap();
        assert_eq!(normalize(&ToolOutput::from_result(&result)), r#"{"ok":true}"#);
    }

    #[test]
    fn test_untyped_array_items() {
        let output = ToolOutput::from_value(json!(["a", {"type": "text", "text": "b"}, 3]));
        assert_eq!(normalize(&output), "a\nb\n3");
    }
}

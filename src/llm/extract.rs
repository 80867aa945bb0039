//! Pull plain text out of a completion response body.
//!
//! Three strategies are tried in order:
//! 1. Structured: join every `{"type": "text"}` block of the `content` array.
//! 2. First element: take `content[0].text` (or `content` itself when it is a string).
//! 3. Pattern scan: find the first `"text": "..."` pair in the raw body.

use std::sync::LazyLock;

use regex_lite::Regex;
use serde_json::Value;
use tracing::debug;

use crate::error::CompletionError;

static TEXT_FIELD: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#""text"\s*:\s*"((?:[^"\\]|\\.)*)""#).ok());

/// Extract the completion text from a raw response body.
pub fn extract_text(body: &str) -> Result<String, CompletionError> {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        if let Some(text) = structured_text(&value) {
            return Ok(text);
        }
        debug!("Structured extraction found no text blocks");

        if let Some(text) = first_element_text(&value) {
            return Ok(text);
        }
        debug!("First-element extraction failed");
    } else {
        debug!("Response body is not valid JSON");
    }

    if let Some(text) = scan_text_field(body) {
        return Ok(text);
    }

    Err(CompletionError::Extraction(excerpt(body, 200)))
}

fn structured_text(value: &Value) -> Option<String> {
    let blocks = value.get("content")?.as_array()?;
    let texts: Vec<&str> = blocks
        .iter()
        .filter(|b| b.get("type").and_then(Value::as_str) == Some("text"))
        .filter_map(|b| b.get("text").and_then(Value::as_str))
        .collect();

    let joined = texts.join("");
    if joined.trim().is_empty() {
        None
    } else {
        Some(joined)
    }
}

fn first_element_text(value: &Value) -> Option<String> {
    let content = value.get("content")?;
    let text = match content {
        Value::String(s) => s.as_str(),
        Value::Array(items) => items.first()?.get("text")?.as_str()?,
        _ => return None,
    };
    if text.trim().is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

fn scan_text_field(body: &str) -> Option<String> {
    let re = TEXT_FIELD.as_ref()?;
    let raw = re.captures(body)?.get(1)?.as_str();
    // Reuse the JSON string decoder for escapes like \n and \uXXXX.
    let decoded: String = serde_json::from_str(&format!("\"{raw}\"")).ok()?;
    if decoded.trim().is_empty() {
        None
    } else {
        Some(decoded)
    }
}

/// First `max_chars` characters of `text`, for diagnostics.
pub fn excerpt(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= max_chars {
        trimmed.to_string()
    } else {
        let cut: String = trimmed.chars().take(max_chars).collect();
        format!("{cut}...")
    }
}

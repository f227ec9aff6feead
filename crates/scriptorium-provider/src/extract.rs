//! Embedded-JSON extraction.
//!
//! Providers asked for structured output return free text containing exactly
//! one JSON object, usually wrapped in prose or code fences. The contract is:
//! take the first balanced top-level `{...}` in the response and parse it; if
//! there is none, fail deterministically. No guessing, no repair.

use serde_json::Value;

use crate::ProviderError;

/// Extract and parse the first balanced top-level JSON object in `text`.
pub fn extract_json(text: &str) -> Result<Value, ProviderError> {
    let candidate = first_balanced_object(text).ok_or_else(|| {
        ProviderError::MalformedOutput("no json object found in provider output".into())
    })?;
    serde_json::from_str(candidate).map_err(|e| {
        ProviderError::MalformedOutput(format!("embedded json failed to parse: {e}"))
    })
}

/// Locate the first `{...}` span with balanced braces, ignoring braces inside
/// JSON string literals.
fn first_balanced_object(text: &str) -> Option<&str> {
    let bytes = text.as_bytes();
    let start = text.find('{')?;

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &byte) in bytes[start..].iter().enumerate() {
        if escaped {
            escaped = false;
            continue;
        }
        match byte {
            b'\\' if in_string => escaped = true,
            b'"' => in_string = !in_string,
            b'{' if !in_string => depth += 1,
            b'}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

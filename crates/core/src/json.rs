//! JSON embedded in model replies.
//!
//! Models often wrap the object they were asked for in a fenced block or a
//! sentence of prose. Everything from the first `{` to the last `}` is taken
//! as the candidate object.

use serde_json::{Map, Value};

/// Parse the outermost `{ ... }` span of `text` as a JSON object.
pub fn extract_object(text: &str) -> Option<Map<String, Value>> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    match serde_json::from_str::<Value>(&text[start..=end]) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

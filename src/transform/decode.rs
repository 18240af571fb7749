//! Defensive decoding of documents embedded as strings.

use serde_json::Value;
use tracing::{debug, warn};

use crate::elide::elide;
use crate::literal;

// Bound on nested string encodings unwrapped in one go.
const MAX_DECODE_DEPTH: usize = 4;

/// Structured value for `value`, decoding it first when it arrived as a string.
///
/// Returns `None` when a string cannot be recovered; the offending text is
/// logged (elided) so the loss is never silent.
pub(crate) fn decode_embedded(value: &Value, what: &str) -> Option<Value> {
    match value {
        Value::String(text) => decode_text(text, what),
        other => Some(other.clone()),
    }
}

/// Decode `text` as JSON, falling back to the strict literal parser.
///
/// Values that decode to yet another string are decoded again.
pub(crate) fn decode_text(text: &str, what: &str) -> Option<Value> {
    if text.trim().is_empty() {
        debug!("Treating blank {what} as absent");
        return None;
    }
    let mut decoded = parse_embedded(text, what)?;
    for _ in 1..MAX_DECODE_DEPTH {
        match decoded {
            Value::String(inner) => decoded = parse_embedded(&inner, what)?,
            other => return Some(other),
        }
    }
    Some(decoded)
}

fn parse_embedded(text: &str, what: &str) -> Option<Value> {
    let json_error = match serde_json::from_str::<Value>(text) {
        Ok(value) => return Some(value),
        Err(err) => err,
    };
    match literal::parse(text) {
        Ok(value) => {
            debug!("Recovered {what} with the literal parser ({json_error})");
            Some(value)
        }
        Err(literal_error) => {
            warn!(
                "Dropping unrecoverable {what} ({json_error}; {literal_error}): '{}'",
                elide(text)
            );
            None
        }
    }
}

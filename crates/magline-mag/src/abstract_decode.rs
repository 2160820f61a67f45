//! Rebuild abstract text from the service's inverted-index form
//!
//! Paper abstracts (`IA`) are not returned as text but as word positions:
//! ```json
//! {"IndexLength": 4, "InvertedIndex": {"the": [0, 2], "cat": [1], "sat": [3]}}
//! ```

use serde_json::{Map, Value};

/// Join words back into text ordered by position.
///
/// Accepts either the bare `{word: [positions]}` map or the wrapped form
/// with `IndexLength`/`InvertedIndex`.
pub fn decode_inverted_index(index: &Map<String, Value>) -> String {
    let index = match index.get("InvertedIndex").and_then(Value::as_object) {
        Some(inner) => inner,
        None => index,
    };

    let mut pairs: Vec<(u64, &str)> = index
        .iter()
        .filter_map(|(word, positions)| Some((word, positions.as_array()?)))
        .flat_map(|(word, positions)| {
            positions
                .iter()
                .filter_map(Value::as_u64)
                .map(move |p| (p, word.as_str()))
        })
        .collect();
    pairs.sort_by_key(|(pos, _)| *pos);

    let words: Vec<&str> = pairs.into_iter().map(|(_, w)| w).collect();
    words.join(" ")
}

/// Decode an optional `IA` value; `None` for null, non-objects and empty text.
pub fn decode_abstract(value: Option<&Value>) -> Option<String> {
    let text = decode_inverted_index(value?.as_object()?);
    if text.is_empty() { None } else { Some(text) }
}

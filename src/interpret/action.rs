use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

use super::Extracted;

/// Keys of the blocks an action response is expected to carry.
pub const PREFERENCE: &str = "preference";
pub const FACIAL_EXPRESSION: &str = "facialexpression";
pub const PHYSIOLOGICAL_EXPRESSION: &str = "physiologicalexpression";
pub const FELT_EXPRESSION: &str = "feltexpression";
pub const MOVE: &str = "move";

const BLOCK_KEYS: [&str; 5] = [
    PREFERENCE,
    FACIAL_EXPRESSION,
    PHYSIOLOGICAL_EXPRESSION,
    FELT_EXPRESSION,
    MOVE,
];

/// `"key": {` opening of each block, optional quotes around the key.
static BLOCK_OPENINGS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    BLOCK_KEYS
        .iter()
        .map(|key| {
            let pattern = format!(r#"(?is)"?{}"?\s*:\s*\{{"#, regex::escape(key));
            (*key, Regex::new(&pattern).expect("block opening pattern"))
        })
        .collect()
});

static TRAILING_COMMA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r",\s*\}").expect("trailing comma pattern"));

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Emotion {
    pub facialexpression: Map<String, Value>,
    pub physiologicalexpression: Map<String, Value>,
    pub feltexpression: Map<String, Value>,
}

/// Emotional and physical plan reassembled from the five blocks.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ActionPlan {
    pub preference: Map<String, Value>,
    pub emotion: Emotion,
    #[serde(rename = "move")]
    pub movement: Map<String, Value>,
}

impl ActionPlan {
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

/// Lower-case the response and extract every block independently; a block
/// that is missing or malformed becomes an empty mapping.
pub fn parse(text: &str) -> ActionPlan {
    let text = text.to_lowercase();
    let block = |key: &str| {
        let extracted = extract_block(&text, key);
        if let Extracted::Malformed(ref reason) = extracted {
            debug!(key, "action block degraded to empty: {reason}");
        }
        extracted.into_value_or_default()
    };

    ActionPlan {
        preference: block(PREFERENCE),
        emotion: Emotion {
            facialexpression: block(FACIAL_EXPRESSION),
            physiologicalexpression: block(PHYSIOLOGICAL_EXPRESSION),
            feltexpression: block(FELT_EXPRESSION),
        },
        movement: block(MOVE),
    }
}

/// Locate `"key": { ... }` ending at the first `}` followed by `,`, a newline
/// or the end of text, repair quoting and trailing commas, and parse it.
///
/// Only the five plan keys are recognised; any other key is `Missing`.
pub fn extract_block(text: &str, key: &str) -> Extracted<Map<String, Value>> {
    let Some((_, opening)) = BLOCK_OPENINGS.iter().find(|(k, _)| *k == key) else {
        return Extracted::Missing;
    };
    let text = text.replace('\'', "\"");
    let Some(open) = opening.find(&text) else {
        return Extracted::Missing;
    };

    let Some(close) = closing_brace(&text, open.end()) else {
        return Extracted::Missing;
    };
    let raw = &text[open.start()..=close];

    let repaired = TRAILING_COMMA.replace_all(raw, "}");
    let Some((_, body)) = repaired.split_once(':') else {
        return Extracted::Missing;
    };

    match serde_json::from_str::<Map<String, Value>>(body.trim()) {
        Ok(map) => Extracted::Found(map),
        Err(e) => Extracted::Malformed(e.to_string()),
    }
}

/// Byte offset of the first `}` at or after `from` that is followed by a
/// delimiter (`,`, newline or end of text), else of the first `}` at all.
fn closing_brace(text: &str, from: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let braces = move || (from..bytes.len()).filter(move |&i| bytes[i] == b'}');
    braces()
        .find(|&i| matches!(bytes.get(i + 1), None | Some(b',') | Some(b'\n')))
        .or_else(|| braces().next())
}

use serde::{Deserialize, Serialize};

use crate::protocol::image::base64_opt;

/// Condensed form of an exchange, replayed as context for related turns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub input: String,
    pub output: String,
}

/// One persisted conversational exchange. Appended once, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    /// 1-based, monotonic per identity key.
    pub index: usize,
    pub timestamp: i64,
    pub context: Option<String>,
    pub triples: String,
    pub query: String,
    pub inner_speech: String,
    pub output: String,
    #[serde(default)]
    pub summary: Option<Summary>,
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
    #[serde(default, with = "base64_opt")]
    pub image: Option<Vec<u8>>,
}

/// Export shape of a [`Turn`]: no embedding, no image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanTurn {
    pub index: usize,
    pub timestamp: i64,
    pub context: Option<String>,
    pub triples: String,
    pub query: String,
    pub inner_speech: String,
    pub output: String,
    pub summary: Option<Summary>,
}

impl From<&Turn> for CleanTurn {
    fn from(turn: &Turn) -> Self {
        Self {
            index: turn.index,
            timestamp: turn.timestamp,
            context: turn.context.clone(),
            triples: turn.triples.clone(),
            query: turn.query.clone(),
            inner_speech: turn.inner_speech.clone(),
            output: turn.output.clone(),
            summary: turn.summary.clone(),
        }
    }
}

/// A preference-update request and the triplets extracted from its output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreferenceUpdate {
    pub index: usize,
    pub timestamp: i64,
    pub context: String,
    pub triples: String,
    pub query: String,
    /// Full model output the triplets were extracted from.
    pub preference_updating: String,
    /// Surviving `entity | attribute | value` triplets, in output order.
    pub list: Vec<String>,
}

/// Predicted emotional/physical plan of an agent. Keyed by host only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRecord {
    pub timestamp: i64,
    pub triples: String,
    pub full_output: String,
    pub output: serde_json::Value,
    #[serde(default, with = "base64_opt")]
    pub image: Option<Vec<u8>>,
}

pub mod image;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, warn};

use crate::types::IdentityKey;

/// Marker separating the optional image payload from the protocol fields.
pub const IMAGE_MARKER: &str = "image: ";

/// Literal the protocol uses for an absent field.
pub const NONE_FIELD: &str = "None";

/// Opening of the belief sub-structure inside the triples field.
const BELIEF_SEGMENT: &str = "'belief at t step': {";

/// Belief entries kept for preference updates.
const BELIEF_MARKERS: [&str; 5] = [
    "preference towards",
    "Position",
    "position",
    "Orientation",
    "orientation",
];

/// Number of `#`-separated fields, task code included.
pub const FIELD_COUNT: usize = 6;

/// The four task modes a request can be routed through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskCode {
    /// Preference update.
    PU,
    /// Action prediction.
    AP,
    /// Question answering.
    QA,
    /// Follow-up on the last questions.
    LQ,
}

impl TaskCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskCode::PU => "PU",
            TaskCode::AP => "AP",
            TaskCode::QA => "QA",
            TaskCode::LQ => "LQ",
        }
    }
}

impl fmt::Display for TaskCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskCode {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PU" => Ok(TaskCode::PU),
            "AP" => Ok(TaskCode::AP),
            "QA" => Ok(TaskCode::QA),
            "LQ" => Ok(TaskCode::LQ),
            other => Err(DecodeError::UnknownTask(other.to_string())),
        }
    }
}

/// Why a protocol line could not be decoded. Never fatal: the caller skips the line.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("task is not identified: '{0}'")]
    UnknownTask(String),

    #[error("expected {expected} '#'-separated fields, got {actual}")]
    FieldCount { expected: usize, actual: usize },
}

/// A decoded protocol request. Immutable once built; threaded through the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub task: TaskCode,
    pub user: String,
    pub host: String,
    pub instruction: String,
    /// Belief-state snippet; already filtered for PU requests.
    pub triples: String,
    pub query: String,
    pub image: Option<Vec<u8>>,
}

impl Request {
    pub fn key(&self) -> IdentityKey {
        IdentityKey::new(&self.host, &self.user)
    }
}

/// Decode a raw protocol line: `TASKCODE#user#host#instruction#triples#query`,
/// optionally followed by `image: <payload>`.
pub fn decode(raw: &str) -> Result<Request, DecodeError> {
    let (text, image) = match raw.split_once(IMAGE_MARKER) {
        Some((text, payload)) => (text, Some(image::decode_payload(payload))),
        None => (raw, None),
    };

    let fields: Vec<&str> = text.split('#').collect();
    let task: TaskCode = fields[0].trim().parse()?;

    if fields.len() != FIELD_COUNT {
        return Err(DecodeError::FieldCount {
            expected: FIELD_COUNT,
            actual: fields.len(),
        });
    }

    let triples = fields[4].trim();
    let triples = match task {
        TaskCode::PU if triples != NONE_FIELD => filter_belief_triples(triples),
        _ => triples.to_string(),
    };

    let request = Request {
        task,
        user: fields[1].trim().to_string(),
        host: fields[2].trim().to_string(),
        instruction: fields[3].trim().to_string(),
        triples,
        query: fields[5].trim().to_string(),
        image,
    };

    debug!(
        task = %request.task,
        host = %request.host,
        user = %request.user,
        has_image = request.image.is_some(),
        "decoded request"
    );
    Ok(request)
}

/// Keep only the preference, position and orientation entries of the
/// `'belief at t step': {...}` segment, comma-space joined in original order.
pub fn filter_belief_triples(triples: &str) -> String {
    let Some((_, rest)) = triples.split_once(BELIEF_SEGMENT) else {
        warn!("no belief segment in triples, nothing kept");
        return String::new();
    };
    let current = rest.split('}').next().unwrap_or_default();

    current
        .split(", ")
        .filter(|entry| BELIEF_MARKERS.iter().any(|m| entry.contains(m)))
        .collect::<Vec<_>>()
        .join(", ")
}

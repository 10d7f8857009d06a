//! Deterministic extraction of structured records from raw model text.
//!
//! Every parser is best-effort: it never fails, and anything it cannot find
//! degrades to an empty value.

pub mod action;
pub mod lq;
pub mod preference;
pub mod qa;
pub mod text;

/// Outcome of locating and parsing one structured block.
///
/// Separates "nothing there" from "there but unparsable" for callers that
/// care; [`Extracted::into_value_or_default`] conflates them.
#[derive(Debug, Clone, PartialEq)]
pub enum Extracted<T> {
    Found(T),
    Missing,
    Malformed(String),
}

impl<T: Default> Extracted<T> {
    pub fn into_value_or_default(self) -> T {
        match self {
            Extracted::Found(value) => value,
            Extracted::Missing | Extracted::Malformed(_) => T::default(),
        }
    }
}

const UPDATING_MARKER: &str = "Updating:";
const REASONING_MARKER: &str = "Reasoning:";
const TRIPLET_DELIMITER: &str = "', '";

/// Result returned when no preference triplet survives filtering.
pub const NO_UPDATE: &str = "no update";

/// Triplets of a preference-update response.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PreferenceOutput {
    /// `entity | attribute | value` entries naming a preference, in order.
    pub triplets: Vec<String>,
}

impl PreferenceOutput {
    /// Comma-joined triplets, or [`NO_UPDATE`].
    pub fn summary(&self) -> String {
        if self.triplets.is_empty() {
            NO_UPDATE.to_string()
        } else {
            self.triplets.join(", ")
        }
    }
}

/// Extract the triplets listed between `Updating:` and `Reasoning:`.
pub fn parse(text: &str) -> PreferenceOutput {
    let start = text
        .find(UPDATING_MARKER)
        .map_or(0, |i| i + UPDATING_MARKER.len());
    let end = text[start..]
        .find(REASONING_MARKER)
        .map_or(text.len(), |i| start + i);
    let updating = &text[start..end];

    let triplets = updating
        .split(TRIPLET_DELIMITER)
        .map(trim_triplet)
        .filter(|t| t.contains('|') && t.contains("preference towards"))
        .map(str::to_string)
        .collect();

    PreferenceOutput { triplets }
}

fn trim_triplet(raw: &str) -> &str {
    raw.trim()
        .trim_matches('[')
        .trim_matches(']')
        .trim_matches('\'')
}

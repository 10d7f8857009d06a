use super::text::{capitalize, scan_sections, section_raw};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Answer,
    Inference,
}

/// Answer and supporting inference of a follow-up response, as scanned:
/// cleaned, lower-cased and space-joined, not yet trimmed or capitalised.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LqOutput {
    pub inference: String,
    pub answer: String,
}

impl LqOutput {
    /// The answer returned to the caller.
    pub fn answer_text(&self) -> String {
        capitalize(self.answer.trim())
    }

    pub fn inference_text(&self) -> String {
        capitalize(self.inference.trim())
    }
}

/// Split a follow-up response into its `answer:` and `inference` sections.
pub fn parse(text: &str) -> LqOutput {
    let lines = scan_sections(text, |line| {
        if line.contains("answer:") {
            Some((Section::Answer, line.replace("answer:", "")))
        } else if line.contains("inference") {
            Some((Section::Inference, line.replace("inference:", "")))
        } else {
            None
        }
    });

    LqOutput {
        inference: section_raw(&lines, Section::Inference),
        answer: section_raw(&lines, Section::Answer),
    }
}

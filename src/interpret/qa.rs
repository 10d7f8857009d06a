use super::text::{scan_sections, section_text};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Inner,
    Output,
}

/// Inner speech and expressed answer of a question-answering response.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct QaOutput {
    pub inner_speech: String,
    pub output: String,
}

/// Split a QA response into its `inner speech:`/`reasoning:` and
/// `output:`/`query:` sections.
pub fn parse(text: &str) -> QaOutput {
    let lines = scan_sections(text, |line| {
        if line.contains("inner speech:") || line.contains("reasoning:") {
            let stripped = line.replace("inner speech:", "").replace("reasoning:", "");
            Some((Section::Inner, stripped))
        } else if line.contains("output:") || line.contains("query:") {
            let stripped = line.replace("output:", "").replace("query:", "");
            Some((Section::Output, stripped))
        } else {
            None
        }
    });

    QaOutput {
        inner_speech: section_text(&lines, Section::Inner),
        output: section_text(&lines, Section::Output),
    }
}

/// Punctuation kept by [`clean_line`].
const KEPT_PUNCTUATION: &[char] = &['.', ',', '!', '?', '\'', '-', ':'];

/// Normalise one line of model output before header matching: drop every
/// character that is not a word character, whitespace or kept punctuation,
/// collapse whitespace runs, trim and lowercase.
pub fn clean_line(line: &str) -> String {
    let kept: String = line
        .chars()
        .filter(|c| {
            c.is_alphanumeric() || *c == '_' || c.is_whitespace() || KEPT_PUNCTUATION.contains(c)
        })
        .collect();
    kept.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// First character upper-cased, the rest lower-cased.
pub fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}

/// Line-oriented section accumulator shared by the QA and LQ parsers.
///
/// `header` inspects each cleaned line; when it recognises a header it returns
/// the section being opened and the line with its prefix removed. Non-empty
/// lines accumulate into whichever section is open.
pub fn scan_sections<S: Copy + PartialEq>(
    text: &str,
    header: impl Fn(&str) -> Option<(S, String)>,
) -> Vec<(S, String)> {
    let mut current: Option<S> = None;
    let mut lines = Vec::new();

    for raw in text.split('\n') {
        let mut line = clean_line(raw);
        if let Some((section, stripped)) = header(&line) {
            current = Some(section);
            line = stripped;
        }
        if let Some(section) = current {
            if !line.is_empty() {
                lines.push((section, line));
            }
        }
    }
    lines
}

/// Space-join the lines of one section as scanned.
pub fn section_raw<S: Copy + PartialEq>(lines: &[(S, String)], section: S) -> String {
    lines
        .iter()
        .filter(|(s, _)| *s == section)
        .map(|(_, line)| line.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

/// [`section_raw`], trimmed and capitalised.
pub fn section_text<S: Copy + PartialEq>(lines: &[(S, String)], section: S) -> String {
    capitalize(section_raw(lines, section).trim())
}

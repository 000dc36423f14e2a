use once_cell::sync::Lazy;
use regex::Regex;

pub const MAX_DESCRIPTION_CHARS: usize = 500;
const ELLIPSIS: &str = "...";

static LINE_BREAK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<br\s*/?>").expect("line break regex"));

pub fn clean_text(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Turns `<br>` tags into newlines and caps the result at
/// [`MAX_DESCRIPTION_CHARS`] characters, ellipsis included.
pub fn normalize_description(raw: &str) -> Option<String> {
    let replaced = LINE_BREAK_RE.replace_all(raw, "\n");
    let text = replaced.trim();
    if text.is_empty() {
        return None;
    }
    if text.chars().count() <= MAX_DESCRIPTION_CHARS {
        return Some(text.to_string());
    }
    let kept: String = text
        .chars()
        .take(MAX_DESCRIPTION_CHARS - ELLIPSIS.len())
        .collect();
    Some(format!("{kept}{ELLIPSIS}"))
}

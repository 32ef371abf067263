use crate::parsers::ParseResult;

/// Parses plain text content (no links)
///
/// Each line is trimmed and has its inner whitespace collapsed; blank lines
/// are dropped so that reflowing blank space does not register as a change.
pub fn parse(text: &str) -> ParseResult {
    ParseResult::content_only(normalize_lines(text))
}

/// Splits text into trimmed, whitespace-collapsed, non-empty lines
pub fn normalize_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(collapse_whitespace)
        .filter(|line| !line.is_empty())
        .collect()
}

/// Normalizes whitespace within a single line or paragraph
pub fn collapse_whitespace(segment: &str) -> String {
    segment.split_whitespace().collect::<Vec<_>>().join(" ")
}

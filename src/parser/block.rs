use std::sync::LazyLock;

use regex::Regex;

static PASSAGE_OPEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<div\b[^>]*class="(?:[^"]*\s)?passage-text(?:\s[^"]*)?""#).unwrap()
});

/// Where a balanced walk stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Span {
    /// Depth returned to zero; the offset is just past the matching close tag.
    Closed(usize),
    /// Close tags ran out while still nested. The offset is just past the
    /// last close tag consumed, or `from` if there was none.
    Unclosed(usize),
}

/// Walks forward from `from` (just past an opening tag of `tag`) counting
/// nested `<tag` / `</tag>` pairs until depth returns to zero.
///
/// Tag names are matched ASCII case-insensitively. `<tag` only counts as an
/// opener when followed by whitespace, `>` or `/`, so `<div` never matches
/// `<divider`.
pub fn balanced_end(text: &str, from: usize, tag: &str) -> Span {
    let haystack = text.as_bytes();
    let open = format!("<{}", tag.to_ascii_lowercase());
    let close = format!("</{}>", tag.to_ascii_lowercase());

    let mut pos = from;
    let mut last_close = from;
    let mut depth = 1usize;
    while pos < haystack.len() && depth > 0 {
        let Some(next_close) = find_ci(haystack, close.as_bytes(), pos) else {
            return Span::Unclosed(last_close);
        };
        match find_opener(haystack, open.as_bytes(), pos) {
            Some(next_open) if next_open < next_close => {
                depth += 1;
                pos = next_open + open.len();
            }
            _ => {
                depth -= 1;
                pos = next_close + close.len();
                last_close = pos;
            }
        }
    }

    if depth == 0 {
        Span::Closed(pos)
    } else {
        Span::Unclosed(last_close)
    }
}

/// Locate the passage container and return the substring spanning it.
///
/// Returns `None` when the container signature is missing or its opening tag
/// is never terminated. An unclosed container is cut after the last close tag
/// the walk consumed, so trailing page chrome is not pulled in.
pub fn extract(raw: &str) -> Option<&str> {
    let start = PASSAGE_OPEN_RE.find(raw)?.start();
    let open_end = raw[start..].find('>')? + start + 1;

    match balanced_end(raw, open_end, "div") {
        Span::Closed(end) => Some(&raw[start..end]),
        Span::Unclosed(end) => {
            tracing::debug!(start, end, "passage container never closed, cutting at last close tag");
            Some(&raw[start..end])
        }
    }
}

fn find_ci(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if needle.is_empty() || from >= haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|w| w.eq_ignore_ascii_case(needle))
        .map(|i| i + from)
}

fn find_opener(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    let mut pos = from;
    while let Some(idx) = find_ci(haystack, needle, pos) {
        match haystack.get(idx + needle.len()) {
            Some(b) if b.is_ascii_whitespace() || *b == b'>' || *b == b'/' => return Some(idx),
            None => return Some(idx),
            _ => pos = idx + 1,
        }
    }
    None
}

pub mod block;
pub mod rules;
pub mod verses;

use std::panic::{self, AssertUnwindSafe};
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use tracing::{debug, warn};

pub(crate) static VERSE_MARKER_OPEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)<sup class="verse-number">"#).unwrap());
pub(crate) static VERSE_MARKER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<sup class="verse-number">\s*([0-9]+)\s*</sup>"#).unwrap()
});
static TITLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<h1\b[^>]*class="passage-title"[^>]*>(.*?)</h1>"#).unwrap()
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerseRecord {
    pub verse: u32,
    pub text: String,
}

/// Cleaned passage markup (zero or one block) plus its verses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PassageResult {
    pub content: Vec<String>,
    pub verses: Vec<VerseRecord>,
}

/// Three-stage pipeline: raw page → passage block → cleaned block → verses.
///
/// Never fails: a missing container, or anything going wrong on the way,
/// yields an empty result.
pub fn extract_passage(raw: &str) -> PassageResult {
    match panic::catch_unwind(AssertUnwindSafe(|| run_pipeline(raw))) {
        Ok(result) => result,
        Err(_) => {
            warn!(len = raw.len(), "passage extraction panicked, returning empty result");
            PassageResult::default()
        }
    }
}

fn run_pipeline(raw: &str) -> PassageResult {
    let Some(block) = block::extract(raw) else {
        debug!(len = raw.len(), "no passage container found");
        return PassageResult::default();
    };

    let (cleaned, traces) = rules::clean_traced(block);
    let verses = verses::segment(&cleaned);
    let touched: Vec<&str> = traces
        .iter()
        .filter(|t| t.before != t.after)
        .map(|t| t.rule)
        .collect();
    debug!(
        block_len = block.len(),
        cleaned_len = cleaned.len(),
        verses = verses.len(),
        ?touched,
        "extracted passage"
    );

    PassageResult {
        content: vec![cleaned],
        verses,
    }
}

/// Cleaned inner text of the page's passage title, or empty.
pub fn extract_title(raw: &str) -> String {
    TITLE_RE
        .captures(raw)
        .and_then(|caps| caps.get(1))
        .map(|m| rules::clean(m.as_str()))
        .unwrap_or_default()
}

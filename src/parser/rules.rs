use std::sync::LazyLock;

use regex::{Captures, Regex};
use tracing::debug;

use super::block::{balanced_end, Span};
use super::{VERSE_MARKER_OPEN_RE, VERSE_MARKER_RE};

/// A single textual rewrite inside a rule.
pub enum Rewrite {
    /// Plain regex replacement (capture references allowed in `with`).
    Replace { re: Regex, with: &'static str },
    /// Remove every match, re-emitting any verse markers found inside it.
    Strip(Regex),
    /// Remove `<sup>` elements whose opening tag is not a verse marker.
    StripUnlessVerse(Regex),
    /// Remove elements opened by `open` through their balanced close tag.
    /// The tag name is taken from the `tag` capture group.
    StripContainer(Regex),
    /// Remove from each `start` match up to the next `stop` match or end of text.
    StripUntil { start: Regex, stop: &'static LazyLock<Regex> },
    /// Turn the first chapter-number element into a verse 1 marker when no
    /// verse 1 marker exists.
    SynthesizeVerseOne(Regex),
    CollapseWhitespace,
}

pub struct Rule {
    pub name: &'static str,
    rewrites: Vec<Rewrite>,
}

/// Character counts around one rule application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleTrace {
    pub rule: &'static str,
    pub before: usize,
    pub after: usize,
}

static VERSE_ONE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)<sup class="verse-number">\s*1\s*</sup>"#).unwrap());
static MARKUP_START_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new("<").unwrap());
static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

// Book/chapter:verse citation, optionally prefixed by a numbered-book digit.
const CITATION: &str = r"(?:[1-3]\s*)?[A-Za-z]+(?:\s+[A-Za-z]+)*\s+[0-9]+:[0-9]+";
const NBSP: &str = r"(?:\s|&nbsp;|&#160;)*";

fn re(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap()
}

/// The stripping pipeline, in application order.
pub static RULES: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    vec![
        Rule {
            name: "canonicalize_verse_numbers",
            rewrites: vec![Rewrite::Replace {
                re: re(&format!(r"(?i)<sup\b[^>]*>{NBSP}([0-9]+){NBSP}</sup>")),
                with: r#"<sup class="verse-number">${1}</sup>"#,
            }],
        },
        Rule {
            name: "drop_other_superscripts",
            rewrites: vec![Rewrite::StripUnlessVerse(re(r"(?i)<sup\b[^>]*>.*?</sup>"))],
        },
        Rule {
            name: "drop_inline_callouts",
            rewrites: vec![Rewrite::StripContainer(re(
                r#"(?i)<(?P<tag>sup|span|a|div)\b[^>]*(?:\bclass|\bid|\bdata-[\w-]*)="[^"]*(?:footnote|crossref)[^"]*"[^>]*>"#,
            ))],
        },
        Rule {
            name: "drop_note_containers",
            rewrites: vec![Rewrite::StripContainer(re(
                r#"(?i)<(?P<tag>div|ol|ul)\b[^>]*\bclass="[^"]*(?:footnotes?|crossreference|crossrefs)[^"]*"[^>]*>"#,
            ))],
        },
        Rule {
            name: "drop_footnote_items",
            rewrites: vec![Rewrite::Strip(re(
                r#"(?i)<li\b[^>]*\bid="(?:footnote|fen)-[^"]+"[^>]*>[\s\S]*?</li>"#,
            ))],
        },
        Rule {
            name: "drop_note_anchors",
            rewrites: vec![Rewrite::Strip(re(
                r##"(?i)<a\b[^>]*\bhref="#[^"]*(?:footnote|crossref|fnt|fen|fn|cr)[^"]*"[^>]*>[\s\S]*?</a>"##,
            ))],
        },
        Rule {
            name: "drop_bare_callouts",
            rewrites: vec![
                Rewrite::Strip(re(r"(?i)<a\b[^>]*>\s*[\[(]?[a-z0-9*†]{1,2}[\])]?\s*</a>")),
                Rewrite::Strip(re(r"\[[a-zA-Z0-9*†]\]")),
                Rewrite::Strip(re(r"\([a-zA-Z0-9*†]\)")),
                Rewrite::Strip(re(r"[†*]")),
            ],
        },
        Rule {
            name: "synthesize_verse_one",
            rewrites: vec![Rewrite::SynthesizeVerseOne(re(&format!(
                r#"(?i)<span\b[^>]*\bclass="[^"]*chapternum[^"]*"[^>]*>{NBSP}[0-9]+{NBSP}</span>"#
            )))],
        },
        Rule {
            name: "drop_editorial_notes",
            rewrites: vec![Rewrite::StripUntil {
                start: re(r"(?i)\b(?:Hebrew|Greek|Aramaic|That\s+is|Or|Septuagint|LXX)\b"),
                stop: &VERSE_MARKER_OPEN_RE,
            }],
        },
        Rule {
            name: "drop_read_full_chapter",
            rewrites: vec![
                Rewrite::Strip(re(r"(?i)<a\b[^>]*>\s*Read\s+full\s+chapter[\s\S]*?</a>")),
                Rewrite::StripUntil {
                    start: re(r"(?i)\bRead\s+full\s+chapter\b"),
                    stop: &MARKUP_START_RE,
                },
            ],
        },
        Rule {
            name: "drop_footnotes_appendix",
            rewrites: vec![Rewrite::Strip(re(
                r"(?i)<h[1-6]\b[^>]*>\s*Footnotes\s*</h[1-6]>[\s\S]*$",
            ))],
        },
        Rule {
            name: "drop_citations",
            rewrites: vec![
                Rewrite::Strip(re(&format!(r"(?i)\b{CITATION}\s*:"))),
                Rewrite::Strip(re(&format!(
                    r"(?i)\b{CITATION}(?:-[0-9]+)?\s+(?:Hebrew|Or|That\s+is|Septuagint|LXX)[^<]+"
                ))),
                Rewrite::Strip(re(&format!(r"(?i)\s*:\s*{CITATION}(?:-[0-9]+)?"))),
                Rewrite::Strip(re(&format!(r"(?i)\s+{CITATION}(?:-[0-9]+)?\b"))),
                Rewrite::Strip(re(&format!(r"(?i)(?:\s*:\s*{CITATION}(?:-[0-9]+)?)+\s*$"))),
                Rewrite::Strip(re(r"\s*\b[0-9]+:[0-9]+\b\s*$")),
            ],
        },
        Rule {
            name: "drop_translation_boilerplate",
            rewrites: vec![Rewrite::Strip(re(
                r"(?i)\s*in\s+all\s+english\s+translations[\s\S]*$",
            ))],
        },
        Rule {
            name: "collapse_whitespace",
            rewrites: vec![Rewrite::CollapseWhitespace],
        },
    ]
});

impl Rule {
    pub fn apply(&self, text: &str) -> String {
        self.rewrites
            .iter()
            .fold(text.to_string(), |acc, rewrite| rewrite.apply(&acc))
    }
}

impl Rewrite {
    fn apply(&self, text: &str) -> String {
        match self {
            Rewrite::Replace { re, with } => re.replace_all(text, *with).into_owned(),
            Rewrite::Strip(re) => re
                .replace_all(text, |caps: &Captures| keep_markers(&caps[0]))
                .into_owned(),
            Rewrite::StripUnlessVerse(re) => re
                .replace_all(text, |caps: &Captures| {
                    let whole = &caps[0];
                    if is_verse_marker_open(whole) {
                        whole.to_string()
                    } else {
                        keep_markers(whole)
                    }
                })
                .into_owned(),
            Rewrite::StripContainer(open) => strip_containers(text, open),
            Rewrite::StripUntil { start, stop } => strip_until(text, start, stop),
            Rewrite::SynthesizeVerseOne(chapter_num) => {
                if VERSE_ONE_RE.is_match(text) {
                    text.to_string()
                } else {
                    chapter_num
                        .replace(text, r#"<sup class="verse-number">1</sup> "#)
                        .into_owned()
                }
            }
            Rewrite::CollapseWhitespace => WHITESPACE_RE.replace_all(text, " ").trim().to_string(),
        }
    }
}

// A late rule can expose text an earlier rule would have removed, so the
// list is rerun until a pass changes nothing.
const MAX_PASSES: usize = 4;

/// Run the full pipeline over a passage block.
pub fn clean(text: &str) -> String {
    clean_traced(text).0
}

/// Like [`clean`], also reporting how much text each rule removed, one entry
/// per rule per pass.
pub fn clean_traced(text: &str) -> (String, Vec<RuleTrace>) {
    let mut traces = Vec::with_capacity(RULES.len());
    let mut current = text.to_string();
    for pass in 1..=MAX_PASSES {
        let input = current.clone();
        for rule in RULES.iter() {
            let before = current.chars().count();
            current = rule.apply(&current);
            let after = current.chars().count();
            debug!(
                pass,
                rule = rule.name,
                before,
                after,
                removed = before.saturating_sub(after),
                "applied rule"
            );
            traces.push(RuleTrace {
                rule: rule.name,
                before,
                after,
            });
        }
        if current == input {
            break;
        }
    }
    (current, traces)
}

fn is_verse_marker_open(element: &str) -> bool {
    let open_tag = element.split('>').next().unwrap_or_default();
    open_tag
        .to_ascii_lowercase()
        .contains(r#"class="verse-number""#)
}

/// Verse markers contained in a span that is about to be removed.
fn keep_markers(removed: &str) -> String {
    VERSE_MARKER_RE
        .find_iter(removed)
        .map(|m| m.as_str())
        .collect()
}

fn strip_containers(text: &str, open: &Regex) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    let mut pos = 0;

    while let Some(caps) = open.captures_at(text, pos) {
        let Some(m) = caps.get(0) else { break };
        let tag = caps.name("tag").map_or("div", |t| t.as_str());
        match balanced_end(text, m.end(), tag) {
            Span::Closed(end) => {
                out.push_str(&text[last..m.start()]);
                out.push_str(&keep_markers(&text[m.start()..end]));
                last = end;
                pos = end;
            }
            // Leave unterminated elements alone.
            Span::Unclosed(_) => pos = m.end(),
        }
    }

    out.push_str(&text[last..]);
    out
}

fn strip_until(text: &str, start: &Regex, stop: &Regex) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;

    while let Some(m) = start.find_at(text, last) {
        let end = stop
            .find_at(text, m.end())
            .map_or(text.len(), |s| s.start());
        out.push_str(&text[last..m.start()]);
        last = end;
    }

    out.push_str(&text[last..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn apply_rule(name: &str, text: &str) -> String {
        RULES
            .iter()
            .find(|r| r.name == name)
            .unwrap_or_else(|| panic!("no rule named {name}"))
            .apply(text)
    }

    #[test]
    fn rule_order_is_fixed() {
        let names: Vec<_> = RULES.iter().map(|r| r.name).collect();
        assert_eq!(
            names,
            vec![
                "canonicalize_verse_numbers",
                "drop_other_superscripts",
                "drop_inline_callouts",
                "drop_note_containers",
                "drop_footnote_items",
                "drop_note_anchors",
                "drop_bare_callouts",
                "synthesize_verse_one",
                "drop_editorial_notes",
                "drop_read_full_chapter",
                "drop_footnotes_appendix",
                "drop_citations",
                "drop_translation_boilerplate",
                "collapse_whitespace",
            ]
        );
    }

    #[rstest]
    #[case(r#"<sup class="versenum">2</sup>"#, r#"<sup class="verse-number">2</sup>"#)]
    #[case(r#"<sup class="versenum">16&nbsp;</sup>"#, r#"<sup class="verse-number">16</sup>"#)]
    #[case(r#"<SUP>  3 </SUP>"#, r#"<sup class="verse-number">3</sup>"#)]
    #[case(r#"<sup class="footnote">a</sup>"#, r#"<sup class="footnote">a</sup>"#)]
    fn canonicalizes_numeric_superscripts(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(apply_rule("canonicalize_verse_numbers", input), expected);
    }

    #[test]
    fn other_superscripts_removed_markers_kept() {
        let text = r#"<sup class="verse-number">1</sup>In<sup class="footnote-x">a</sup> the"#;
        assert_eq!(
            apply_rule("drop_other_superscripts", text),
            r#"<sup class="verse-number">1</sup>In the"#
        );
    }

    #[test]
    fn callouts_by_class_id_and_data_attribute() {
        let text = concat!(
            r#"a<span class="footnote">x</span>"#,
            r#"b<a id="crossref-1" href="/x">y</a>"#,
            r#"c<span data-note="footnote-3">z</span>"#,
            r#"d<sup class="crossreference"><a href="/c">(A)</a></sup>e"#,
        );
        assert_eq!(apply_rule("drop_inline_callouts", text), "abcde");
    }

    #[test]
    fn callout_spanning_nested_element() {
        let text = r#"x<span class="footnote"><span>inner</span> tail</span>y"#;
        assert_eq!(apply_rule("drop_inline_callouts", text), "xy");
    }

    #[test]
    fn note_containers_removed_with_nesting() {
        let text = concat!(
            r#"keep<div class="footnotes"><h4>Footnotes</h4><div><ol><li>a</li></ol></div></div>"#,
            r#"<div class="crossrefs hidden"><ul><li>b</li></ul></div>"#,
            r#"<ol class="footnotes-list"><li>c</li></ol>end"#,
        );
        assert_eq!(apply_rule("drop_note_containers", text), "keepend");
    }

    #[test]
    fn unclosed_container_left_alone() {
        let text = r#"a<div class="footnotes">b"#;
        assert_eq!(apply_rule("drop_note_containers", text), text);
    }

    #[test]
    fn footnote_list_items() {
        let text = r#"<li id="footnote-1">note</li><li id="fen-NIV-1a">n</li><li id="x">keep</li>"#;
        assert_eq!(apply_rule("drop_footnote_items", text), r#"<li id="x">keep</li>"#);
    }

    #[rstest]
    #[case(r##"<a href="#footnote-2">see</a>"##)]
    #[case(r##"<a href="#crossref-2">see</a>"##)]
    #[case(r##"<a href="#fen-NIV-26046a">a</a>"##)]
    #[case(r##"<a class="x" href="#cr-NIV-26046A">A</a>"##)]
    fn note_anchors(#[case] anchor: &str) {
        let text = format!("before {anchor}after");
        assert_eq!(apply_rule("drop_note_anchors", &text), "before after");
    }

    #[test]
    fn bare_callouts_and_glyphs() {
        let text = r#"love<a href="/x">[b]</a> the (c) world[d]† *so"#;
        assert_eq!(apply_rule("drop_bare_callouts", text), "love the  world so");
    }

    #[test]
    fn synthesizes_verse_one_from_chapter_number() {
        let text = r#"<span class="chapternum">3&nbsp;</span>Now there was"#;
        assert_eq!(
            apply_rule("synthesize_verse_one", text),
            r#"<sup class="verse-number">1</sup> Now there was"#
        );
    }

    #[test]
    fn synthesis_skipped_when_verse_one_present() {
        let text = r#"<span class="chapternum">3</span><sup class="verse-number">1</sup>Now"#;
        assert_eq!(apply_rule("synthesize_verse_one", text), text);
    }

    #[test]
    fn synthesis_only_touches_first_chapter_number() {
        let text = r#"<span class="chapternum">1</span>a <span class="chapternum">2</span>b"#;
        assert_eq!(
            apply_rule("synthesize_verse_one", text),
            r#"<sup class="verse-number">1</sup> a <span class="chapternum">2</span>b"#
        );
    }

    #[test]
    fn editorial_notes_stop_at_next_marker() {
        let text = r#"<sup class="verse-number">1</sup>light. Hebrew word for day <sup class="verse-number">2</sup>dark"#;
        assert_eq!(
            apply_rule("drop_editorial_notes", text),
            r#"<sup class="verse-number">1</sup>light. <sup class="verse-number">2</sup>dark"#
        );
    }

    #[test]
    fn editorial_notes_run_to_end() {
        assert_eq!(apply_rule("drop_editorial_notes", "peace. That is, rest"), "peace. ");
    }

    #[test]
    fn editorial_keywords_ignore_case() {
        let text = r#"<sup class="verse-number">1</sup>x. or possibly y <sup class="verse-number">2</sup>z"#;
        assert_eq!(
            apply_rule("drop_editorial_notes", text),
            r#"<sup class="verse-number">1</sup>x. <sup class="verse-number">2</sup>z"#
        );
        assert_eq!(apply_rule("drop_editorial_notes", "rest. GREEK text"), "rest. ");
    }

    #[test]
    fn read_full_chapter() {
        let linked = r#"end.<a href="/passage?search=John+3">Read full chapter</a> more"#;
        assert_eq!(apply_rule("drop_read_full_chapter", linked), "end. more");
        let bare = "end. Read full chapter John 3<p>x</p>";
        assert_eq!(apply_rule("drop_read_full_chapter", bare), "end. <p>x</p>");
    }

    #[test]
    fn footnotes_appendix() {
        let text = "body<h4 class=\"x\"> Footnotes </h4><ol><li>John 3:16 Or his only</li></ol>";
        assert_eq!(apply_rule("drop_footnotes_appendix", text), "body");
    }

    #[rstest]
    #[case("peace. John 3:16: ", "peace.  ")]
    #[case("loved. 1 John 4:8 Or possibly love</p>", "loved. </p>")]
    #[case("world: Romans 5:8-9", "world")]
    #[case("word. 3:16", "word.")]
    #[case("grace. : Eph 2:8: Rom 3:24", "grace.")]
    fn citations(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(apply_rule("drop_citations", input), expected);
    }

    #[test]
    fn translation_boilerplate() {
        let text = "the end. In all English translations, verse numbering differs.";
        assert_eq!(apply_rule("drop_translation_boilerplate", text), "the end.");
    }

    #[test]
    fn whitespace_collapse() {
        assert_eq!(apply_rule("collapse_whitespace", "  a \n\t b  "), "a b");
    }

    #[test]
    fn removal_rules_never_drop_verse_markers() {
        let marker = r#"<sup class="verse-number">2</sup>"#;
        let cases = [
            ("drop_other_superscripts", format!(r#"<sup class="x">a{marker}"#)),
            ("drop_inline_callouts", format!(r#"<span class="footnote">{marker}</span>"#)),
            ("drop_note_containers", format!(r#"<div class="footnotes">{marker}</div>"#)),
            ("drop_footnote_items", format!(r#"<li id="footnote-1">{marker}</li>"#)),
            ("drop_note_anchors", format!(r##"<a href="#fn1">{marker}</a>"##)),
            ("drop_bare_callouts", format!(r#"<a href="/x">[b]</a>{marker}*so"#)),
            ("drop_editorial_notes", format!("Hebrew note {marker}text")),
            (
                "drop_read_full_chapter",
                format!(r#"<a href="/p">Read full chapter {marker}</a>"#),
            ),
            ("drop_footnotes_appendix", format!("<h3>Footnotes</h3>{marker}")),
            ("drop_citations", format!("peace. John 3:16: {marker}grace")),
            ("drop_translation_boilerplate", format!("in all English translations {marker}")),
        ];
        for (rule, text) in cases {
            assert!(
                apply_rule(rule, &text).contains(marker),
                "{rule} removed a verse marker from {text}"
            );
        }
    }

    #[test]
    fn trailing_citation_and_note() {
        let text = "<p>... peace. John 3:16: Hebrew for God so loved</p>";
        assert_eq!(clean(text), "<p>... peace.");
    }

    #[test]
    fn footnote_superscript_next_to_marker() {
        let text = r#"<sup class="verse-number">1</sup><sup class="footnote-x">a</sup>In the beginning"#;
        assert_eq!(clean(text), r#"<sup class="verse-number">1</sup>In the beginning"#);
    }

    #[rstest]
    #[case("")]
    #[case("   \n\t ")]
    fn empty_input_is_empty_output(#[case] input: &str) {
        assert_eq!(clean(input), "");
    }

    #[rstest]
    #[case("peace. 3:16 in all English translations", "peace.")]
    #[case("world[a*] peace", "world peace")]
    fn late_removals_are_cleaned_again(#[case] input: &str, #[case] expected: &str) {
        let once = clean(input);
        assert_eq!(once, expected);
        assert_eq!(clean(&once), once);
    }

    #[test]
    fn clean_is_idempotent_on_fixture() {
        let html = std::fs::read_to_string("tests/fixtures/john_3_16.html").unwrap();
        let block = super::super::block::extract(&html).unwrap();
        let once = clean(block);
        assert_eq!(clean(&once), once);
    }

    #[test]
    fn traced_matches_clean() {
        let text = r#"<sup class="versenum">1</sup> In the beginning<sup class="footnote">a</sup>"#;
        let (cleaned, traces) = clean_traced(text);
        assert_eq!(cleaned, clean(text));
        assert_eq!(traces.len() % RULES.len(), 0);
        assert_eq!(traces.first().map(|t| t.before), Some(text.chars().count()));
        assert_eq!(traces.last().map(|t| t.after), Some(cleaned.chars().count()));
    }
}

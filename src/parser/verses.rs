use super::{VerseRecord, VERSE_MARKER_RE};

/// Split a cleaned block into verse records, one per canonical marker.
///
/// Text runs from the end of a marker to the start of the next one (or end
/// of input). Markers with empty text or an unusable number are skipped;
/// numbering is taken as-is, so repeats and gaps pass through.
pub fn segment(cleaned: &str) -> Vec<VerseRecord> {
    let markers: Vec<_> = VERSE_MARKER_RE.captures_iter(cleaned).collect();
    let mut verses = Vec::with_capacity(markers.len());

    for (i, caps) in markers.iter().enumerate() {
        let (Some(whole), Some(number)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let end = markers
            .get(i + 1)
            .and_then(|next| next.get(0))
            .map_or(cleaned.len(), |m| m.start());

        let text = cleaned[whole.end()..end].trim();
        let verse = match number.as_str().parse::<u32>() {
            Ok(n) if n > 0 => n,
            _ => continue,
        };
        if text.is_empty() {
            continue;
        }

        verses.push(VerseRecord {
            verse,
            text: text.to_string(),
        });
    }

    verses
}

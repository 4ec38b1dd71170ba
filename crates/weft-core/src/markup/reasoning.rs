//! Reasoning-span extraction.
//!
//! Models bleed the visible answer into reasoning tags, double-close
//! them, or close without ever opening. The two closer spellings
//! (current and legacy) are normalized to one canonical token before any
//! matching, so imbalance handling stays deterministic:
//!
//! - balanced: alternate ordinary/reasoning segments in source order
//! - more closers than openers: first opener to last closer collapses
//!   into a single span, interior closers stripped
//! - closers with no opener: everything up to the last closer is one span
//!
//! A trailing opener with no closer is still-streaming reasoning and
//! turns the remainder into one span.

pub(super) const OPEN_TAG: &str = "<think>";
pub(super) const CLOSE_TAG: &str = "</think>";
const LEGACY_OPEN_TAG: &str = "<thinking>";
const LEGACY_CLOSE_TAG: &str = "</thinking>";

/// Delimiter family recorded on every reasoning accordion.
pub const REASONING_FAMILY: &str = "think";

/// One segment of a content run after reasoning extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum Segment {
    Ordinary(String),
    Reasoning(String),
}

/// Splits a span into ordinary and reasoning segments, in source order.
pub(super) fn split_reasoning(text: &str) -> Vec<Segment> {
    let text = text
        .replace(LEGACY_CLOSE_TAG, CLOSE_TAG)
        .replace(LEGACY_OPEN_TAG, OPEN_TAG);

    let opens = text.matches(OPEN_TAG).count();
    let closes = text.matches(CLOSE_TAG).count();

    if opens == 0 && closes == 0 {
        return vec![Segment::Ordinary(text)];
    }

    if closes > opens {
        return collapse_excess_closers(&text, opens);
    }

    let mut segments = Vec::new();
    let mut rest = text.as_str();
    loop {
        match rest.find(OPEN_TAG) {
            None => {
                if !rest.is_empty() {
                    segments.push(Segment::Ordinary(rest.to_string()));
                }
                break;
            }
            Some(pos) => {
                if pos > 0 {
                    segments.push(Segment::Ordinary(rest[..pos].to_string()));
                }
                rest = &rest[pos + OPEN_TAG.len()..];
                match rest.find(CLOSE_TAG) {
                    Some(end) => {
                        segments.push(Segment::Reasoning(rest[..end].to_string()));
                        rest = &rest[end + CLOSE_TAG.len()..];
                    }
                    None => {
                        // Unterminated opener: the model is still thinking.
                        segments.push(Segment::Reasoning(rest.to_string()));
                        break;
                    }
                }
            }
        }
    }
    segments
}

/// The closer-heavy cases: one span swallowing every interior closer.
fn collapse_excess_closers(text: &str, opens: usize) -> Vec<Segment> {
    let mut segments = Vec::new();

    if opens == 0 {
        // Orphan closers: everything up to the last closer is reasoning.
        let last = text.rfind(CLOSE_TAG).unwrap_or(0);
        let inner = text[..last].replace(CLOSE_TAG, "");
        segments.push(Segment::Reasoning(inner));
        let after = &text[last + CLOSE_TAG.len()..];
        if !after.is_empty() {
            segments.push(Segment::Ordinary(after.to_string()));
        }
        return segments;
    }

    // First opener to last closer is one span; interior text between
    // stripped closers concatenates verbatim.
    let first = text.find(OPEN_TAG).unwrap_or(0);
    let last = text.rfind(CLOSE_TAG).unwrap_or(text.len());
    if first > 0 {
        segments.push(Segment::Ordinary(text[..first].to_string()));
    }
    let inner = text[first + OPEN_TAG.len()..last].replace(CLOSE_TAG, "");
    segments.push(Segment::Reasoning(inner));
    let after = &text[last + CLOSE_TAG.len()..];
    if !after.is_empty() {
        segments.push(Segment::Ordinary(after.to_string()));
    }
    segments
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ordinary(text: &str) -> Segment {
        Segment::Ordinary(text.to_string())
    }

    fn reasoning(text: &str) -> Segment {
        Segment::Reasoning(text.to_string())
    }

    #[test]
    fn test_no_delimiters_is_one_ordinary_segment() {
        assert_eq!(split_reasoning("just text"), vec![ordinary("just text")]);
    }

    #[test]
    fn test_balanced_single_span() {
        assert_eq!(
            split_reasoning("<think>plan</think>Answer."),
            vec![reasoning("plan"), ordinary("Answer.")]
        );
    }

    #[test]
    fn test_balanced_multiple_spans_in_source_order() {
        assert_eq!(
            split_reasoning("a<think>1</think>b<think>2</think>c"),
            vec![
                ordinary("a"),
                reasoning("1"),
                ordinary("b"),
                reasoning("2"),
                ordinary("c"),
            ]
        );
    }

    #[test]
    fn test_more_closers_than_openers_collapses_to_one_span() {
        // Interior closer stripped; interior text concatenated verbatim.
        assert_eq!(
            split_reasoning("<think>A</think>B</think>C"),
            vec![reasoning("AB"), ordinary("C")]
        );
    }

    #[test]
    fn test_many_interior_closers_still_one_span() {
        assert_eq!(
            split_reasoning("x<think>a</think>b</think>c</think>y"),
            vec![ordinary("x"), reasoning("abc"), ordinary("y")]
        );
    }

    #[test]
    fn test_closers_with_no_opener() {
        assert_eq!(
            split_reasoning("hmm</think>done"),
            vec![reasoning("hmm"), ordinary("done")]
        );
        assert_eq!(
            split_reasoning("a</think>b</think>rest"),
            vec![reasoning("ab"), ordinary("rest")]
        );
    }

    #[test]
    fn test_unterminated_opener_is_still_reasoning() {
        assert_eq!(
            split_reasoning("intro<think>still going"),
            vec![ordinary("intro"), reasoning("still going")]
        );
    }

    #[test]
    fn test_legacy_closer_spelling_normalizes() {
        assert_eq!(
            split_reasoning("<think>plan</thinking>Answer."),
            vec![reasoning("plan"), ordinary("Answer.")]
        );
        assert_eq!(
            split_reasoning("<thinking>plan</thinking>Answer."),
            vec![reasoning("plan"), ordinary("Answer.")]
        );
    }

    #[test]
    fn test_empty_reasoning_span_is_kept() {
        assert_eq!(
            split_reasoning("<think></think>ok"),
            vec![reasoning(""), ordinary("ok")]
        );
    }
}

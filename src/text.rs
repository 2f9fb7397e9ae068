//! Assembling and bounding recognized text.
//!
//! Both operations are pure: assembly preserves page and line order without
//! reordering or deduplication, and bounding is a hard character-count cut.

use crate::ocr::Page;

/// Join all recognized lines into one document-level string.
///
/// Page order, then line order, one `\n` between lines. Lossless with
/// respect to ordering.
pub fn assemble(pages: &[Page]) -> String {
    pages
        .iter()
        .flat_map(|page| page.lines.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Text trimmed to the synthesis budget, plus the counts callers report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundedText {
    /// The (possibly truncated) text to synthesize.
    pub text: String,
    /// Character count of the full assembled text.
    pub extracted_chars: usize,
    /// Character count actually sent to synthesis.
    pub used_chars: usize,
}

/// Truncate `text` to at most `max_chars` characters.
///
/// Counts are characters, not bytes, so the cut never splits a code point.
/// The cut is hard: no attempt is made to stop at a word or sentence
/// boundary.
pub fn bound(text: String, max_chars: usize) -> BoundedText {
    let extracted_chars = text.chars().count();
    if extracted_chars <= max_chars {
        return BoundedText {
            used_chars: extracted_chars,
            extracted_chars,
            text,
        };
    }

    let cut = text
        .char_indices()
        .nth(max_chars)
        .map(|(byte_idx, _)| byte_idx)
        .unwrap_or(text.len());
    let mut text = text;
    text.truncate(cut);
    BoundedText {
        text,
        extracted_chars,
        used_chars: max_chars,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assemble_preserves_page_then_line_order() {
        let pages = vec![Page::from_lines(["a", "b"]), Page::from_lines(["c"])];
        assert_eq!(assemble(&pages), "a\nb\nc");
    }

    #[test]
    fn assemble_of_nothing_is_empty() {
        assert_eq!(assemble(&[]), "");
        assert_eq!(assemble(&[Page::default()]), "");
    }

    #[test]
    fn bound_is_a_prefix_of_min_length() {
        let text = "hello world".to_owned();
        let bounded = bound(text.clone(), 5);
        assert_eq!(bounded.text, "hello");
        assert_eq!(bounded.extracted_chars, 11);
        assert_eq!(bounded.used_chars, 5);
        assert!(text.starts_with(&bounded.text));

        let untouched = bound(text.clone(), 100);
        assert_eq!(untouched.text, text);
        assert_eq!(untouched.extracted_chars, 11);
        assert_eq!(untouched.used_chars, 11);
    }

    #[test]
    fn bound_is_idempotent() {
        let once = bound("abcdefgh".to_owned(), 4);
        let twice = bound(once.text.clone(), 4);
        assert_eq!(once.text, twice.text);
        assert_eq!(twice.used_chars, 4);
    }

    #[test]
    fn bound_counts_characters_not_bytes() {
        // Four characters, twelve bytes.
        let text = "äöüß".to_owned();
        let bounded = bound(text, 2);
        assert_eq!(bounded.text, "äö");
        assert_eq!(bounded.extracted_chars, 4);
        assert_eq!(bounded.used_chars, 2);
    }

    #[test]
    fn bound_of_empty_text_is_empty() {
        let bounded = bound(String::new(), 5000);
        assert_eq!(bounded.text, "");
        assert_eq!(bounded.extracted_chars, 0);
        assert_eq!(bounded.used_chars, 0);
    }
}

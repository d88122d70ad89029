//! Title keyword extraction.
//!
//! Splits text on ASCII punctuation and spaces, lowercases ASCII letters, and
//! drops single-byte tokens and a fixed list of stop words. Used by the
//! reference stores both when indexing titles and when answering keyword
//! queries, so a query sentence is tokenized exactly like the titles it is
//! matched against.

/// Words that never become keywords.
pub const STOP_WORDS: &[&str] = &[
    "is", "are", "was", "were", "be", "being", "been", "am", "a", "an", "the", "me", "he", "him",
    "she", "her", "we", "they", "in", "on", "at", "of", "with", "for", "and", "or", "to", "all",
    "some", "very", "many",
];

fn is_separator(c: char) -> bool {
    matches!(
        c,
        ',' | '.'
            | ':'
            | ';'
            | '!'
            | '?'
            | '('
            | ')'
            | '['
            | ']'
            | '{'
            | '}'
            | '&'
            | '*'
            | '@'
            | '#'
            | '$'
            | '%'
            | '^'
            | '<'
            | '>'
            | '/'
            | '\\'
            | '|'
            | '-'
            | '_'
            | '+'
            | '='
            | '~'
            | '`'
            | '\''
            | '"'
            | ' '
    )
}

/// Extract keywords from `text` in order of appearance.
///
/// Repeated words are reported each time they occur.
pub fn keywords(text: &str) -> Vec<String> {
    text.split(is_separator)
        .filter(|token| token.len() > 1)
        .map(str::to_ascii_lowercase)
        .filter(|token| !STOP_WORDS.contains(&token.as_str()))
        .collect()
}

/// Intersect two ascending, duplicate-free key lists.
pub(crate) fn intersect_sorted<T: Ord + Copy>(a: &[T], b: &[T]) -> Vec<T> {
    let mut out = Vec::with_capacity(a.len().min(b.len()));
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                out.push(a[i]);
                i += 1;
                j += 1;
            }
        }
    }
    out
}

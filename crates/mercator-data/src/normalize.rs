use once_cell::sync::Lazy;
use regex::Regex;

static NON_WORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\p{L}\p{N}\s]+").expect("Failed to compile word pattern"));
static WHITESPACE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("Failed to compile whitespace pattern"));

/// Lower-case, drop punctuation and collapse whitespace.
///
/// Used both when building the word table and when analysing queries so that the
/// two sides agree on the term spelling.
pub fn normalize_text(text: &str) -> String {
    let lowered = text.to_lowercase();
    let stripped = NON_WORD.replace_all(&lowered, " ");
    WHITESPACE.replace_all(stripped.trim(), " ").into_owned()
}

/// Normalized words of `text`.
pub fn split_words(text: &str) -> Vec<String> {
    normalize_text(text)
        .split(' ')
        .filter(|w| !w.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Canonical postcode spelling: upper case with single inner spaces.
pub fn normalize_postcode(postcode: &str) -> String {
    WHITESPACE
        .replace_all(postcode.trim(), " ")
        .to_uppercase()
}

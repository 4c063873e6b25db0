//! Query tokenization for the similarity indices.
//!
//! Text is prepared the same way the indices were built:
//! 1. Lowercase
//! 2. Split into word tokens (alphanumerics, `_` and `'`)
//! 3. Emit every n-gram from size 1 up to the configured size
//!
//! Multi-word n-grams are joined with `_`, matching the phrase tokens stored
//! in the index vocabulary.

use once_cell::sync::Lazy;
use regex::Regex;

/// Separator used to join the words of a multi-word n-gram.
pub const NGRAM_SEPARATOR: &str = "_";

static WORD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\w']+").expect("valid word regex"));

/// Split text into lowercase word tokens.
pub fn words(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    WORD_RE
        .find_iter(&lower)
        .map(|m| m.as_str().trim_matches('\'').to_string())
        .filter(|w| !w.is_empty())
        .collect()
}

/// Tokenize text into all n-grams of size `1..=max_ngram`.
///
/// A `max_ngram` of 0 is treated as 1. Unigrams come first, followed by
/// bigrams and so on, each group in text order.
pub fn ngrams(text: &str, max_ngram: usize) -> Vec<String> {
    let words = words(text);
    let max_ngram = max_ngram.max(1);

    let mut tokens = Vec::with_capacity(words.len() * max_ngram);
    for n in 1..=max_ngram {
        if n > words.len() {
            break;
        }
        tokens.extend(words.windows(n).map(|w| w.join(NGRAM_SEPARATOR)));
    }

    tokens
}

//! Per-language tokenization for the Bayesian models.

use std::collections::HashSet;
use std::sync::LazyLock;

use crate::language::Language;

pub(crate) static EN_STOPWORDS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "a", "about", "after", "all", "also", "an", "and", "any", "are", "as", "at", "be",
        "because", "been", "but", "by", "can", "could", "did", "do", "does", "for", "from", "had",
        "has", "have", "he", "her", "his", "how", "if", "in", "into", "is", "it", "its", "just",
        "more", "most", "no", "not", "of", "on", "one", "or", "other", "our", "out", "over",
        "said", "she", "so", "some", "than", "that", "the", "their", "them", "then", "there",
        "these", "they", "this", "to", "up", "was", "we", "were", "what", "when", "which", "who",
        "will", "with", "would", "you", "your",
    ]
    .into_iter()
    .collect()
});

pub(crate) static DE_STOPWORDS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "aber", "als", "am", "an", "auch", "auf", "aus", "bei", "beim", "bis", "da", "damit",
        "dann", "das", "dass", "dem", "den", "der", "des", "die", "doch", "durch", "ein", "eine",
        "einem", "einen", "einer", "eines", "er", "es", "für", "gegen", "hat", "haben", "hatte",
        "ich", "ihre", "im", "in", "ist", "kann", "kein", "mehr", "mit", "nach", "nicht", "noch",
        "nur", "oder", "schon", "sein", "seine", "sich", "sie", "sind", "so", "über", "um", "und",
        "unter", "vom", "von", "vor", "war", "wenn", "werden", "wie", "wird", "wurde", "zu",
        "zum", "zur",
    ]
    .into_iter()
    .collect()
});

fn stopwords(lang: Language) -> &'static HashSet<&'static str> {
    match lang {
        Language::En => &EN_STOPWORDS,
        Language::De => &DE_STOPWORDS,
    }
}

/// Split a text into lowercase alphanumeric tokens, dropping one-letter
/// words and the language's function words.
pub(crate) fn tokenize(lang: Language, text: &str) -> Vec<String> {
    let lower = text.to_lowercase();

    lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() > 1)
        .filter(|w| !stopwords(lang).contains(w))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drops_stopwords_and_short_tokens() {
        let tokens = tokenize(Language::En, "The kernel, and a compiler!");
        assert_eq!(tokens, vec!["kernel", "compiler"]);
    }

    #[test]
    fn stopword_lists_are_per_language() {
        let tokens = tokenize(Language::De, "Der Kernel und die Nachrichten");
        assert_eq!(tokens, vec!["kernel", "nachrichten"]);

        // "der"/"und" are only function words in German.
        let tokens = tokenize(Language::En, "der und");
        assert_eq!(tokens, vec!["der", "und"]);
    }
}

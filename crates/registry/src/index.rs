//! Keyword index built once per snapshot.
//!
//! Maps every normalized keyword phrase to the categories declaring it. The
//! parser only performs read-only lookups against it.

use promptsmith_core::{CategoryDefinition, KeywordTier};
use std::collections::HashMap;

/// Split text into lowercase word tokens.
///
/// Words are maximal runs of alphanumeric characters and apostrophes; every
/// other character separates words. Keywords and request text share this
/// tokenizer, so `"sci-fi"` in a definition matches `"Sci Fi"` in a request.
pub fn tokenize_words(text: &str) -> Vec<String> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '\''))
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Normalize a keyword phrase to its canonical index key.
pub fn normalize_phrase(phrase: &str) -> String {
    tokenize_words(phrase).join(" ")
}

/// One category declaring a phrase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordEntry {
    pub category_id: String,
    pub tier: KeywordTier,
    /// Number of words in the phrase.
    pub words: usize,
}

#[derive(Debug, Clone, Default)]
pub struct KeywordIndex {
    entries: HashMap<String, Vec<KeywordEntry>>,
    longest: usize,
}

impl KeywordIndex {
    /// Build the index from definitions iterated in id order.
    pub fn build<'a>(categories: impl IntoIterator<Item = &'a CategoryDefinition>) -> Self {
        let mut index = Self::default();
        for def in categories {
            for (tier, keyword) in def.keywords.iter() {
                let phrase = normalize_phrase(keyword);
                let words = phrase.split(' ').count();
                if phrase.is_empty() {
                    continue;
                }
                let bucket = index.entries.entry(phrase).or_default();
                // A category listing the same phrase twice keeps its strongest tier.
                match bucket.iter_mut().find(|e| e.category_id == def.id) {
                    Some(existing) if tier_strength(tier) > tier_strength(existing.tier) => {
                        existing.tier = tier;
                    }
                    Some(_) => {}
                    None => bucket.push(KeywordEntry {
                        category_id: def.id.clone(),
                        tier,
                        words,
                    }),
                }
                index.longest = index.longest.max(words);
            }
        }
        index
    }

    /// Categories declaring exactly this normalized phrase.
    pub fn lookup(&self, phrase: &str) -> &[KeywordEntry] {
        self.entries.get(phrase).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Word count of the longest indexed phrase.
    pub fn longest_phrase(&self) -> usize {
        self.longest
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn tier_strength(tier: KeywordTier) -> u8 {
    match tier {
        KeywordTier::Specific => 3,
        KeywordTier::Primary => 2,
        KeywordTier::Secondary => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizer_lowercases_and_splits_punctuation() {
        assert_eq!(
            tokenize_words("A Sci-Fi city, at NIGHT!"),
            vec!["a", "sci", "fi", "city", "at", "night"]
        );
        assert_eq!(tokenize_words("  "), Vec::<String>::new());
    }

    #[test]
    fn normalize_collapses_whitespace() {
        assert_eq!(normalize_phrase("  Golden   Hour "), "golden hour");
    }
}

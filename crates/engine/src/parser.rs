//! Request parsing: explicit markers plus keyword inference.
//!
//! Markers (`@portrait`) name a category directly. Everything else is
//! tokenized and every n-gram up to the longest indexed phrase is looked up
//! in the snapshot's keyword index.

use promptsmith_config::ParserConfig;
use promptsmith_core::{
    CandidateMatch, ExplanationBuilder, KeywordTier, MatchKind, Phase, UnknownTagError,
};
use promptsmith_registry::{RegistrySnapshot, tokenize_words};
use std::collections::{BTreeMap, BTreeSet};

/// Everything the parser found in one request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParseOutcome {
    /// Explicit first, then confidence descending, then id.
    pub candidates: Vec<CandidateMatch>,
    pub unknown_tags: Vec<UnknownTagError>,
}

#[derive(Debug, Clone)]
pub struct RequestParser {
    config: ParserConfig,
}

/// Per-category accumulator for inferred matches.
#[derive(Default)]
struct Inferred {
    best: f64,
    keywords: Vec<String>,
}

impl RequestParser {
    pub fn new(config: ParserConfig) -> Self {
        Self { config }
    }

    pub fn parse(
        &self,
        snapshot: &RegistrySnapshot,
        text: &str,
        explain: &mut ExplanationBuilder,
    ) -> ParseOutcome {
        let mut outcome = ParseOutcome::default();
        let mut explicit: BTreeSet<String> = BTreeSet::new();
        let mut unknown: BTreeSet<String> = BTreeSet::new();
        let mut remaining: Vec<&str> = Vec::new();

        for token in text.split_whitespace() {
            let Some(tag) = self.marker(token) else {
                remaining.push(token);
                continue;
            };
            if tag.is_empty() {
                continue;
            }
            if snapshot.contains(&tag) {
                if explicit.insert(tag.clone()) {
                    explain.record(Phase::Parse, "explicit", format!("marker {token}"), Some(&tag));
                    outcome.candidates.push(CandidateMatch::explicit(&tag, token));
                }
            } else if unknown.insert(tag.clone()) {
                let error = UnknownTagError {
                    suggestions: self.suggest(snapshot, &tag),
                    tag,
                };
                explain.record(Phase::Parse, "unknown_tag", error.to_string(), None);
                outcome.unknown_tags.push(error);
            }
        }

        for (id, found) in self.infer(snapshot, &remaining.join(" ")) {
            if explicit.contains(&id) {
                continue;
            }
            let extra = found.keywords.len().saturating_sub(1) as f64;
            let confidence = (found.best + self.config.weights.repeat_bonus * extra).min(1.0);
            let keywords = found.keywords.join(", ");
            if confidence < self.config.confidence_floor {
                explain.record(
                    Phase::Parse,
                    "below_floor",
                    format!(
                        "confidence {confidence:.2} from [{keywords}] below {:.2}",
                        self.config.confidence_floor
                    ),
                    Some(&id),
                );
                continue;
            }
            explain.record(
                Phase::Parse,
                "infer",
                format!("confidence {confidence:.2} from [{keywords}]"),
                Some(&id),
            );
            outcome.candidates.push(CandidateMatch {
                category_id: id,
                confidence,
                matched_keywords: found.keywords,
                kind: MatchKind::Inferred,
            });
        }

        outcome.candidates.sort_by(|a, b| {
            a.kind
                .cmp(&b.kind)
                .then_with(|| b.confidence.total_cmp(&a.confidence))
                .then_with(|| a.category_id.cmp(&b.category_id))
        });
        outcome
    }

    /// The lowercased tag of a marker token, or `None` for ordinary words.
    fn marker(&self, token: &str) -> Option<String> {
        let rest = token.strip_prefix(self.config.marker_prefix.as_str())?;
        let tag = rest.trim_end_matches(|c: char| !(c.is_alphanumeric() || c == '_' || c == '-'));
        Some(tag.to_lowercase())
    }

    fn infer(&self, snapshot: &RegistrySnapshot, text: &str) -> BTreeMap<String, Inferred> {
        let index = snapshot.keyword_index();
        let words = tokenize_words(text);
        let weights = &self.config.weights;
        let mut found: BTreeMap<String, Inferred> = BTreeMap::new();

        for start in 0..words.len() {
            let longest = index.longest_phrase().min(words.len() - start);
            for n in 1..=longest {
                let phrase = words[start..start + n].join(" ");
                for entry in index.lookup(&phrase) {
                    let tier_weight = match entry.tier {
                        KeywordTier::Specific => weights.specific,
                        KeywordTier::Primary => weights.primary,
                        KeywordTier::Secondary => weights.secondary,
                    };
                    let contribution =
                        tier_weight + weights.phrase_bonus * entry.words.saturating_sub(1) as f64;
                    let acc = found.entry(entry.category_id.clone()).or_default();
                    acc.best = acc.best.max(contribution);
                    if !acc.keywords.contains(&phrase) {
                        acc.keywords.push(phrase.clone());
                    }
                }
            }
        }
        found
    }

    /// Known ids closest to `tag`, nearest first.
    fn suggest(&self, snapshot: &RegistrySnapshot, tag: &str) -> Vec<String> {
        let mut ranked: Vec<(usize, &str)> = snapshot
            .category_ids()
            .map(|id| (levenshtein(tag, id), id))
            .filter(|(distance, _)| *distance <= self.config.max_suggestion_distance)
            .collect();
        ranked.sort();
        ranked
            .into_iter()
            .take(self.config.max_suggestions)
            .map(|(_, id)| id.to_string())
            .collect()
    }
}

/// Edit distance over chars (insert, delete, substitute).
pub fn levenshtein(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];
    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;

    fn parse(text: &str) -> ParseOutcome {
        RequestParser::new(ParserConfig::default()).parse(
            &fixtures::snapshot(),
            text,
            &mut ExplanationBuilder::new(),
        )
    }

    fn ids(outcome: &ParseOutcome) -> Vec<&str> {
        outcome
            .candidates
            .iter()
            .map(|c| c.category_id.as_str())
            .collect()
    }

    #[test]
    fn levenshtein_distances() {
        assert_eq!(levenshtein("portait", "portrait"), 1);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("same", "same"), 0);
    }

    #[test]
    fn keywords_infer_candidates() {
        let outcome = parse("A portrait at night");
        assert_eq!(ids(&outcome), vec!["night", "portrait"]);
        let portrait = &outcome.candidates[1];
        assert_eq!(portrait.kind, MatchKind::Inferred);
        assert!((portrait.confidence - 0.75).abs() < 1e-9);
        assert_eq!(portrait.matched_keywords, vec!["portrait".to_string()]);
    }

    #[test]
    fn multi_word_phrases_outrank_single_words() {
        let outcome = parse("studio lighting, anime");
        let studio = outcome
            .candidates
            .iter()
            .find(|c| c.category_id == "studio")
            .unwrap();
        // specific 0.9 + one extra word 0.05, plus 0.05 for the second keyword "studio"
        assert!((studio.confidence - 1.0).abs() < 1e-9);
        assert_eq!(ids(&outcome), vec!["studio", "anime"]);
    }

    #[test]
    fn explicit_markers_come_first_and_win_over_inference() {
        let outcome = parse("night portrait @anime @night");
        assert_eq!(ids(&outcome), vec!["anime", "night", "portrait"]);
        assert!(outcome.candidates[0].is_explicit());
        assert!(outcome.candidates[1].is_explicit());
        assert_eq!(outcome.candidates[1].confidence, 1.0);
        assert!(!outcome.candidates[2].is_explicit());
    }

    #[test]
    fn unknown_marker_suggests_closest_ids() {
        let outcome = parse("@portait at dusk");
        assert!(outcome.candidates.is_empty());
        assert_eq!(outcome.unknown_tags.len(), 1);
        assert_eq!(outcome.unknown_tags[0].tag, "portait");
        assert_eq!(outcome.unknown_tags[0].suggestions, vec!["portrait".to_string()]);
    }

    #[test]
    fn markers_are_case_insensitive_and_strip_punctuation() {
        let outcome = parse("@Portrait, please");
        assert_eq!(ids(&outcome), vec!["portrait"]);
        assert!(outcome.unknown_tags.is_empty());
    }

    #[test]
    fn below_floor_candidates_are_dropped_and_explained() {
        let mut config = ParserConfig::default();
        config.confidence_floor = 0.8;
        let mut explain = ExplanationBuilder::new();
        let outcome = RequestParser::new(config).parse(&fixtures::snapshot(), "night", &mut explain);
        assert!(outcome.candidates.is_empty());
        assert_eq!(explain.finish().with_action("below_floor").count(), 1);
    }

    #[test]
    fn custom_marker_prefix() {
        let mut config = ParserConfig::default();
        config.marker_prefix = "#".into();
        let outcome = RequestParser::new(config).parse(
            &fixtures::snapshot(),
            "#studio @anime",
            &mut ExplanationBuilder::new(),
        );
        // "@anime" is an ordinary token now and still infers anime.
        assert_eq!(ids(&outcome), vec!["studio", "anime"]);
        assert!(outcome.candidates[0].is_explicit());
        assert!(!outcome.candidates[1].is_explicit());
    }

    #[test]
    fn empty_text_yields_nothing() {
        let outcome = parse("   ");
        assert_eq!(outcome, ParseOutcome::default());
    }
}

//! Sentence-complexity scoring strategies.
//!
//! The default heuristic counts clauses (delimiter-based), subordinate
//! connectives and capitalized multi-word terms. It is a rough proxy; the
//! weights and connective list are configuration, and callers can plug in
//! their own [`SentenceScorer`].

use serde::{Deserialize, Serialize};

/// Characters that separate clauses inside a sentence.
const CLAUSE_DELIMITERS: &[char] = &[',', ';', ':', '—', '–'];

/// Characters that end a sentence.
const SENTENCE_TERMINATORS: &[char] = &['.', '!', '?', '\n'];

/// Default subordinate-clause markers.
pub const DEFAULT_CONNECTIVES: &[&str] = &[
    "because",
    "although",
    "though",
    "whereas",
    "while",
    "unless",
    "since",
    "if",
    "when",
    "whenever",
    "which",
    "whose",
    "however",
    "therefore",
    "moreover",
    "furthermore",
    "nevertheless",
    "consequently",
    "even though",
    "so that",
    "in order to",
];

/// Pluggable per-sentence complexity estimate.
pub trait SentenceScorer: Send + Sync {
    /// Complexity of a single sentence, in `[0, 100]`.
    fn score(&self, sentence: &str) -> f64;
}

/// Weights of the heuristic's three signals
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SentenceWeights {
    /// Points per clause
    pub clause: f64,
    /// Points per subordinate connective
    pub connective: f64,
    /// Points per capitalized compound term
    pub compound: f64,
}

impl Default for SentenceWeights {
    fn default() -> Self {
        Self {
            clause: 10.0,
            connective: 15.0,
            compound: 20.0,
        }
    }
}

impl SentenceWeights {
    pub(crate) fn is_valid(&self) -> bool {
        [self.clause, self.connective, self.compound]
            .iter()
            .all(|w| w.is_finite() && *w >= 0.0)
    }
}

/// Clause / connective / capitalized-compound heuristic.
#[derive(Debug, Clone)]
pub struct HeuristicSentenceScorer {
    weights: SentenceWeights,
    connectives: Vec<Vec<String>>,
}

impl HeuristicSentenceScorer {
    pub fn new<I, S>(weights: SentenceWeights, connectives: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let connectives = connectives
            .into_iter()
            .map(|c| {
                c.as_ref()
                    .split_whitespace()
                    .map(str::to_lowercase)
                    .collect::<Vec<_>>()
            })
            .filter(|words| !words.is_empty())
            .collect();
        Self {
            weights,
            connectives,
        }
    }

    /// Number of non-blank, delimiter-separated segments.
    pub fn clause_count(sentence: &str) -> usize {
        sentence
            .split(CLAUSE_DELIMITERS)
            .filter(|seg| seg.chars().any(char::is_alphanumeric))
            .count()
    }

    /// Occurrences of connective words or phrases.
    pub fn connective_count(&self, sentence: &str) -> usize {
        let words: Vec<String> = sentence
            .split_whitespace()
            .map(|w| {
                w.trim_matches(|c: char| !c.is_alphanumeric())
                    .to_lowercase()
            })
            .filter(|w| !w.is_empty())
            .collect();

        self.connectives
            .iter()
            .map(|phrase| {
                if phrase.len() > words.len() {
                    0
                } else {
                    words
                        .windows(phrase.len())
                        .filter(|window| window == &phrase.as_slice())
                        .count()
                }
            })
            .sum()
    }

    /// Runs of two or more consecutive capitalized words ("Large Hadron Collider").
    ///
    /// The sentence-initial word and the pronoun "I" never start a run, so
    /// ordinary sentence capitalization ("Yesterday I left") doesn't count.
    pub fn compound_count(sentence: &str) -> usize {
        let mut compounds = 0;
        let mut run = 0;
        for (idx, word) in sentence.split_whitespace().enumerate() {
            let word = word.trim_matches(|c: char| !c.is_alphanumeric());
            let can_start = idx > 0 && word != "I";
            if is_capitalized(word) && (run > 0 || can_start) {
                run += 1;
            } else {
                if run >= 2 {
                    compounds += 1;
                }
                run = 0;
            }
        }
        if run >= 2 {
            compounds += 1;
        }
        compounds
    }
}

impl Default for HeuristicSentenceScorer {
    fn default() -> Self {
        Self::new(SentenceWeights::default(), DEFAULT_CONNECTIVES)
    }
}

impl SentenceScorer for HeuristicSentenceScorer {
    fn score(&self, sentence: &str) -> f64 {
        let raw = self.weights.clause * Self::clause_count(sentence) as f64
            + self.weights.connective * self.connective_count(sentence) as f64
            + self.weights.compound * Self::compound_count(sentence) as f64;
        raw.clamp(0.0, 100.0)
    }
}

fn is_capitalized(word: &str) -> bool {
    word.chars().next().is_some_and(char::is_uppercase)
}

/// Split text into trimmed, non-blank sentences.
pub fn split_sentences(text: &str) -> impl Iterator<Item = &str> {
    text.split(SENTENCE_TERMINATORS)
        .map(str::trim)
        .filter(|s| s.chars().any(char::is_alphanumeric))
}

//! Precompiled keyword matcher.
//!
//! The keyword list is compiled once into a single case-insensitive regex
//! alternation, so each turn is scanned in one pass regardless of list size.

use regex::{Regex, RegexBuilder};
use std::collections::BTreeSet;

/// Case-insensitive substring matcher over a fixed keyword set.
#[derive(Debug, Clone)]
pub struct KeywordMatcher {
    pattern: Option<Regex>,
    keywords: Vec<String>,
}

impl KeywordMatcher {
    /// Compile a matcher. Blank entries are dropped and duplicates
    /// (ignoring case) collapse into one.
    pub fn new<I, S>(keywords: I) -> Result<Self, regex::Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keywords: Vec<String> = keywords
            .into_iter()
            .map(|k| k.as_ref().trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        if keywords.is_empty() {
            return Ok(Self {
                pattern: None,
                keywords,
            });
        }

        let alternation = keywords
            .iter()
            .map(|k| regex::escape(k))
            .collect::<Vec<_>>()
            .join("|");
        let pattern = RegexBuilder::new(&alternation)
            .case_insensitive(true)
            .build()?;

        Ok(Self {
            pattern: Some(pattern),
            keywords,
        })
    }

    /// Whether `text` contains at least one keyword.
    pub fn is_match(&self, text: &str) -> bool {
        self.pattern.as_ref().is_some_and(|p| p.is_match(text))
    }

    pub fn len(&self) -> usize {
        self.keywords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty()
    }
}

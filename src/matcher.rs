//! Regex matching of item text against the configured patterns.

use regex::Regex;
use std::sync::Arc;
use thiserror::Error;

/// A configured pattern that failed to compile.
#[derive(Debug, Error)]
#[error("Invalid pattern {pattern:?}: {source}")]
pub struct PatternError {
    pub pattern: String,
    #[source]
    pub source: regex::Error,
}

/// A compiled pattern together with the text it was compiled from.
///
/// The text is the pattern's identity in storage.
#[derive(Debug, Clone)]
pub struct Pattern {
    text: Arc<str>,
    regex: Regex,
}

impl Pattern {
    pub fn new(text: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            text: Arc::from(text),
            regex: Regex::new(text)?,
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

/// Every substring one pattern matched in one item, in match order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternMatch {
    pub pattern: Arc<str>,
    pub matches: Vec<String>,
}

/// Ordered, read-only set of patterns shared by all pollers.
#[derive(Debug, Clone, Default)]
pub struct PatternSet {
    patterns: Vec<Pattern>,
}

impl PatternSet {
    /// Compile patterns in configuration order.
    ///
    /// A pattern text that repeats an earlier one is dropped, since both would
    /// record identical evidence.
    pub fn compile<I, S>(texts: I) -> Result<Self, PatternError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut patterns: Vec<Pattern> = Vec::new();
        for text in texts {
            let text = text.as_ref();
            if patterns.iter().any(|p| p.text() == text) {
                tracing::warn!(pattern = %text, "Duplicate pattern ignored");
                continue;
            }
            let pattern = Pattern::new(text).map_err(|source| PatternError {
                pattern: text.to_string(),
                source,
            })?;
            patterns.push(pattern);
        }
        Ok(Self { patterns })
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Pattern> {
        self.patterns.iter()
    }

    /// Run every pattern over `text`.
    ///
    /// Each pattern contributes the full text of all its non-overlapping,
    /// leftmost-first matches; patterns without a match are omitted. Entries
    /// keep configuration order.
    pub fn find_matches(&self, text: &str) -> Vec<PatternMatch> {
        self.patterns
            .iter()
            .filter_map(|pattern| {
                let matches: Vec<String> = pattern
                    .regex
                    .find_iter(text)
                    .map(|m| m.as_str().to_string())
                    .collect();
                (!matches.is_empty()).then(|| PatternMatch {
                    pattern: Arc::clone(&pattern.text),
                    matches,
                })
            })
            .collect()
    }
}

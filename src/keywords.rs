//! Keyword statistics for article bodies.
//!
//! Term selection is delegated to a [`Tagger`]: it turns text into the
//! stream of salient terms (case-folded, stopwords removed, nouns and
//! adjectives only). [`KeywordSummarizer`] then ranks that stream:
//!
//! 1. count occurrences,
//! 2. order by descending count, ties by first occurrence,
//! 3. keep the top N,
//! 4. drop terms seen only once.
//!
//! A tagger fault degrades to an empty result; it never fails an article.

use crate::models::Keywords;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

/// Default number of keywords kept per article.
pub const DEFAULT_TOP_N: usize = 15;

/// Tokens this short or shorter are discarded.
const MIN_TOKEN_LEN: usize = 2;

#[derive(Debug, Error)]
#[error("tagger failed: {0}")]
pub struct SummarizeError(pub String);

/// Produces the salient-term stream for a text.
pub trait Tagger: Send + Sync {
    fn salient_terms(&self, text: &str) -> Result<Vec<String>, SummarizeError>;
}

static TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\p{L}\p{N}]+").expect("static regex"));

// English stopwords (NLTK list) plus frequent verbs and adverbs that a
// part-of-speech filter would reject.
static STOPWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "i", "me", "my", "myself", "we", "our", "ours", "ourselves", "you", "your", "yours",
        "yourself", "yourselves", "he", "him", "his", "himself", "she", "her", "hers", "herself",
        "it", "its", "itself", "they", "them", "their", "theirs", "themselves", "what", "which",
        "who", "whom", "this", "that", "these", "those", "am", "is", "are", "was", "were", "be",
        "been", "being", "have", "has", "had", "having", "do", "does", "did", "doing", "a", "an",
        "the", "and", "but", "if", "or", "because", "as", "until", "while", "of", "at", "by",
        "for", "with", "about", "against", "between", "into", "through", "during", "before",
        "after", "above", "below", "to", "from", "up", "down", "in", "out", "on", "off", "over",
        "under", "again", "further", "then", "once", "here", "there", "when", "where", "why",
        "how", "all", "any", "both", "each", "few", "more", "most", "other", "some", "such", "no",
        "nor", "not", "only", "own", "same", "so", "than", "too", "very", "can", "will", "just",
        "don", "should", "now", "ain", "aren", "couldn", "didn", "doesn", "hadn", "hasn", "haven",
        "isn", "mustn", "needn", "shan", "shouldn", "wasn", "weren", "won", "wouldn", "could",
        "would", "might", "must", "shall", "may", "also", "said", "says", "say", "make", "makes",
        "made", "get", "gets", "got", "take", "takes", "took", "use", "uses", "used", "like",
        "well", "even", "still", "yet", "however", "already", "often", "much", "many", "really",
        "within", "without", "across", "among", "upon", "via",
    ]
    .into_iter()
    .collect()
});

/// Built-in tagger: Unicode word tokens, case-folded, stopwords, numerals and
/// short tokens removed.
///
/// Tokens are maximal runs of letters and digits, so hyphenated compounds
/// are split into their parts (`cloud-native` yields `cloud` and `native`)
/// rather than kept whole or dropped.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicTagger;

impl Tagger for HeuristicTagger {
    fn salient_terms(&self, text: &str) -> Result<Vec<String>, SummarizeError> {
        let lowered = text.to_lowercase();
        Ok(TOKEN
            .find_iter(&lowered)
            .map(|m| m.as_str())
            .filter(|t| t.chars().count() > MIN_TOKEN_LEN)
            .filter(|t| !t.chars().all(|c| c.is_numeric()))
            .filter(|t| !STOPWORDS.contains(t))
            .map(str::to_string)
            .collect())
    }
}

/// Ranks tagger output into [`Keywords`].
#[derive(Clone)]
pub struct KeywordSummarizer {
    tagger: Arc<dyn Tagger>,
    top_n: usize,
}

impl std::fmt::Debug for KeywordSummarizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeywordSummarizer")
            .field("top_n", &self.top_n)
            .finish()
    }
}

impl Default for KeywordSummarizer {
    fn default() -> Self {
        Self::new(Arc::new(HeuristicTagger), DEFAULT_TOP_N)
    }
}

impl KeywordSummarizer {
    pub fn new(tagger: Arc<dyn Tagger>, top_n: usize) -> Self {
        Self { tagger, top_n }
    }

    pub fn with_top_n(top_n: usize) -> Self {
        Self::new(Arc::new(HeuristicTagger), top_n)
    }

    /// Top terms of `text` with their counts; empty on tagger failure.
    pub fn summarize(&self, text: &str) -> Keywords {
        match self.tagger.salient_terms(text) {
            Ok(terms) => rank(terms, self.top_n),
            Err(e) => {
                warn!(error = %e, "Keyword extraction failed; storing no keywords");
                Keywords::default()
            }
        }
    }
}

fn rank(terms: Vec<String>, top_n: usize) -> Keywords {
    // term -> (count, first position)
    let mut counts: HashMap<String, (u32, usize)> = HashMap::new();
    for (pos, term) in terms.into_iter().enumerate() {
        counts.entry(term).or_insert((0, pos)).0 += 1;
    }

    let mut ranked: Vec<(String, (u32, usize))> = counts.into_iter().collect();
    ranked.sort_by(|(_, (ca, pa)), (_, (cb, pb))| cb.cmp(ca).then(pa.cmp(pb)));

    Keywords::new(
        ranked
            .into_iter()
            .take(top_n)
            .filter(|(_, (count, _))| *count > 1)
            .map(|(term, (count, _))| (term, count))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingTagger;

    impl Tagger for FailingTagger {
        fn salient_terms(&self, _text: &str) -> Result<Vec<String>, SummarizeError> {
            Err(SummarizeError("model not loaded".into()))
        }
    }

    #[test]
    fn test_summarize_drops_singletons() {
        let keywords = KeywordSummarizer::with_top_n(5).summarize("cloud cloud edge edge edge computing");
        let entries: Vec<(&str, u32)> = keywords.iter().collect();
        assert_eq!(entries, vec![("edge", 3), ("cloud", 2)]);
    }

    #[test]
    fn test_ties_keep_first_occurrence_order() {
        let keywords = KeywordSummarizer::with_top_n(2).summarize("zeta alpha zeta alpha beta beta");
        let entries: Vec<(&str, u32)> = keywords.iter().collect();
        assert_eq!(entries, vec![("zeta", 2), ("alpha", 2)]);
    }

    #[test]
    fn test_top_n_bound_and_ordering() {
        let text = "quantum quantum quantum quantum network network network \
                    qubit qubit photon photon laser laser";
        let keywords = KeywordSummarizer::with_top_n(3).summarize(text);
        assert!(keywords.len() <= 3);
        let counts: Vec<u32> = keywords.iter().map(|(_, c)| c).collect();
        assert!(counts.windows(2).all(|w| w[0] >= w[1]));
        assert!(counts.iter().all(|c| *c > 1));
        assert_eq!(keywords.iter().next(), Some(("quantum", 4)));
    }

    #[test]
    fn test_tagger_filters() {
        let terms = HeuristicTagger
            .salient_terms("The AI and the 2024 Cloud: it is GREAT, cloud-native!")
            .unwrap();
        assert_eq!(terms, vec!["cloud", "great", "cloud", "native"]);
    }

    #[test]
    fn test_tagger_splits_hyphenated_compounds() {
        let terms = HeuristicTagger
            .salient_terms("Edge-computing meets state-of-the-art pipelines")
            .unwrap();
        assert_eq!(terms, vec!["edge", "computing", "meets", "state", "art", "pipelines"]);
    }

    #[test]
    fn test_tagger_failure_yields_empty() {
        let summarizer = KeywordSummarizer::new(Arc::new(FailingTagger), 15);
        assert!(summarizer.summarize("cloud cloud cloud").is_empty());
    }

    #[test]
    fn test_empty_text() {
        assert!(KeywordSummarizer::default().summarize("").is_empty());
    }
}

//! Relevance assessment of citation contexts against cited works.
//!
//! The text around each citation is compared with the descriptive text
//! retrieved while verifying the cited reference. The comparison is a
//! deterministic term-overlap score; it cannot judge argumentation, only
//! whether the two texts talk about the same things.

use std::collections::{BTreeMap, BTreeSet};

use crate::config::ThresholdConfig;
use crate::models::{Citation, Reference, RelevanceJudgment, Verdict, VerificationResult};
use crate::utils::{is_cjk, tokenize};

/// Score boundaries between verdicts
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RelevanceThresholds {
    pub high: f64,
    pub moderate: f64,
    pub doubtful: f64,
}

impl Default for RelevanceThresholds {
    fn default() -> Self {
        Self::from(&ThresholdConfig::default())
    }
}

impl From<&ThresholdConfig> for RelevanceThresholds {
    fn from(config: &ThresholdConfig) -> Self {
        Self {
            high: config.relevance_high,
            moderate: config.relevance_moderate,
            doubtful: config.relevance_doubtful,
        }
    }
}

impl RelevanceThresholds {
    pub fn verdict(&self, score: f64) -> Verdict {
        if score >= self.high {
            Verdict::High
        } else if score >= self.moderate {
            Verdict::Moderate
        } else if score >= self.doubtful {
            Verdict::Doubtful
        } else {
            Verdict::Unrelated
        }
    }
}

const STOPWORDS: &[&str] = &[
    "about", "above", "after", "again", "against", "all", "also", "among", "and", "any", "are",
    "because", "been", "before", "being", "between", "both", "but", "can", "could", "did", "does",
    "doing", "during", "each", "few", "for", "from", "further", "had", "has", "have", "having",
    "her", "here", "hers", "him", "his", "how", "however", "into", "its", "itself", "may", "more",
    "most", "much", "must", "not", "now", "only", "other", "our", "ours", "out", "over", "own",
    "same", "she", "should", "some", "such", "than", "that", "the", "their", "them", "then",
    "there", "these", "they", "this", "those", "through", "thus", "too", "under", "until", "upon",
    "using", "very", "was", "were", "what", "when", "where", "whether", "which", "while", "who",
    "whom", "why", "will", "with", "within", "without", "would", "yet", "you", "your", "et", "al",
    "study", "studies", "paper", "work", "works", "result", "results", "show", "shown", "shows",
    "used", "use", "based", "new", "via",
];

/// Strip common English inflections so that "controllers" meets "controller"
fn stem(word: &str) -> String {
    const SUFFIXES: &[&str] = &["ings", "ing", "edly", "ed", "ies", "es", "s", "ly"];

    for suffix in SUFFIXES {
        if let Some(base) = word.strip_suffix(suffix) {
            if base.chars().count() >= 3 {
                return match *suffix {
                    "ies" => format!("{}y", base),
                    _ => base.to_string(),
                };
            }
        }
    }
    word.to_string()
}

/// Content terms of a text: stopwords dropped, stemmed, at least three
/// characters; CJK bigrams are kept as they come
pub fn content_terms(text: &str) -> BTreeSet<String> {
    tokenize(text)
        .into_iter()
        .filter_map(|token| {
            if token.chars().any(is_cjk) {
                return Some(token);
            }
            if token.chars().count() < 3
                || token.chars().all(|c| c.is_ascii_digit())
                || STOPWORDS.contains(&token.as_str())
            {
                return None;
            }
            Some(stem(&token))
        })
        .collect()
}

/// Overlap coefficient `|a ∩ b| / min(|a|, |b|)`
pub fn overlap_score(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    let smaller = a.len().min(b.len());
    if smaller == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / smaller as f64
}

/// Judge every citation whose reference exists
///
/// Returns one judgment per cited marker, ordered by first occurrence.
pub fn assess(
    citations: &[Citation],
    references: &[Reference],
    results: &BTreeMap<u32, VerificationResult>,
    thresholds: &RelevanceThresholds,
) -> Vec<RelevanceJudgment> {
    let known: BTreeSet<u32> = references.iter().map(|r| r.index).collect();

    let mut ordered: Vec<&Citation> = citations
        .iter()
        .filter(|c| known.contains(&c.marker))
        .collect();
    ordered.sort_by_key(|c| (c.first_position(), c.marker));

    ordered
        .into_iter()
        .map(|citation| judge(citation, results.get(&citation.marker), thresholds))
        .collect()
}

fn not_assessed(citation: &Citation, rationale: &str) -> RelevanceJudgment {
    RelevanceJudgment {
        citation_marker: citation.marker,
        reference_index: citation.marker,
        verdict: Verdict::NotAssessed,
        score: None,
        rationale: rationale.to_string(),
    }
}

fn judge(
    citation: &Citation,
    result: Option<&VerificationResult>,
    thresholds: &RelevanceThresholds,
) -> RelevanceJudgment {
    let Some(result) = result.filter(|r| r.is_verified()) else {
        return not_assessed(citation, "reference is not verified");
    };
    let Some(summary) = result
        .retrieved_summary
        .as_deref()
        .filter(|s| !s.trim().is_empty())
    else {
        return not_assessed(citation, "no description of the cited work was retrieved");
    };

    let summary_terms = content_terms(summary);

    let scored: Vec<(usize, f64, Vec<String>)> = citation
        .occurrences
        .iter()
        .map(|occurrence| {
            let context_terms = content_terms(&occurrence.context);
            let shared = context_terms.intersection(&summary_terms).cloned().collect();
            (
                occurrence.position,
                overlap_score(&context_terms, &summary_terms),
                shared,
            )
        })
        .collect();

    // first occurrence wins ties
    let Some(best) = scored
        .iter()
        .enumerate()
        .max_by(|(i, a), (j, b)| a.1.total_cmp(&b.1).then(j.cmp(i)))
        .map(|(i, _)| i)
    else {
        return not_assessed(citation, "marker has no occurrences");
    };

    let (position, score, shared) = &scored[best];
    let verdict = thresholds.verdict(*score);

    let mut rationale = if shared.is_empty() {
        format!(
            "context at offset {} shares no terms with the cited work (score {:.2})",
            position, score
        )
    } else {
        format!(
            "context at offset {} shares {} with the cited work (score {:.2})",
            position,
            shared.join(", "),
            score
        )
    };

    let others: Vec<String> = scored
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != best)
        .map(|(_, (pos, s, _))| format!("offset {} ({:.2})", pos, s))
        .collect();
    if !others.is_empty() {
        rationale.push_str("; other occurrences: ");
        rationale.push_str(&others.join(", "));
    }

    RelevanceJudgment {
        citation_marker: citation.marker,
        reference_index: citation.marker,
        verdict,
        score: Some(*score),
        rationale,
    }
}

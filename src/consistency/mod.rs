//! Cross-checks between in-text citations and the reference list.
//!
//! Everything here is a pure function of already-extracted entities; the
//! findings are data ([`ConsistencyIssue`]), never errors.

use std::collections::{BTreeSet, HashSet};

use crate::config::ThresholdConfig;
use crate::models::{Citation, ConsistencyIssue, IssueKind, MalformedMarker, Reference};
use crate::utils::are_duplicate_references;

/// How the reference list is expected to be numbered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NumberingConvention {
    /// Numbered in order of first citation (GB/T 7714, IEEE, Vancouver)
    #[default]
    CitationOrder,
    /// Sorted alphabetically, so citation order carries no meaning (AMS)
    Alphabetical,
}

/// Options for [`analyze`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalysisOptions {
    pub convention: NumberingConvention,

    /// Minimum title token Jaccard for two entries to count as duplicates
    pub duplicate_threshold: f64,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self::from_thresholds(&ThresholdConfig::default())
    }
}

impl AnalysisOptions {
    pub fn from_thresholds(thresholds: &ThresholdConfig) -> Self {
        Self {
            convention: NumberingConvention::default(),
            duplicate_threshold: thresholds.duplicate_title_similarity,
        }
    }

    pub fn convention(mut self, convention: NumberingConvention) -> Self {
        self.convention = convention;
        self
    }
}

/// Cross-check citations against references
///
/// Output order: malformed markers (document order, then mislabelled
/// entries), missing references (by marker), out-of-order citations (by
/// first occurrence), unused references (by index), duplicates (by pair).
pub fn analyze(
    citations: &[Citation],
    references: &[Reference],
    malformed: &[MalformedMarker],
    options: &AnalysisOptions,
) -> Vec<ConsistencyIssue> {
    let indices: HashSet<u32> = references.iter().map(|r| r.index).collect();
    let cited: HashSet<u32> = citations.iter().map(|c| c.marker).collect();

    let mut issues = malformed_issues(malformed, references);
    issues.extend(missing_references(citations, &indices));
    if options.convention == NumberingConvention::CitationOrder {
        issues.extend(out_of_order(citations, &indices));
    }
    issues.extend(unused_references(references, &cited));
    issues.extend(duplicate_references(references, options.duplicate_threshold));

    tracing::debug!("Consistency analysis found {} issues", issues.len());
    issues
}

fn malformed_issues(malformed: &[MalformedMarker], references: &[Reference]) -> Vec<ConsistencyIssue> {
    let mut markers: Vec<&MalformedMarker> = malformed.iter().collect();
    markers.sort_by_key(|m| m.position);

    let mut issues: Vec<ConsistencyIssue> = markers
        .into_iter()
        .map(|m| {
            ConsistencyIssue::new(
                IssueKind::MalformedMarker,
                format!("{} at offset {}: {}", m.text, m.position, m.reason),
            )
        })
        .collect();

    issues.extend(references.iter().filter_map(|r| match r.label {
        Some(label) if label != r.index => Some(
            ConsistencyIssue::new(
                IssueKind::MalformedMarker,
                format!(
                    "reference list entry {} is numbered [{}]; citations resolve by list position",
                    r.index, label
                ),
            )
            .reference(r.index),
        ),
        _ => None,
    }));

    issues
}

fn missing_references(citations: &[Citation], indices: &HashSet<u32>) -> Vec<ConsistencyIssue> {
    let missing: BTreeSet<u32> = citations
        .iter()
        .map(|c| c.marker)
        .filter(|m| !indices.contains(m))
        .collect();

    missing
        .into_iter()
        .map(|marker| {
            ConsistencyIssue::new(
                IssueKind::MissingReference,
                format!("[{}] is cited but the reference list has no entry {}", marker, marker),
            )
            .marker(marker)
        })
        .collect()
}

/// Markers whose first occurrence jumps ahead of a cited entry that has not
/// been introduced yet
///
/// Entries that are never cited are skipped when computing the expected next
/// marker; they are reported as unused instead. Markers without a reference
/// are reported only as missing and do not advance the running maximum.
fn out_of_order(citations: &[Citation], indices: &HashSet<u32>) -> Vec<ConsistencyIssue> {
    let mut ordered: Vec<&Citation> = citations
        .iter()
        .filter(|c| indices.contains(&c.marker))
        .collect();
    ordered.sort_by_key(|c| c.first_position());
    let resolvable: BTreeSet<u32> = ordered.iter().map(|c| c.marker).collect();

    let mut max_seen = 0;
    let mut issues = Vec::new();
    for citation in ordered {
        let marker = citation.marker;
        if marker > max_seen + 1 {
            if let Some(&pending) = resolvable.range(max_seen + 1..marker).next() {
                issues.push(
                    ConsistencyIssue::new(
                        IssueKind::OutOfOrder,
                        format!(
                            "[{}] is first cited at offset {} before [{}]",
                            marker,
                            citation.first_position(),
                            pending
                        ),
                    )
                    .marker(marker)
                    .reference(marker),
                );
            }
        }
        max_seen = max_seen.max(marker);
    }
    issues
}

fn unused_references(references: &[Reference], cited: &HashSet<u32>) -> Vec<ConsistencyIssue> {
    let mut unused: Vec<u32> = references
        .iter()
        .map(|r| r.index)
        .filter(|i| !cited.contains(i))
        .collect();
    unused.sort_unstable();

    unused
        .into_iter()
        .map(|index| {
            ConsistencyIssue::new(
                IssueKind::UnusedReference,
                format!("reference [{}] is never cited", index),
            )
            .reference(index)
        })
        .collect()
}

/// Group entries describing the same work and report each extra entry
fn duplicate_references(references: &[Reference], threshold: f64) -> Vec<ConsistencyIssue> {
    let mut processed: HashSet<usize> = HashSet::new();
    let mut pairs: Vec<(u32, u32)> = Vec::new();

    for (i, first) in references.iter().enumerate() {
        if processed.contains(&i) {
            continue;
        }
        for (j, other) in references.iter().enumerate().skip(i + 1) {
            if !processed.contains(&j) && are_duplicate_references(first, other, threshold) {
                pairs.push((first.index, other.index));
                processed.insert(j);
            }
        }
        processed.insert(i);
    }
    pairs.sort_unstable();

    pairs
        .into_iter()
        .map(|(kept, duplicate)| {
            ConsistencyIssue::new(
                IssueKind::DuplicateCitationMarker,
                format!(
                    "references [{}] and [{}] appear to describe the same work",
                    kept, duplicate
                ),
            )
            .marker(duplicate)
            .reference(kept)
        })
        .collect()
}

//! Report building.
//!
//! [`build_report`] is a single pass over the finalized outputs of the
//! other stages. Every count in the [`ReportSummary`] is derived from the
//! per-reference and per-citation entries, so the two can never disagree.

mod annotate;
mod render;

pub use annotate::{annotate, strip_annotations};
pub use render::{render_text, to_json};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::models::{
    Citation, ConsistencyIssue, IssueKind, Reference, ReferenceType, RelevanceJudgment, Verdict,
    VerificationResult, VerificationStatus,
};

/// Overall judgement of the document's references
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallAssessment {
    SeriousProblems,
    NeedsRevision,
    MinorIssues,
    Good,
}

impl OverallAssessment {
    pub fn label(&self) -> &'static str {
        match self {
            OverallAssessment::SeriousProblems => "serious problems",
            OverallAssessment::NeedsRevision => "needs revision",
            OverallAssessment::MinorIssues => "minor issues",
            OverallAssessment::Good => "good",
        }
    }
}

impl std::fmt::Display for OverallAssessment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    High,
    Medium,
    Low,
}

impl Severity {
    pub fn label(&self) -> &'static str {
        match self {
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
        }
    }
}

/// Category of a suggested correction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrectionKind {
    MissingReferences,
    UnusedReferences,
    OrderIssues,
    DuplicateReferences,
    MalformedMarkers,
    InvalidReferences,
    SuspiciousReferences,
    UnverifiedReferences,
    RelevanceReview,
}

impl CorrectionKind {
    pub fn title(&self) -> &'static str {
        match self {
            CorrectionKind::MissingReferences => "Cited but missing from the reference list",
            CorrectionKind::UnusedReferences => "Listed but never cited",
            CorrectionKind::OrderIssues => "Numbered out of citation order",
            CorrectionKind::DuplicateReferences => "Listed more than once",
            CorrectionKind::MalformedMarkers => "Malformed citation markers or labels",
            CorrectionKind::InvalidReferences => "Invalid or nonexistent references",
            CorrectionKind::SuspiciousReferences => "Suspicious references",
            CorrectionKind::UnverifiedReferences => "References that could not be verified",
            CorrectionKind::RelevanceReview => "Citations of doubtful relevance",
        }
    }

    /// Whether `items` are reference indices (rather than citation markers)
    pub fn lists_references(&self) -> bool {
        !matches!(
            self,
            CorrectionKind::MissingReferences
                | CorrectionKind::OrderIssues
                | CorrectionKind::MalformedMarkers
                | CorrectionKind::RelevanceReview
        )
    }
}

/// One machine-readable correction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Correction {
    pub kind: CorrectionKind,
    pub severity: Severity,
    pub description: String,
    /// Citation markers or reference indices concerned
    pub items: Vec<u32>,
    pub action: String,
}

/// Per-reference line of the report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceEntry {
    pub index: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<u32>,

    pub raw_text: String,

    pub reference_type: ReferenceType,

    pub status: VerificationStatus,

    /// `false` when verification could not reach any conclusion
    pub checked: bool,

    pub cited: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relevance: Option<Verdict>,

    #[serde(default)]
    pub notes: Vec<String>,
}

impl ReferenceEntry {
    pub fn could_not_check(&self) -> bool {
        self.status == VerificationStatus::Unverified && !self.checked
    }
}

/// Per-marker line of the citation audit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CitationEntry {
    pub marker: u32,

    pub occurrences: usize,

    pub first_position: usize,

    pub has_reference: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<VerificationStatus>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verdict: Option<Verdict>,

    pub out_of_order: bool,

    /// Short inline flag for the annotated copy, when the citation needs attention
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flag: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub reference_index: u32,
    pub url: String,
}

/// Verification links grouped by kind
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkSummary {
    pub doi: Vec<Link>,
    pub pubmed: Vec<Link>,
    pub other: Vec<Link>,
}

impl LinkSummary {
    pub fn is_empty(&self) -> bool {
        self.doi.is_empty() && self.pubmed.is_empty() && self.other.is_empty()
    }

    fn push(&mut self, reference_index: u32, url: &str) {
        let link = Link {
            reference_index,
            url: url.to_string(),
        };
        if url.contains("doi.org") {
            self.doi.push(link);
        } else if url.to_lowercase().contains("pubmed") {
            self.pubmed.push(link);
        } else {
            self.other.push(link);
        }
    }
}

/// Counts derived from the report entries
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub total_references: usize,
    pub verified: usize,
    /// Checked, but nothing confirmed or refuted the entry
    pub unverified: usize,
    pub could_not_check: usize,
    pub suspicious: usize,
    pub invalid: usize,
    /// Percentage of references verified
    pub validity_rate: f64,
    pub cited_markers: usize,
    pub citation_occurrences: usize,
    pub missing_references: usize,
    pub unused_references: usize,
    pub out_of_order: usize,
    pub duplicates: usize,
    pub malformed_markers: usize,
    pub relevance_flagged: usize,
    pub relevance_unrelated: usize,
    pub relevance_not_assessed: usize,
}

impl ReportSummary {
    fn derive(
        references: &[ReferenceEntry],
        citations: &[CitationEntry],
        issues: &[ConsistencyIssue],
        judgments: &[RelevanceJudgment],
    ) -> Self {
        let count_status = |status: VerificationStatus| references.iter().filter(|r| r.status == status).count();
        let count_kind = |kind: IssueKind| issues.iter().filter(|i| i.kind == kind).count();
        let count_verdict = |verdict: Verdict| judgments.iter().filter(|j| j.verdict == verdict).count();

        let verified = count_status(VerificationStatus::Verified);
        let could_not_check = references.iter().filter(|r| r.could_not_check()).count();
        let validity_rate = if references.is_empty() {
            0.0
        } else {
            (verified as f64 / references.len() as f64 * 1000.0).round() / 10.0
        };

        Self {
            total_references: references.len(),
            verified,
            unverified: count_status(VerificationStatus::Unverified) - could_not_check,
            could_not_check,
            suspicious: count_status(VerificationStatus::Suspicious),
            invalid: count_status(VerificationStatus::Invalid),
            validity_rate,
            cited_markers: citations.len(),
            citation_occurrences: citations.iter().map(|c| c.occurrences).sum(),
            missing_references: count_kind(IssueKind::MissingReference),
            unused_references: count_kind(IssueKind::UnusedReference),
            out_of_order: count_kind(IssueKind::OutOfOrder),
            duplicates: count_kind(IssueKind::DuplicateCitationMarker),
            malformed_markers: count_kind(IssueKind::MalformedMarker),
            relevance_flagged: judgments.iter().filter(|j| j.verdict.needs_review()).count(),
            relevance_unrelated: count_verdict(Verdict::Unrelated),
            relevance_not_assessed: count_verdict(Verdict::NotAssessed),
        }
    }

    /// Consistency findings other than missing references
    fn minor_consistency_issues(&self) -> usize {
        self.unused_references + self.out_of_order + self.duplicates + self.malformed_markers
    }
}

/// The complete report for one document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub document: String,
    pub generated_at: DateTime<Utc>,
    pub strict: bool,
    pub assessment: OverallAssessment,
    pub urgency: Severity,
    pub summary: ReportSummary,
    pub references: Vec<ReferenceEntry>,
    pub citations: Vec<CitationEntry>,
    pub issues: Vec<ConsistencyIssue>,
    pub relevance: Vec<RelevanceJudgment>,
    pub corrections: Vec<Correction>,
    pub suggestions: Vec<String>,
    pub links: LinkSummary,
}

impl Report {
    /// Whether anything at all was found
    pub fn has_findings(&self) -> bool {
        self.assessment != OverallAssessment::Good
    }

    pub fn citation(&self, marker: u32) -> Option<&CitationEntry> {
        self.citations.iter().find(|c| c.marker == marker)
    }
}

/// Finalized outputs of the earlier stages
#[derive(Debug, Clone, Copy)]
pub struct ReportInputs<'a> {
    pub document: &'a str,
    pub generated_at: DateTime<Utc>,
    pub references: &'a [Reference],
    pub citations: &'a [Citation],
    pub issues: &'a [ConsistencyIssue],
    pub results: &'a BTreeMap<u32, VerificationResult>,
    pub judgments: &'a [RelevanceJudgment],
    /// Treat every consistency issue as requiring revision
    pub strict: bool,
}

pub fn build_report(inputs: ReportInputs<'_>) -> Report {
    let cited: BTreeSet<u32> = inputs.citations.iter().map(|c| c.marker).collect();
    let known: BTreeSet<u32> = inputs.references.iter().map(|r| r.index).collect();
    let verdicts: BTreeMap<u32, Verdict> = inputs
        .judgments
        .iter()
        .map(|j| (j.citation_marker, j.verdict))
        .collect();
    let late: BTreeSet<u32> = inputs
        .issues
        .iter()
        .filter(|i| i.kind == IssueKind::OutOfOrder)
        .filter_map(|i| i.citation_marker)
        .collect();

    let references: Vec<ReferenceEntry> = inputs
        .references
        .iter()
        .map(|reference| {
            let result = inputs.results.get(&reference.index);
            ReferenceEntry {
                index: reference.index,
                label: reference.label,
                raw_text: reference.raw_text.clone(),
                reference_type: reference.reference_type,
                status: result.map(|r| r.status).unwrap_or(VerificationStatus::Unverified),
                checked: result.map(|r| r.checked).unwrap_or(false),
                cited: cited.contains(&reference.index),
                url: result.and_then(|r| r.best_url()).map(str::to_string),
                relevance: verdicts.get(&reference.index).copied(),
                notes: result.map(|r| r.notes.clone()).unwrap_or_default(),
            }
        })
        .collect();

    let mut citations: Vec<CitationEntry> = inputs
        .citations
        .iter()
        .map(|citation| {
            let has_reference = known.contains(&citation.marker);
            let status = inputs.results.get(&citation.marker).map(|r| r.status);
            let verdict = verdicts.get(&citation.marker).copied();
            CitationEntry {
                marker: citation.marker,
                occurrences: citation.occurrence_count(),
                first_position: citation.first_position(),
                has_reference,
                status,
                verdict,
                out_of_order: late.contains(&citation.marker),
                flag: citation_flag(has_reference, status, verdict),
            }
        })
        .collect();
    citations.sort_by_key(|c| (c.first_position, c.marker));

    let summary = ReportSummary::derive(&references, &citations, inputs.issues, inputs.judgments);
    let assessment = assess(&summary, inputs.strict);
    let corrections = corrections(&references, &citations, inputs.issues);
    let suggestions = corrections.iter().map(suggestion).collect();

    let mut links = LinkSummary::default();
    for entry in &references {
        if let Some(url) = &entry.url {
            links.push(entry.index, url);
        }
    }

    Report {
        document: inputs.document.to_string(),
        generated_at: inputs.generated_at,
        strict: inputs.strict,
        assessment,
        urgency: urgency(&summary),
        summary,
        references,
        citations,
        issues: inputs.issues.to_vec(),
        relevance: inputs.judgments.to_vec(),
        corrections,
        suggestions,
        links,
    }
}

fn citation_flag(
    has_reference: bool,
    status: Option<VerificationStatus>,
    verdict: Option<Verdict>,
) -> Option<String> {
    if !has_reference {
        return Some("missing reference".to_string());
    }
    match status {
        Some(VerificationStatus::Invalid) => return Some("invalid".to_string()),
        Some(VerificationStatus::Suspicious) => return Some("suspicious".to_string()),
        _ => {}
    }
    match verdict {
        Some(v @ (Verdict::Unrelated | Verdict::Doubtful)) => Some(format!("{} relevance", v.label())),
        _ => None,
    }
}

fn assess(summary: &ReportSummary, strict: bool) -> OverallAssessment {
    if summary.invalid > 0 {
        OverallAssessment::SeriousProblems
    } else if summary.suspicious > 0
        || summary.missing_references > 0
        || summary.relevance_unrelated > 0
        || (strict && summary.minor_consistency_issues() > 0)
    {
        OverallAssessment::NeedsRevision
    } else if summary.minor_consistency_issues() > 0
        || summary.relevance_flagged > 0
        || summary.relevance_not_assessed > 0
        || summary.unverified + summary.could_not_check > 0
    {
        OverallAssessment::MinorIssues
    } else {
        OverallAssessment::Good
    }
}

/// How soon the author should act on the findings
fn urgency(summary: &ReportSummary) -> Severity {
    if summary.invalid > 0 || summary.missing_references > 3 {
        Severity::High
    } else if summary.suspicious > 2 || summary.missing_references > 0 || summary.out_of_order > 3 {
        Severity::Medium
    } else {
        Severity::Low
    }
}

fn correction(
    kind: CorrectionKind,
    severity: Severity,
    description: &str,
    items: Vec<u32>,
    action: &str,
) -> Option<Correction> {
    (!items.is_empty()).then(|| Correction {
        kind,
        severity,
        description: description.to_string(),
        items,
        action: action.to_string(),
    })
}

fn corrections(
    references: &[ReferenceEntry],
    citations: &[CitationEntry],
    issues: &[ConsistencyIssue],
) -> Vec<Correction> {
    let issue_items = |kind: IssueKind, by_marker: bool| -> Vec<u32> {
        let items: BTreeSet<u32> = issues
            .iter()
            .filter(|i| i.kind == kind)
            .filter_map(|i| if by_marker { i.citation_marker } else { i.reference_index })
            .collect();
        items.into_iter().collect()
    };

    let status_items = |status: VerificationStatus| -> Vec<u32> {
        references
            .iter()
            .filter(|r| r.status == status)
            .map(|r| r.index)
            .collect()
    };

    // Malformed markers carry no number; only mislabelled entries do
    let malformed_count = issues
        .iter()
        .filter(|i| i.kind == IssueKind::MalformedMarker)
        .count();
    let malformed = (malformed_count > 0).then(|| Correction {
        kind: CorrectionKind::MalformedMarkers,
        severity: Severity::Low,
        description: format!("{} malformed citation marker(s) or entry label(s)", malformed_count),
        items: issue_items(IssueKind::MalformedMarker, false),
        action: "Fix the marker syntax and entry numbering".to_string(),
    });

    [
        correction(
            CorrectionKind::MissingReferences,
            Severity::High,
            "Cited in the text but absent from the reference list",
            issue_items(IssueKind::MissingReference, true),
            "Add the missing entries or remove the citations",
        ),
        correction(
            CorrectionKind::UnusedReferences,
            Severity::Medium,
            "Present in the reference list but never cited",
            issue_items(IssueKind::UnusedReference, false),
            "Remove the unused entries or cite them in the text",
        ),
        correction(
            CorrectionKind::OrderIssues,
            Severity::Medium,
            "Cited before lower-numbered references were introduced",
            issue_items(IssueKind::OutOfOrder, true),
            "Renumber references in order of first citation",
        ),
        correction(
            CorrectionKind::DuplicateReferences,
            Severity::Medium,
            "The same work appears more than once in the reference list",
            issue_items(IssueKind::DuplicateCitationMarker, true),
            "Merge duplicate entries and update their citations",
        ),
        malformed,
        correction(
            CorrectionKind::InvalidReferences,
            Severity::High,
            "Identifier is malformed or the work does not exist",
            status_items(VerificationStatus::Invalid),
            "Verify and replace these references",
        ),
        correction(
            CorrectionKind::SuspiciousReferences,
            Severity::Medium,
            "Only similar but non-matching works were found",
            status_items(VerificationStatus::Suspicious),
            "Check these references by hand",
        ),
        correction(
            CorrectionKind::UnverifiedReferences,
            Severity::Low,
            "No source could confirm these references",
            status_items(VerificationStatus::Unverified),
            "Add a DOI or PubMed ID so these references can be verified",
        ),
        correction(
            CorrectionKind::RelevanceReview,
            Severity::Medium,
            "The citing sentence and the cited work share little vocabulary",
            citations
                .iter()
                .filter(|c| c.verdict.is_some_and(|v| v.needs_review()))
                .map(|c| c.marker)
                .collect(),
            "Review whether these works support the sentences citing them",
        ),
    ]
    .into_iter()
    .flatten()
    .collect()
}

fn suggestion(correction: &Correction) -> String {
    if correction.items.is_empty() {
        return correction.action.clone();
    }
    let items: Vec<String> = correction.items.iter().map(|i| format!("[{}]", i)).collect();
    format!("{}: {}", correction.action, items.join(", "))
}

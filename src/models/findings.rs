//! Consistency issues and relevance judgments.

use serde::{Deserialize, Serialize};

/// Category of a consistency finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    MissingReference,
    UnusedReference,
    DuplicateCitationMarker,
    OutOfOrder,
    MalformedMarker,
}

impl IssueKind {
    pub fn label(&self) -> &'static str {
        match self {
            IssueKind::MissingReference => "missing reference",
            IssueKind::UnusedReference => "unused reference",
            IssueKind::DuplicateCitationMarker => "duplicate reference",
            IssueKind::OutOfOrder => "out of order",
            IssueKind::MalformedMarker => "malformed marker",
        }
    }
}

impl std::fmt::Display for IssueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// A cross-check finding between citations and the reference list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsistencyIssue {
    pub kind: IssueKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub citation_marker: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_index: Option<u32>,

    pub detail: String,
}

impl ConsistencyIssue {
    pub fn new(kind: IssueKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            citation_marker: None,
            reference_index: None,
            detail: detail.into(),
        }
    }

    pub fn marker(mut self, marker: u32) -> Self {
        self.citation_marker = Some(marker);
        self
    }

    pub fn reference(mut self, index: u32) -> Self {
        self.reference_index = Some(index);
        self
    }
}

/// How well a citation's context matches the cited work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    High,
    Moderate,
    Doubtful,
    Unrelated,
    NotAssessed,
}

impl Verdict {
    pub fn label(&self) -> &'static str {
        match self {
            Verdict::High => "high",
            Verdict::Moderate => "moderate",
            Verdict::Doubtful => "doubtful",
            Verdict::Unrelated => "unrelated",
            Verdict::NotAssessed => "not assessed",
        }
    }

    /// Verdicts that call for a human look at the citation
    pub fn needs_review(&self) -> bool {
        matches!(self, Verdict::Doubtful | Verdict::Unrelated)
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelevanceJudgment {
    pub citation_marker: u32,

    pub reference_index: u32,

    pub verdict: Verdict,

    /// Overlap score of the representative occurrence
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,

    pub rationale: String,
}

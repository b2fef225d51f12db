//! Verification results produced by the orchestrator.

use serde::{Deserialize, Serialize};

/// Confidence classification of a reference's real-world existence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    /// A method returned a confident, dereferenceable match
    Verified,
    /// Nothing could confirm or refute the reference
    Unverified,
    /// Search returned candidates, none of which matched well enough
    Suspicious,
    /// Malformed identifier, or the authoritative source denies it exists
    Invalid,
}

impl VerificationStatus {
    pub fn label(&self) -> &'static str {
        match self {
            VerificationStatus::Verified => "verified",
            VerificationStatus::Unverified => "unverified",
            VerificationStatus::Suspicious => "suspicious",
            VerificationStatus::Invalid => "invalid",
        }
    }
}

impl std::fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Which identifier system produced a piece of evidence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceSource {
    Doi,
    Pubmed,
    IsbnCatalog,
    WebSearch,
}

impl EvidenceSource {
    pub fn label(&self) -> &'static str {
        match self {
            EvidenceSource::Doi => "DOI",
            EvidenceSource::Pubmed => "PubMed",
            EvidenceSource::IsbnCatalog => "ISBN catalog",
            EvidenceSource::WebSearch => "search",
        }
    }
}

/// One verification signal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub source: EvidenceSource,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Match confidence in `[0, 1]`
    pub confidence: f64,
}

impl Evidence {
    pub fn new(source: EvidenceSource, url: Option<String>, confidence: f64) -> Self {
        Self {
            source,
            url,
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    /// Evidence that the source explicitly answered "no"
    pub fn negative(source: EvidenceSource) -> Self {
        Self::new(source, None, 0.0)
    }
}

/// A non-fatal failure recorded while verifying one reference
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VerificationFailure {
    /// A whole method could not reach a conclusion
    Inconclusive { method: String, reason: String },
    /// One provider was unreachable or returned an error
    ProviderError { provider: String, message: String },
}

impl std::fmt::Display for VerificationFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VerificationFailure::Inconclusive { method, reason } => {
                write!(f, "{} inconclusive: {}", method, reason)
            }
            VerificationFailure::ProviderError { provider, message } => {
                write!(f, "{} unavailable: {}", provider, message)
            }
        }
    }
}

/// The current verification result for one reference
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub reference_index: u32,

    pub status: VerificationStatus,

    pub evidence: Vec<Evidence>,

    /// Descriptive text (title, abstract) of the matched work
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retrieved_summary: Option<String>,

    /// `false` when tooling or network problems prevented any conclusion
    pub checked: bool,

    #[serde(default)]
    pub notes: Vec<String>,

    #[serde(default)]
    pub failures: Vec<VerificationFailure>,
}

impl VerificationResult {
    /// A result for a reference that was never looked at
    pub fn not_checked(reference_index: u32, note: impl Into<String>) -> Self {
        Self {
            reference_index,
            status: VerificationStatus::Unverified,
            evidence: Vec::new(),
            retrieved_summary: None,
            checked: false,
            notes: vec![note.into()],
            failures: Vec::new(),
        }
    }

    pub fn is_verified(&self) -> bool {
        self.status == VerificationStatus::Verified
    }

    /// "Could not be checked", as opposed to a genuine negative result
    pub fn could_not_check(&self) -> bool {
        self.status == VerificationStatus::Unverified && !self.checked
    }

    /// URL of the strongest piece of evidence
    pub fn best_url(&self) -> Option<&str> {
        self.evidence
            .iter()
            .filter(|e| e.url.is_some())
            .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
            .and_then(|e| e.url.as_deref())
    }
}

/// A record returned by a provider lookup or search
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub title: String,

    #[serde(default)]
    pub authors: Vec<String>,

    #[serde(default)]
    pub year: Option<i32>,

    /// Identifier in the provider's namespace (DOI, PMID, ISBN, ...)
    #[serde(default)]
    pub identifier: Option<String>,

    #[serde(default)]
    pub url: Option<String>,

    /// Abstract or descriptive text, used for relevance assessment
    #[serde(default)]
    pub summary: Option<String>,
}

impl Candidate {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn authors(mut self, authors: Vec<String>) -> Self {
        self.authors = authors;
        self
    }

    pub fn year(mut self, year: i32) -> Self {
        self.year = Some(year);
        self
    }

    pub fn identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    /// Title plus summary, as used for relevance comparisons
    pub fn descriptive_text(&self) -> String {
        match &self.summary {
            Some(summary) if !summary.trim().is_empty() => {
                format!("{}. {}", self.title.trim(), summary.trim())
            }
            _ => self.title.trim().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evidence_confidence_is_clamped() {
        assert_eq!(Evidence::new(EvidenceSource::Doi, None, 1.7).confidence, 1.0);
        assert_eq!(Evidence::new(EvidenceSource::Doi, None, -0.2).confidence, 0.0);
    }

    #[test]
    fn test_not_checked_is_distinct_from_negative() {
        let result = VerificationResult::not_checked(3, "offline");
        assert!(result.could_not_check());
        assert!(result.evidence.is_empty());

        let mut negative = result.clone();
        negative.checked = true;
        assert!(!negative.could_not_check());
    }

    #[test]
    fn test_best_url_prefers_highest_confidence() {
        let mut result = VerificationResult::not_checked(1, "");
        result.evidence = vec![
            Evidence::new(EvidenceSource::WebSearch, Some("https://a".into()), 0.4),
            Evidence::new(EvidenceSource::Doi, Some("https://doi.org/x".into()), 1.0),
        ];
        assert_eq!(result.best_url(), Some("https://doi.org/x"));
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&EvidenceSource::IsbnCatalog).unwrap();
        assert_eq!(json, "\"isbn_catalog\"");
        let json = serde_json::to_string(&VerificationStatus::Suspicious).unwrap();
        assert_eq!(json, "\"suspicious\"");
    }

    #[test]
    fn test_candidate_descriptive_text() {
        let c = Candidate::new("Deep learning").summary("A review.");
        assert_eq!(c.descriptive_text(), "Deep learning. A review.");
        assert_eq!(Candidate::new(" Plain ").descriptive_text(), "Plain");
    }
}

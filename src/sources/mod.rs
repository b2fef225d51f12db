//! Bibliographic provider plugins with a trait-based architecture.
//!
//! This module defines the [`Source`] trait that every provider implements.
//! A provider answers identifier lookups (DOI, PMID, ISBN) and free-text
//! searches with zero or more [`Candidate`] records; deciding whether a
//! candidate actually matches a reference is left to the verifiers.
//!
//! Providers perform a single attempt per call. Timeouts and retries are
//! applied around each call by [`crate::verify`], so every provider gets the
//! same failure handling.
//!
//! # Providers
//!
//! - [`CrossRefSource`]: DOI resolution and bibliographic search
//! - [`PubMedSource`]: PMID resolution through E-utilities efetch
//! - [`OpenLibrarySource`]: ISBN resolution
//! - [`DoiOrgSource`]: DOI registration check against the doi.org handle
//!   service, the only authority on whether a DOI exists
//! - [`MockSource`]: scripted provider for tests and offline runs

mod crossref;
mod doi_org;
pub mod mock;
mod openlibrary;
mod pubmed;
mod registry;

pub use crossref::CrossRefSource;
pub use doi_org::DoiOrgSource;
pub use mock::{MockReply, MockSource};
pub use openlibrary::OpenLibrarySource;
pub use pubmed::PubMedSource;
pub use registry::{SourceCapabilities, SourceRegistry};

use crate::models::{Candidate, Reference};
use async_trait::async_trait;

/// Free-text search built from a reference entry
#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    /// Combined query text sent to providers
    pub text: String,

    pub title: Option<String>,

    pub first_author: Option<String>,

    pub year: Option<u16>,

    pub max_results: usize,
}

impl SearchQuery {
    /// Build a query from the reference's title, first author and year
    ///
    /// Returns `None` when the reference has no title, since an author or
    /// year alone cannot identify a work.
    pub fn from_reference(reference: &Reference, max_results: usize) -> Option<Self> {
        let title = reference.fields.title.parsed()?.clone();
        let first_author = reference.fields.first_author().map(str::to_string);
        let year = reference.fields.year.parsed().copied();

        let mut text = title.clone();
        if let Some(author) = &first_author {
            text.push(' ');
            text.push_str(author);
        }

        Some(Self {
            text,
            title: Some(title),
            first_author,
            year,
            max_results,
        })
    }
}

/// The Source trait defines the interface for all provider plugins.
///
/// # Implementing a New Source
///
/// 1. Create a struct that implements `Source`
/// 2. Implement `id`, `name` and `capabilities`
/// 3. Implement the lookups matching the declared capabilities
/// 4. Register it with [`SourceRegistry::register`]
///
/// Lookups return an empty list (or [`SourceError::NotFound`]) when the
/// provider has no record of the identifier. For DOIs that only proves
/// absence from that provider; [`Source::doi_registered`] settles whether
/// the DOI exists at all.
#[async_trait]
pub trait Source: Send + Sync + std::fmt::Debug {
    /// Unique identifier for this source (e.g. "crossref", "pubmed")
    fn id(&self) -> &str;

    /// Human-readable name of this source
    fn name(&self) -> &str;

    /// Describe the capabilities of this source
    fn capabilities(&self) -> SourceCapabilities {
        SourceCapabilities::SEARCH
    }

    /// Whether this source declares the given capability
    fn supports(&self, capability: SourceCapabilities) -> bool {
        self.capabilities().contains(capability)
    }

    /// Resolve a normalized DOI
    async fn resolve_doi(&self, _doi: &str) -> Result<Vec<Candidate>, SourceError> {
        Err(SourceError::NotImplemented)
    }

    /// Resolve a PubMed identifier
    async fn resolve_pmid(&self, _pmid: &str) -> Result<Vec<Candidate>, SourceError> {
        Err(SourceError::NotImplemented)
    }

    /// Resolve a compact ISBN-10 or ISBN-13
    async fn resolve_isbn(&self, _isbn: &str) -> Result<Vec<Candidate>, SourceError> {
        Err(SourceError::NotImplemented)
    }

    /// Whether a DOI is registered with any registration agency
    async fn doi_registered(&self, _doi: &str) -> Result<bool, SourceError> {
        Err(SourceError::NotImplemented)
    }

    /// Search for works matching the query
    async fn search(&self, _query: &SearchQuery) -> Result<Vec<Candidate>, SourceError> {
        Err(SourceError::NotImplemented)
    }
}

/// Errors that can occur when interacting with a source
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// The requested operation is not implemented for this source
    #[error("Operation not implemented for this source")]
    NotImplemented,

    /// Network or connection error
    #[error("Network error: {0}")]
    Network(String),

    /// The request did not complete in time
    #[error("Request timed out")]
    Timeout,

    /// Rate limit exceeded (with optional retry-after seconds)
    #[error("Rate limit exceeded")]
    RateLimit(Option<u64>),

    /// Server-side failure (5xx)
    #[error("Server error: HTTP {0}")]
    Server(u16),

    /// The requested record does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Skipped because the provider kept failing
    #[error("{0} skipped after repeated failures")]
    CircuitOpen(String),

    /// Parsing error (XML, JSON)
    #[error("Parse error: {0}")]
    Parse(String),

    /// API error from the source
    #[error("API error: {0}")]
    Api(String),

    /// Invalid request parameters
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Other error
    #[error("Error: {0}")]
    Other(String),
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SourceError::Timeout
        } else if err.is_decode() {
            SourceError::Parse(err.to_string())
        } else {
            SourceError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for SourceError {
    fn from(err: serde_json::Error) -> Self {
        SourceError::Parse(format!("JSON: {}", err))
    }
}

impl From<quick_xml::DeError> for SourceError {
    fn from(err: quick_xml::DeError) -> Self {
        SourceError::Parse(format!("XML: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Field, ReferenceFields, ReferenceType};

    #[test]
    fn test_source_capabilities() {
        let caps = SourceCapabilities::SEARCH | SourceCapabilities::DOI_LOOKUP;

        assert!(caps.contains(SourceCapabilities::SEARCH));
        assert!(caps.contains(SourceCapabilities::DOI_LOOKUP));
        assert!(!caps.contains(SourceCapabilities::ISBN_LOOKUP));
    }

    #[test]
    fn test_search_query_from_reference() {
        let reference = Reference {
            index: 3,
            label: Some(3),
            raw_text: String::new(),
            fields: ReferenceFields {
                authors: Field::Parsed(vec!["Smith J".to_string(), "Doe A".to_string()]),
                title: Field::Parsed("Deep learning for cells".to_string()),
                year: Field::Parsed(2020),
                ..Default::default()
            },
            reference_type: ReferenceType::JournalArticle,
        };

        let query = SearchQuery::from_reference(&reference, 5).unwrap();
        assert_eq!(query.text, "Deep learning for cells Smith J");
        assert_eq!(query.year, Some(2020));
        assert_eq!(query.max_results, 5);
    }

    #[test]
    fn test_search_query_requires_title() {
        let reference = Reference {
            index: 1,
            label: None,
            raw_text: String::new(),
            fields: ReferenceFields {
                authors: Field::Parsed(vec!["Smith J".to_string()]),
                ..Default::default()
            },
            reference_type: ReferenceType::Unknown,
        };
        assert!(SearchQuery::from_reference(&reference, 5).is_none());
    }
}

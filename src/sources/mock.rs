//! Scripted provider for tests and offline runs.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use crate::models::Candidate;
use crate::sources::{SearchQuery, Source, SourceCapabilities, SourceError};

/// Scripted answer for one lookup
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Return these records
    Found(Vec<Candidate>),
    /// The identifier does not exist
    NotFound,
    /// Fail with a network error
    NetworkError,
    /// Fail with an HTTP 5xx
    ServerError(u16),
    /// Never answer
    Hang,
}

impl MockReply {
    /// Shorthand for a single record
    pub fn found(candidate: Candidate) -> Self {
        MockReply::Found(vec![candidate])
    }
}

/// A mock source that answers from scripted replies.
///
/// Lookups without a scripted reply answer [`MockReply::NotFound`]; searches
/// without a matching script return no candidates. Searches are matched by
/// case-insensitive substring of the query text, in registration order.
/// Registration checks answer from [`MockSource::with_registered`], falling
/// back to whether the DOI script finds a record.
#[derive(Debug)]
pub struct MockSource {
    id: String,
    capabilities: SourceCapabilities,
    latency: Duration,
    doi: Mutex<HashMap<String, MockReply>>,
    pmid: Mutex<HashMap<String, MockReply>>,
    isbn: Mutex<HashMap<String, MockReply>>,
    registered: Mutex<HashMap<String, bool>>,
    search: Mutex<Vec<(String, MockReply)>>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockSource {
    /// Create a mock source supporting every capability
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            capabilities: SourceCapabilities::all(),
            latency: Duration::ZERO,
            doi: Mutex::new(HashMap::new()),
            pmid: Mutex::new(HashMap::new()),
            isbn: Mutex::new(HashMap::new()),
            registered: Mutex::new(HashMap::new()),
            search: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Restrict the declared capabilities
    pub fn with_capabilities(mut self, capabilities: SourceCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Delay every answer by `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_doi(self, doi: &str, reply: MockReply) -> Self {
        self.set_doi(doi, reply);
        self
    }

    pub fn with_pmid(self, pmid: &str, reply: MockReply) -> Self {
        lock(&self.pmid).insert(pmid.to_string(), reply);
        self
    }

    pub fn with_isbn(self, isbn: &str, reply: MockReply) -> Self {
        lock(&self.isbn).insert(isbn.to_string(), reply);
        self
    }

    /// Script the registration check for a DOI
    pub fn with_registered(self, doi: &str, registered: bool) -> Self {
        lock(&self.registered).insert(doi.to_lowercase(), registered);
        self
    }

    /// Answer searches whose text contains `needle`
    pub fn with_search(self, needle: &str, reply: MockReply) -> Self {
        lock(&self.search).push((needle.to_lowercase(), reply));
        self
    }

    /// Replace the scripted reply for a DOI
    pub fn set_doi(&self, doi: &str, reply: MockReply) {
        lock(&self.doi).insert(doi.to_lowercase(), reply);
    }

    /// Total number of calls received
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of calls that were in progress at the same time
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn answer(&self, reply: Option<MockReply>) -> Result<Vec<Candidate>, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let _guard = InFlight::enter(self);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        match reply.unwrap_or(MockReply::NotFound) {
            MockReply::Found(candidates) => Ok(candidates),
            MockReply::NotFound => Ok(Vec::new()),
            MockReply::NetworkError => {
                Err(SourceError::Network(format!("{} unreachable", self.id)))
            }
            MockReply::ServerError(status) => Err(SourceError::Server(status)),
            MockReply::Hang => {
                std::future::pending::<()>().await;
                Err(SourceError::Timeout)
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Tracks concurrent calls; decrements on drop so cancelled calls count too
struct InFlight<'a> {
    counter: &'a AtomicUsize,
}

impl<'a> InFlight<'a> {
    fn enter(source: &'a MockSource) -> Self {
        let now = source.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        source.max_in_flight.fetch_max(now, Ordering::SeqCst);
        Self {
            counter: &source.in_flight,
        }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Source for MockSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        "Mock Source"
    }

    fn capabilities(&self) -> SourceCapabilities {
        self.capabilities
    }

    async fn resolve_doi(&self, doi: &str) -> Result<Vec<Candidate>, SourceError> {
        let reply = lock(&self.doi).get(&doi.to_lowercase()).cloned();
        self.answer(reply).await
    }

    async fn resolve_pmid(&self, pmid: &str) -> Result<Vec<Candidate>, SourceError> {
        let reply = lock(&self.pmid).get(pmid).cloned();
        self.answer(reply).await
    }

    async fn resolve_isbn(&self, isbn: &str) -> Result<Vec<Candidate>, SourceError> {
        let reply = lock(&self.isbn).get(isbn).cloned();
        self.answer(reply).await
    }

    async fn doi_registered(&self, doi: &str) -> Result<bool, SourceError> {
        let key = doi.to_lowercase();
        let scripted = lock(&self.registered).get(&key).copied();
        match scripted {
            Some(registered) => self
                .answer(Some(MockReply::Found(Vec::new())))
                .await
                .map(|_| registered),
            None => {
                let reply = lock(&self.doi).get(&key).cloned();
                self.answer(reply).await.map(|found| !found.is_empty())
            }
        }
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<Candidate>, SourceError> {
        let text = query.text.to_lowercase();
        let reply = lock(&self.search)
            .iter()
            .find(|(needle, _)| text.contains(needle.as_str()))
            .map(|(_, reply)| reply.clone());
        self.answer(reply).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_replies() {
        let source = MockSource::new("mock")
            .with_doi("10.1000/A", MockReply::found(Candidate::new("A work")))
            .with_pmid("42", MockReply::ServerError(503));

        let found = source.resolve_doi("10.1000/a").await.unwrap();
        assert_eq!(found[0].title, "A work");

        assert!(source.resolve_doi("10.1000/other").await.unwrap().is_empty());
        assert!(matches!(
            source.resolve_pmid("42").await,
            Err(SourceError::Server(503))
        ));
        assert_eq!(source.calls(), 3);
    }

    #[tokio::test]
    async fn test_registration_check() {
        let source = MockSource::new("mock")
            .with_doi("10.1000/known", MockReply::found(Candidate::new("Known")))
            .with_doi("10.5281/zenodo.1", MockReply::NotFound)
            .with_registered("10.5281/zenodo.1", true)
            .with_doi("10.1000/down", MockReply::NetworkError);

        assert!(source.doi_registered("10.1000/known").await.unwrap());
        assert!(source.doi_registered("10.5281/ZENODO.1").await.unwrap());
        assert!(!source.doi_registered("10.1000/unknown").await.unwrap());
        assert!(source.doi_registered("10.1000/down").await.is_err());
    }

    #[tokio::test]
    async fn test_search_matches_substring() {
        let source = MockSource::new("mock")
            .with_search("thermometry", MockReply::found(Candidate::new("Thermometry")));
        let query = SearchQuery {
            text: "Nanometre THERMOMETRY in cells".to_string(),
            title: None,
            first_author: None,
            year: None,
            max_results: 5,
        };

        assert_eq!(source.search(&query).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_hang_is_cancellable() {
        let source = MockSource::new("mock").with_doi("10.1000/x", MockReply::Hang);

        let result =
            tokio::time::timeout(Duration::from_millis(20), source.resolve_doi("10.1000/x")).await;
        assert!(result.is_err());
        assert_eq!(source.in_flight.load(Ordering::SeqCst), 0);
        assert_eq!(source.max_in_flight(), 1);
    }
}

//! Registry for managing provider plugins.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use super::{CrossRefSource, DoiOrgSource, OpenLibrarySource, PubMedSource, Source, SourceError};
use crate::config::Config;
use crate::utils::{CircuitBreaker, HttpClient};

bitflags::bitflags! {
    /// Capabilities that a source can support
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SourceCapabilities: u32 {
        const SEARCH = 1 << 0;
        const DOI_LOOKUP = 1 << 1;
        const PMID_LOOKUP = 1 << 2;
        const ISBN_LOOKUP = 1 << 3;
        const DOI_REGISTRY = 1 << 4;
    }
}

/// Registry for all available providers
///
/// Sources are kept in registration order so that lookups are attempted
/// in a deterministic sequence. Each source gets its own [`CircuitBreaker`];
/// a registry made with [`SourceRegistry::new`] has breakers that never open
/// until [`SourceRegistry::with_breaker`] sets a threshold.
#[derive(Debug, Clone, Default)]
pub struct SourceRegistry {
    sources: Vec<Arc<dyn Source>>,
    breakers: HashMap<String, Arc<CircuitBreaker>>,
    breaker_failures: usize,
    breaker_cooldown: Duration,
}

impl SourceRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a source's circuit after `failures` consecutive transient
    /// failures and keep it open for `cooldown`
    pub fn with_breaker(mut self, failures: usize, cooldown: Duration) -> Self {
        self.breaker_failures = failures;
        self.breaker_cooldown = cooldown;
        self.breakers = self
            .sources
            .iter()
            .map(|s| (s.id().to_string(), Arc::new(self.new_breaker(s.id()))))
            .collect();
        self
    }

    fn new_breaker(&self, id: &str) -> CircuitBreaker {
        CircuitBreaker::new(id, self.breaker_failures, self.breaker_cooldown)
    }

    /// Create a registry with the built-in network providers
    ///
    /// All providers share `client`, and therefore one outbound rate limit.
    pub fn from_config(config: &Config, client: HttpClient) -> Self {
        let mut registry = Self::new().with_breaker(
            config.verification.breaker_failures,
            config.verification.breaker_cooldown(),
        );

        registry.register(Arc::new(CrossRefSource::with_client(
            client.clone(),
            &config.endpoints.crossref,
            config.api_keys.crossref_mailto.clone(),
        )));
        registry.register(Arc::new(PubMedSource::with_client(
            client.clone(),
            &config.endpoints.pubmed,
            config.api_keys.ncbi_api_key.clone(),
        )));
        registry.register(Arc::new(OpenLibrarySource::with_client(
            client.clone(),
            &config.endpoints.openlibrary,
        )));
        registry.register(Arc::new(DoiOrgSource::with_client(
            client,
            &config.endpoints.doi_org,
        )));

        registry
    }

    /// Register a new source, replacing any source with the same ID
    pub fn register(&mut self, source: Arc<dyn Source>) {
        let breaker = Arc::new(self.new_breaker(source.id()));
        self.breakers.insert(source.id().to_string(), breaker);
        match self.sources.iter().position(|s| s.id() == source.id()) {
            Some(pos) => self.sources[pos] = source,
            None => self.sources.push(source),
        }
    }

    /// Get a source by ID
    pub fn get(&self, id: &str) -> Option<&Arc<dyn Source>> {
        self.sources.iter().find(|s| s.id() == id)
    }

    /// Get a source by ID, returning an error if not found
    pub fn get_required(&self, id: &str) -> Result<&Arc<dyn Source>, SourceError> {
        self.get(id)
            .ok_or_else(|| SourceError::NotFound(format!("Source '{}' not found", id)))
    }

    /// Circuit breaker guarding calls to a source
    pub fn breaker(&self, id: &str) -> Option<&Arc<CircuitBreaker>> {
        self.breakers.get(id)
    }

    /// Get all registered sources
    pub fn all(&self) -> impl Iterator<Item = &Arc<dyn Source>> {
        self.sources.iter()
    }

    /// Get all source IDs
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.sources.iter().map(|s| s.id())
    }

    /// Get sources that support a specific capability
    pub fn with_capability(&self, capability: SourceCapabilities) -> Vec<Arc<dyn Source>> {
        self.all()
            .filter(|s| s.supports(capability))
            .cloned()
            .collect()
    }

    /// Check if a source exists
    pub fn has(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// Get the number of registered sources
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

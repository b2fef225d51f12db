//! Verification strategies.
//!
//! Each [`Verifier`] turns one reference into zero or more [`MethodReport`]s.
//! An empty list means the method does not apply (no identifier of that
//! kind, no title to search for). Providers are reached through the
//! [`SourceRegistry`]; every call goes through the provider's circuit
//! breaker and is wrapped in [`with_retry`].

use async_trait::async_trait;
use futures_util::future::join_all;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use crate::config::ThresholdConfig;
use crate::models::{Candidate, Evidence, EvidenceSource, Field, Reference, VerificationFailure};
use crate::sources::{SearchQuery, Source, SourceCapabilities, SourceError, SourceRegistry};
use crate::utils::{
    candidate_score, normalize_title, title_similarity, with_retry, RetryConfig, RetryResult,
};

/// Why a method answered "no"
#[derive(Debug, Clone, PartialEq)]
pub enum NotFoundReason {
    /// The authority for the identifier (doi.org, PubMed) does not know it
    Nonexistent,
    /// The identifier in the entry is structurally invalid
    MalformedIdentifier,
    /// Records came back but none matched the reference well enough
    NoMatch { candidates: usize, best_score: f64 },
    /// Several distinct works matched equally well
    Ambiguous { candidates: usize },
}

/// Result of one verification method
#[derive(Debug, Clone, PartialEq)]
pub enum MethodOutcome {
    Confirmed {
        evidence: Evidence,
        /// Descriptive text of the matched record
        summary: Option<String>,
    },
    NotFound(NotFoundReason),
    /// Providers failed; nothing can be concluded
    Inconclusive(String),
}

impl MethodOutcome {
    /// Outcomes that end the search for further evidence
    pub fn is_conclusive(&self) -> bool {
        matches!(
            self,
            MethodOutcome::Confirmed { .. }
                | MethodOutcome::NotFound(NotFoundReason::Nonexistent)
                | MethodOutcome::NotFound(NotFoundReason::MalformedIdentifier)
        )
    }
}

/// What one method found, plus the provider failures it ran into
#[derive(Debug, Clone, PartialEq)]
pub struct MethodReport {
    pub method: &'static str,

    pub source: EvidenceSource,

    /// What was looked up, e.g. `DOI 10.1000/x`
    pub subject: String,

    pub outcome: MethodOutcome,

    pub failures: Vec<VerificationFailure>,
}

impl MethodReport {
    fn new(method: &'static str, source: EvidenceSource, subject: impl Into<String>, outcome: MethodOutcome) -> Self {
        Self {
            method,
            source,
            subject: subject.into(),
            outcome,
            failures: Vec::new(),
        }
    }

    fn with_failures(mut self, failures: Vec<VerificationFailure>) -> Self {
        self.failures = failures;
        self
    }

    /// One-line human description of the outcome
    pub fn describe(&self) -> String {
        match &self.outcome {
            MethodOutcome::Confirmed { evidence, .. } => format!(
                "{} confirmed (confidence {:.2})",
                self.subject, evidence.confidence
            ),
            MethodOutcome::NotFound(NotFoundReason::Nonexistent) => match self.source {
                EvidenceSource::Doi => format!("{} is not registered", self.subject),
                source => format!("{} has no record in {}", self.subject, source.label()),
            },
            MethodOutcome::NotFound(NotFoundReason::MalformedIdentifier) => {
                format!("{} is malformed", self.subject)
            }
            MethodOutcome::NotFound(NotFoundReason::NoMatch { candidates: 0, .. }) => {
                format!("{}: no matching record", self.subject)
            }
            MethodOutcome::NotFound(NotFoundReason::NoMatch {
                candidates,
                best_score,
            }) => format!(
                "{}: {} similar record(s), best score {:.2}",
                self.subject, candidates, best_score
            ),
            MethodOutcome::NotFound(NotFoundReason::Ambiguous { candidates }) => {
                format!("{}: {} records match equally well", self.subject, candidates)
            }
            MethodOutcome::Inconclusive(reason) => {
                format!("{} could not be checked: {}", self.subject, reason)
            }
        }
    }
}

/// Shared state every verifier needs
#[derive(Debug, Clone)]
pub struct VerificationContext {
    pub registry: Arc<SourceRegistry>,

    pub retry: RetryConfig,

    pub thresholds: ThresholdConfig,

    pub search_max_results: usize,
}

/// One way of establishing that a reference exists
#[async_trait]
pub trait Verifier: Send + Sync + std::fmt::Debug {
    /// Method name used in notes and failures
    fn name(&self) -> &'static str;

    /// Run the method; an empty list means it does not apply
    async fn verify(&self, reference: &Reference, ctx: &VerificationContext) -> Vec<MethodReport>;
}

/// The default strategy order: DOI, then PMID/ISBN, then search
pub fn default_verifiers() -> Vec<Arc<dyn Verifier>> {
    vec![
        Arc::new(DoiVerifier),
        Arc::new(IdentifierVerifier),
        Arc::new(SearchVerifier),
    ]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lookup {
    Doi,
    Pmid,
    Isbn,
}

impl Lookup {
    fn method(self) -> &'static str {
        match self {
            Lookup::Doi => "doi",
            Lookup::Pmid => "pmid",
            Lookup::Isbn => "isbn",
        }
    }

    fn capability(self) -> SourceCapabilities {
        match self {
            Lookup::Doi => SourceCapabilities::DOI_LOOKUP,
            Lookup::Pmid => SourceCapabilities::PMID_LOOKUP,
            Lookup::Isbn => SourceCapabilities::ISBN_LOOKUP,
        }
    }

    fn evidence_source(self) -> EvidenceSource {
        match self {
            Lookup::Doi => EvidenceSource::Doi,
            Lookup::Pmid => EvidenceSource::Pubmed,
            Lookup::Isbn => EvidenceSource::IsbnCatalog,
        }
    }

    fn subject(self, id: &str) -> String {
        match self {
            Lookup::Doi => format!("DOI {}", id),
            Lookup::Pmid => format!("PMID {}", id),
            Lookup::Isbn => format!("ISBN {}", id),
        }
    }

    /// Canonical landing page for the identifier
    fn landing_url(self, id: &str, candidate: &Candidate) -> String {
        match self {
            Lookup::Doi => format!("https://doi.org/{}", id),
            Lookup::Pmid => candidate
                .url
                .clone()
                .unwrap_or_else(|| format!("https://pubmed.ncbi.nlm.nih.gov/{}/", id)),
            Lookup::Isbn => candidate
                .url
                .clone()
                .unwrap_or_else(|| format!("https://openlibrary.org/isbn/{}", id)),
        }
    }

    /// Whether an empty answer from a lookup provider proves the identifier
    /// does not exist.
    ///
    /// PubMed issues PMIDs itself. DOI metadata providers only know their
    /// own agency's DOIs, and ISBN catalogs are partial.
    fn empty_is_nonexistent(self) -> bool {
        matches!(self, Lookup::Pmid)
    }

    async fn call(self, source: &dyn Source, id: &str) -> Result<Vec<Candidate>, SourceError> {
        match self {
            Lookup::Doi => source.resolve_doi(id).await,
            Lookup::Pmid => source.resolve_pmid(id).await,
            Lookup::Isbn => source.resolve_isbn(id).await,
        }
    }
}

fn provider_error(source: &dyn Source, error: &SourceError) -> VerificationFailure {
    VerificationFailure::ProviderError {
        provider: source.id().to_string(),
        message: error.to_string(),
    }
}

/// Call a provider through its circuit breaker and the retry policy
///
/// Transient failures that survive every retry count against the breaker;
/// any answer from the provider, including "not found", resets it.
async fn guarded_call<T, F, Fut>(
    source: &dyn Source,
    ctx: &VerificationContext,
    label: &str,
    operation: F,
) -> Result<T, SourceError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, SourceError>>,
{
    let breaker = ctx.registry.breaker(source.id());
    if breaker.is_some_and(|b| !b.allows_request()) {
        tracing::debug!("{}: skipped, circuit open", label);
        return Err(SourceError::CircuitOpen(source.id().to_string()));
    }

    match with_retry(ctx.retry, label, operation).await {
        RetryResult::Success(value) => {
            if let Some(breaker) = breaker {
                breaker.record_success();
            }
            Ok(value)
        }
        RetryResult::TransientFailure(error, _, _) => {
            if let Some(breaker) = breaker {
                breaker.record_failure();
            }
            Err(error)
        }
        RetryResult::PermanentFailure(error) => {
            if let Some(breaker) = breaker {
                breaker.record_success();
            }
            Err(error)
        }
    }
}

/// Ask the DOI authority whether a DOI no lookup provider knows exists
///
/// Only a definite "not registered" proves the DOI is fabricated. A
/// registered DOI, or no answer at all, leaves the reference to search.
async fn confirm_missing_doi(
    doi: &str,
    ctx: &VerificationContext,
    failures: &mut Vec<VerificationFailure>,
) -> MethodOutcome {
    let no_record = MethodOutcome::NotFound(NotFoundReason::NoMatch {
        candidates: 0,
        best_score: 0.0,
    });

    for source in ctx.registry.with_capability(SourceCapabilities::DOI_REGISTRY) {
        let label = format!("{} registration check", source.id());
        match guarded_call(source.as_ref(), ctx, &label, || source.doi_registered(doi)).await {
            Ok(false) => return MethodOutcome::NotFound(NotFoundReason::Nonexistent),
            Ok(true) => {
                tracing::debug!(
                    "DOI {} is registered but no lookup provider has its metadata",
                    doi
                );
                return no_record;
            }
            Err(SourceError::NotImplemented) => continue,
            Err(e) => {
                tracing::warn!("{} could not check DOI {}: {}", source.id(), doi, e);
                failures.push(provider_error(source.as_ref(), &e));
            }
        }
    }

    no_record
}

/// Resolve one identifier against every provider that can, in registry order
async fn resolve_identifier(
    kind: Lookup,
    id: &str,
    reference: &Reference,
    ctx: &VerificationContext,
) -> MethodReport {
    let subject = kind.subject(id);
    let report = |outcome| MethodReport::new(kind.method(), kind.evidence_source(), subject.clone(), outcome);

    let sources = ctx.registry.with_capability(kind.capability());
    if sources.is_empty() {
        return report(MethodOutcome::Inconclusive(format!(
            "no provider offers {} lookup",
            kind.method().to_uppercase()
        )));
    }

    let mut failures = Vec::new();
    let mut answered_empty = false;

    for source in &sources {
        let label = format!("{} {} lookup", source.id(), kind.method());
        let result = guarded_call(source.as_ref(), ctx, &label, || kind.call(source.as_ref(), id)).await;

        match result {
            Ok(candidates) if !candidates.is_empty() => {
                let outcome = judge_identifier(kind, id, reference, &candidates, &ctx.thresholds);
                return report(outcome).with_failures(failures);
            }
            Ok(_) | Err(SourceError::NotFound(_)) => {
                tracing::debug!("{}: {} has no record", source.id(), subject);
                if kind.empty_is_nonexistent() {
                    return report(MethodOutcome::NotFound(NotFoundReason::Nonexistent))
                        .with_failures(failures);
                }
                answered_empty = true;
            }
            Err(SourceError::NotImplemented) => continue,
            Err(e) => {
                tracing::warn!("{} lookup of {} failed: {}", source.id(), subject, e);
                failures.push(provider_error(source.as_ref(), &e));
            }
        }
    }

    if answered_empty {
        let outcome = match kind {
            Lookup::Doi => confirm_missing_doi(id, ctx, &mut failures).await,
            _ => MethodOutcome::NotFound(NotFoundReason::NoMatch {
                candidates: 0,
                best_score: 0.0,
            }),
        };
        return report(outcome).with_failures(failures);
    }

    report(MethodOutcome::Inconclusive("every provider failed".to_string())).with_failures(failures)
}

/// Decide whether a resolved record is the work the reference describes
fn judge_identifier(
    kind: Lookup,
    id: &str,
    reference: &Reference,
    candidates: &[Candidate],
    thresholds: &ThresholdConfig,
) -> MethodOutcome {
    let Some(title) = reference.fields.title.parsed() else {
        let candidate = &candidates[0];
        return MethodOutcome::Confirmed {
            evidence: Evidence::new(kind.evidence_source(), Some(kind.landing_url(id, candidate)), 0.8),
            summary: Some(candidate.descriptive_text()),
        };
    };

    let (best, agreement) = candidates
        .iter()
        .map(|c| (c, title_similarity(title, &c.title)))
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .unwrap_or((&candidates[0], 0.0));

    if agreement >= thresholds.identifier_title_agreement {
        MethodOutcome::Confirmed {
            evidence: Evidence::new(
                kind.evidence_source(),
                Some(kind.landing_url(id, best)),
                0.6 + 0.4 * agreement,
            ),
            summary: Some(best.descriptive_text()),
        }
    } else {
        tracing::debug!(
            "{} resolves to \"{}\", which disagrees with \"{}\" ({:.2})",
            kind.subject(id),
            best.title,
            title,
            agreement
        );
        MethodOutcome::NotFound(NotFoundReason::NoMatch {
            candidates: candidates.len(),
            best_score: agreement,
        })
    }
}

fn malformed_report(kind: Lookup, raw: &str) -> MethodReport {
    MethodReport::new(
        kind.method(),
        kind.evidence_source(),
        kind.subject(raw),
        MethodOutcome::NotFound(NotFoundReason::MalformedIdentifier),
    )
}

async fn identifier_report(
    kind: Lookup,
    field: &Field<String>,
    reference: &Reference,
    ctx: &VerificationContext,
) -> Option<MethodReport> {
    match field {
        Field::Parsed(id) => Some(resolve_identifier(kind, id, reference, ctx).await),
        Field::Malformed(raw) => Some(malformed_report(kind, raw)),
        Field::Absent => None,
    }
}

/// Resolves the entry's DOI
#[derive(Debug, Default, Clone, Copy)]
pub struct DoiVerifier;

#[async_trait]
impl Verifier for DoiVerifier {
    fn name(&self) -> &'static str {
        "doi"
    }

    async fn verify(&self, reference: &Reference, ctx: &VerificationContext) -> Vec<MethodReport> {
        identifier_report(Lookup::Doi, &reference.fields.doi, reference, ctx)
            .await
            .into_iter()
            .collect()
    }
}

/// Resolves the entry's PMID, then its ISBN
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentifierVerifier;

#[async_trait]
impl Verifier for IdentifierVerifier {
    fn name(&self) -> &'static str {
        "identifier"
    }

    async fn verify(&self, reference: &Reference, ctx: &VerificationContext) -> Vec<MethodReport> {
        let mut reports = Vec::new();

        if let Some(report) = identifier_report(Lookup::Pmid, &reference.fields.pmid, reference, ctx).await {
            let conclusive = report.outcome.is_conclusive();
            reports.push(report);
            if conclusive {
                return reports;
            }
        }

        if let Some(report) = identifier_report(Lookup::Isbn, &reference.fields.isbn, reference, ctx).await {
            reports.push(report);
        }

        reports
    }
}

/// Searches every search-capable provider by title and first author
#[derive(Debug, Default, Clone, Copy)]
pub struct SearchVerifier;

impl SearchVerifier {
    fn dedup_key(candidate: &Candidate) -> String {
        match &candidate.identifier {
            Some(id) => id.to_lowercase(),
            None => normalize_title(&candidate.title),
        }
    }

    fn evidence_url(candidate: &Candidate) -> Option<String> {
        candidate.url.clone().or_else(|| {
            candidate
                .identifier
                .as_deref()
                .and_then(|id| id.strip_prefix("doi:"))
                .map(|doi| format!("https://doi.org/{}", doi))
        })
    }
}

#[async_trait]
impl Verifier for SearchVerifier {
    fn name(&self) -> &'static str {
        "search"
    }

    async fn verify(&self, reference: &Reference, ctx: &VerificationContext) -> Vec<MethodReport> {
        let Some(query) = SearchQuery::from_reference(reference, ctx.search_max_results) else {
            return Vec::new();
        };

        let subject = format!("search for \"{}\"", query.title.as_deref().unwrap_or(&query.text));
        let report = |outcome| MethodReport::new("search", EvidenceSource::WebSearch, subject.clone(), outcome);

        let sources = ctx.registry.with_capability(SourceCapabilities::SEARCH);
        if sources.is_empty() {
            return vec![report(MethodOutcome::Inconclusive(
                "no search provider configured".to_string(),
            ))];
        }

        let calls = sources.iter().map(|source| {
            let query = &query;
            async move {
                let label = format!("{} search", source.id());
                let result = guarded_call(source.as_ref(), ctx, &label, || source.search(query)).await;
                (source, result)
            }
        });

        let mut failures = Vec::new();
        let mut answered = false;
        let mut seen = HashSet::new();
        let mut scored: Vec<(Candidate, f64)> = Vec::new();

        for (source, result) in join_all(calls).await {
            match result {
                Ok(candidates) => {
                    answered = true;
                    for candidate in candidates {
                        if seen.insert(Self::dedup_key(&candidate)) {
                            let score = candidate_score(reference, &candidate);
                            scored.push((candidate, score));
                        }
                    }
                }
                Err(SourceError::NotFound(_)) => answered = true,
                Err(SourceError::NotImplemented) => {}
                Err(e) => {
                    tracing::warn!("{} search failed: {}", source.id(), e);
                    failures.push(provider_error(source.as_ref(), &e));
                }
            }
        }

        if !answered {
            return vec![report(MethodOutcome::Inconclusive("every provider failed".to_string()))
                .with_failures(failures)];
        }

        let thresholds = &ctx.thresholds;
        let mut matches: Vec<&(Candidate, f64)> = scored
            .iter()
            .filter(|(_, score)| *score >= thresholds.search_match)
            .collect();

        let outcome = match matches.len() {
            1 => {
                let (candidate, score) = matches.remove(0);
                MethodOutcome::Confirmed {
                    evidence: Evidence::new(EvidenceSource::WebSearch, Self::evidence_url(candidate), *score),
                    summary: Some(candidate.descriptive_text()),
                }
            }
            0 => {
                let best_score = scored.iter().map(|(_, s)| *s).fold(0.0, f64::max);
                let near_misses = scored
                    .iter()
                    .filter(|(_, s)| *s >= thresholds.search_near_miss)
                    .count();
                MethodOutcome::NotFound(NotFoundReason::NoMatch {
                    candidates: near_misses,
                    best_score,
                })
            }
            n => MethodOutcome::NotFound(NotFoundReason::Ambiguous { candidates: n }),
        };

        vec![report(outcome).with_failures(failures)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ReferenceFields, ReferenceType};
    use crate::sources::{MockReply, MockSource};
    use std::time::Duration;

    fn context(sources: Vec<MockSource>) -> VerificationContext {
        let mut registry = SourceRegistry::new();
        for source in sources {
            registry.register(Arc::new(source));
        }
        VerificationContext {
            registry: Arc::new(registry),
            retry: RetryConfig {
                max_retries: 1,
                initial_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(2),
                backoff_multiplier: 2.0,
                attempt_timeout: Duration::from_millis(200),
            },
            thresholds: ThresholdConfig::default(),
            search_max_results: 5,
        }
    }

    fn reference(fields: ReferenceFields) -> Reference {
        Reference {
            index: 1,
            label: Some(1),
            raw_text: "entry".to_string(),
            fields,
            reference_type: ReferenceType::JournalArticle,
        }
    }

    fn titled(title: &str) -> ReferenceFields {
        ReferenceFields {
            authors: Field::Parsed(vec!["Smith J".to_string()]),
            title: Field::Parsed(title.to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_doi_confirmed_when_titles_agree() {
        let mut fields = titled("Deep learning for cell segmentation");
        fields.doi = Field::Parsed("10.1000/cells".to_string());
        let ctx = context(vec![MockSource::new("mock").with_doi(
            "10.1000/cells",
            MockReply::found(Candidate::new("Deep Learning for Cell Segmentation").summary("Nature Methods")),
        )]);

        let reports = DoiVerifier.verify(&reference(fields), &ctx).await;
        assert_eq!(reports.len(), 1);
        match &reports[0].outcome {
            MethodOutcome::Confirmed { evidence, summary } => {
                assert_eq!(evidence.url.as_deref(), Some("https://doi.org/10.1000/cells"));
                assert!((evidence.confidence - 1.0).abs() < 1e-9);
                assert!(summary.as_deref().unwrap().contains("Nature Methods"));
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_doi_with_disagreeing_title_is_no_match() {
        let mut fields = titled("Deep learning for cell segmentation");
        fields.doi = Field::Parsed("10.1000/cells".to_string());
        let ctx = context(vec![MockSource::new("mock").with_doi(
            "10.1000/cells",
            MockReply::found(Candidate::new("Soil erosion in alpine meadows")),
        )]);

        let reports = DoiVerifier.verify(&reference(fields), &ctx).await;
        assert!(matches!(
            reports[0].outcome,
            MethodOutcome::NotFound(NotFoundReason::NoMatch { candidates: 1, .. })
        ));
    }

    #[tokio::test]
    async fn test_unknown_doi_is_nonexistent() {
        let mut fields = titled("Anything");
        fields.doi = Field::Parsed("10.1038/bad-doi-404".to_string());
        let ctx = context(vec![MockSource::new("mock").with_doi("10.1038/bad-doi-404", MockReply::NotFound)]);

        let reports = DoiVerifier.verify(&reference(fields), &ctx).await;
        assert_eq!(reports[0].outcome, MethodOutcome::NotFound(NotFoundReason::Nonexistent));
        assert!(reports[0].outcome.is_conclusive());
        assert_eq!(reports[0].describe(), "DOI 10.1038/bad-doi-404 is not registered");
    }

    fn crossref_and_doi_org(doi: &str, registry: MockSource) -> VerificationContext {
        context(vec![
            MockSource::new("crossref")
                .with_capabilities(SourceCapabilities::DOI_LOOKUP | SourceCapabilities::SEARCH)
                .with_doi(doi, MockReply::NotFound),
            registry.with_capabilities(SourceCapabilities::DOI_REGISTRY),
        ])
    }

    #[tokio::test]
    async fn test_doi_from_another_agency_is_not_nonexistent() {
        let doi = "10.48550/arXiv.1706.03762";
        let mut fields = titled("Attention is all you need");
        fields.doi = Field::Parsed(doi.to_string());
        let ctx = crossref_and_doi_org(doi, MockSource::new("doi.org").with_registered(doi, true));

        let reports = DoiVerifier.verify(&reference(fields), &ctx).await;
        assert_eq!(
            reports[0].outcome,
            MethodOutcome::NotFound(NotFoundReason::NoMatch {
                candidates: 0,
                best_score: 0.0
            })
        );
        assert!(!reports[0].outcome.is_conclusive());
    }

    #[tokio::test]
    async fn test_doi_unknown_to_every_agency_is_nonexistent() {
        let doi = "10.1038/bad-doi-404";
        let mut fields = titled("Anything");
        fields.doi = Field::Parsed(doi.to_string());
        let ctx = crossref_and_doi_org(doi, MockSource::new("doi.org").with_registered(doi, false));

        let reports = DoiVerifier.verify(&reference(fields), &ctx).await;
        assert_eq!(reports[0].outcome, MethodOutcome::NotFound(NotFoundReason::Nonexistent));
    }

    #[tokio::test]
    async fn test_unreachable_doi_authority_proves_nothing() {
        let doi = "10.5281/zenodo.1234";
        let mut fields = titled("A dataset");
        fields.doi = Field::Parsed(doi.to_string());
        let ctx = crossref_and_doi_org(
            doi,
            MockSource::new("doi.org").with_doi(doi, MockReply::NetworkError),
        );

        let reports = DoiVerifier.verify(&reference(fields), &ctx).await;
        assert!(matches!(
            reports[0].outcome,
            MethodOutcome::NotFound(NotFoundReason::NoMatch { candidates: 0, .. })
        ));
        assert!(matches!(
            &reports[0].failures[0],
            VerificationFailure::ProviderError { provider, .. } if provider == "doi.org"
        ));
    }

    #[tokio::test]
    async fn test_open_circuit_skips_provider() {
        let source = Arc::new(MockSource::new("down").with_doi("10.1000/x", MockReply::ServerError(503)));
        let mut registry = SourceRegistry::new().with_breaker(1, Duration::from_secs(60));
        registry.register(source.clone());
        let mut ctx = context(Vec::new());
        ctx.registry = Arc::new(registry);

        let mut fields = titled("Anything");
        fields.doi = Field::Parsed("10.1000/x".to_string());

        let first = DoiVerifier.verify(&reference(fields.clone()), &ctx).await;
        assert!(matches!(first[0].outcome, MethodOutcome::Inconclusive(_)));
        let calls = source.calls();

        let second = DoiVerifier.verify(&reference(fields), &ctx).await;
        assert!(matches!(second[0].outcome, MethodOutcome::Inconclusive(_)));
        assert_eq!(source.calls(), calls);
        assert!(matches!(
            &second[0].failures[0],
            VerificationFailure::ProviderError { message, .. } if message.contains("skipped")
        ));
    }

    #[tokio::test]
    async fn test_malformed_doi_skips_providers() {
        let source = Arc::new(MockSource::new("mock"));
        let mut registry = SourceRegistry::new();
        registry.register(source.clone());
        let mut ctx = context(Vec::new());
        ctx.registry = Arc::new(registry);

        let mut fields = titled("Anything");
        fields.doi = Field::Malformed("doi:not-a-doi".to_string());

        let reports = DoiVerifier.verify(&reference(fields), &ctx).await;
        assert_eq!(
            reports[0].outcome,
            MethodOutcome::NotFound(NotFoundReason::MalformedIdentifier)
        );
        assert_eq!(source.calls(), 0);
    }

    #[tokio::test]
    async fn test_failed_provider_falls_through_to_next() {
        let mut fields = titled("Deep learning for cell segmentation");
        fields.doi = Field::Parsed("10.1000/cells".to_string());
        let ctx = context(vec![
            MockSource::new("down").with_doi("10.1000/cells", MockReply::NetworkError),
            MockSource::new("up").with_doi(
                "10.1000/cells",
                MockReply::found(Candidate::new("Deep learning for cell segmentation")),
            ),
        ]);

        let reports = DoiVerifier.verify(&reference(fields), &ctx).await;
        assert!(matches!(reports[0].outcome, MethodOutcome::Confirmed { .. }));
        assert_eq!(reports[0].failures.len(), 1);
    }

    #[tokio::test]
    async fn test_all_providers_failing_is_inconclusive() {
        let mut fields = titled("Anything");
        fields.doi = Field::Parsed("10.1000/x".to_string());
        let ctx = context(vec![MockSource::new("down").with_doi("10.1000/x", MockReply::ServerError(503))]);

        let reports = DoiVerifier.verify(&reference(fields), &ctx).await;
        assert!(matches!(reports[0].outcome, MethodOutcome::Inconclusive(_)));
        assert!(matches!(
            &reports[0].failures[0],
            VerificationFailure::ProviderError { provider, .. } if provider == "down"
        ));
    }

    #[tokio::test]
    async fn test_pmid_conclusive_skips_isbn() {
        let mut fields = titled("Anything");
        fields.pmid = Field::Parsed("12345".to_string());
        fields.isbn = Field::Parsed("9780306406157".to_string());
        let ctx = context(vec![MockSource::new("mock")]);

        let reports = IdentifierVerifier.verify(&reference(fields), &ctx).await;
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].source, EvidenceSource::Pubmed);
    }

    #[tokio::test]
    async fn test_missing_isbn_is_not_proof_of_absence() {
        let mut fields = titled("A book");
        fields.isbn = Field::Parsed("9780306406157".to_string());
        let ctx = context(vec![MockSource::new("mock")]);

        let reports = IdentifierVerifier.verify(&reference(fields), &ctx).await;
        assert_eq!(
            reports[0].outcome,
            MethodOutcome::NotFound(NotFoundReason::NoMatch {
                candidates: 0,
                best_score: 0.0
            })
        );
    }

    #[tokio::test]
    async fn test_search_single_strong_match_confirms() {
        let ctx = context(vec![MockSource::new("mock").with_search(
            "graph neural networks",
            MockReply::Found(vec![
                Candidate::new("Graph neural networks: a review")
                    .authors(vec!["Smith, John".to_string()])
                    .identifier("doi:10.1/gnn"),
                Candidate::new("Cooking with cast iron"),
            ]),
        )]);

        let reports = SearchVerifier
            .verify(&reference(titled("Graph neural networks: a review")), &ctx)
            .await;
        match &reports[0].outcome {
            MethodOutcome::Confirmed { evidence, .. } => {
                assert_eq!(evidence.source, EvidenceSource::WebSearch);
                assert_eq!(evidence.url.as_deref(), Some("https://doi.org/10.1/gnn"));
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_search_two_strong_matches_is_ambiguous() {
        let ctx = context(vec![MockSource::new("mock").with_search(
            "graph neural networks",
            MockReply::Found(vec![
                Candidate::new("Graph neural networks: a review")
                    .authors(vec!["Smith J".to_string()])
                    .identifier("doi:10.1/a"),
                Candidate::new("Graph neural networks: a review")
                    .authors(vec!["Smith J".to_string()])
                    .identifier("doi:10.1/b"),
            ]),
        )]);

        let reports = SearchVerifier
            .verify(&reference(titled("Graph neural networks: a review")), &ctx)
            .await;
        assert_eq!(
            reports[0].outcome,
            MethodOutcome::NotFound(NotFoundReason::Ambiguous { candidates: 2 })
        );
    }

    #[tokio::test]
    async fn test_search_counts_only_near_misses() {
        let ctx = context(vec![MockSource::new("mock").with_search(
            "graph neural networks",
            MockReply::Found(vec![
                Candidate::new("Graph neural networks for molecules").authors(vec!["Smith J".to_string()]),
                Candidate::new("Cooking with cast iron"),
            ]),
        )]);

        let reports = SearchVerifier
            .verify(&reference(titled("Graph neural networks: a review")), &ctx)
            .await;
        match reports[0].outcome {
            MethodOutcome::NotFound(NotFoundReason::NoMatch { candidates, best_score }) => {
                assert_eq!(candidates, 1);
                assert!(best_score < ThresholdConfig::default().search_match);
            }
            ref other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_search_not_applicable_without_title() {
        let ctx = context(vec![MockSource::new("mock")]);
        let reports = SearchVerifier.verify(&reference(ReferenceFields::default()), &ctx).await;
        assert!(reports.is_empty());
    }
}

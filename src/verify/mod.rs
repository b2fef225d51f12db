//! Verification orchestration.
//!
//! The [`VerificationOrchestrator`] runs one task per reference on a
//! [`JoinSet`], bounded by a semaphore. Inside a task the [`Verifier`]
//! strategies are tried in priority order until one of them reaches a
//! conclusive answer; their reports are then folded into a single
//! [`VerificationResult`] by [`status::finalize`].
//!
//! # Example
//!
//! ```no_run
//! use reference_checker::config::Config;
//! use reference_checker::sources::SourceRegistry;
//! use reference_checker::utils::HttpClient;
//! use reference_checker::verify::VerificationOrchestrator;
//!
//! # async fn run(
//! #     references: Vec<reference_checker::models::Reference>,
//! # ) -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::default();
//! let client = HttpClient::new(config.verification.requests_per_second)?;
//! let registry = SourceRegistry::from_config(&config, client);
//! let results = VerificationOrchestrator::new(registry, &config)
//!     .verify_all(&references)
//!     .await;
//! println!("{} references checked", results.len());
//! # Ok(())
//! # }
//! ```

pub mod status;
pub mod strategy;

pub use status::{derive_status, finalize, reconcile};
pub use strategy::{
    default_verifiers, DoiVerifier, IdentifierVerifier, MethodOutcome, MethodReport, NotFoundReason,
    SearchVerifier, VerificationContext, Verifier,
};

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{timeout_at, Instant};

use crate::config::Config;
use crate::models::{Reference, VerificationResult, VerificationStatus};
use crate::sources::SourceRegistry;
use crate::utils::{CacheResult, RetryConfig, VerificationCache};

/// Note attached to references whose task did not finish before the deadline
pub const INCOMPLETE_NOTE: &str = "verification incomplete";

/// Progress notification emitted while verifying
#[derive(Debug, Clone, PartialEq)]
pub enum VerificationEvent {
    Started {
        reference_index: u32,
        total: usize,
    },
    Finished {
        reference_index: u32,
        status: VerificationStatus,
        completed: usize,
        total: usize,
    },
}

pub type ProgressCallback = Arc<dyn Fn(VerificationEvent) + Send + Sync>;

/// Verifies every reference of a document against the registered providers
#[derive(Clone)]
pub struct VerificationOrchestrator {
    ctx: Arc<VerificationContext>,
    verifiers: Arc<Vec<Arc<dyn Verifier>>>,
    max_concurrent: usize,
    deadline: Option<Duration>,
    cache: Option<(VerificationCache, String)>,
    refresh: bool,
    progress: Option<ProgressCallback>,
}

impl std::fmt::Debug for VerificationOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerificationOrchestrator")
            .field("sources", &self.ctx.registry.ids().collect::<Vec<_>>())
            .field("verifiers", &self.verifiers.iter().map(|v| v.name()).collect::<Vec<_>>())
            .field("max_concurrent", &self.max_concurrent)
            .field("deadline", &self.deadline)
            .field("refresh", &self.refresh)
            .finish()
    }
}

impl VerificationOrchestrator {
    pub fn new(registry: SourceRegistry, config: &Config) -> Self {
        let ctx = VerificationContext {
            registry: Arc::new(registry),
            retry: RetryConfig::from(&config.verification),
            thresholds: config.thresholds.clone(),
            search_max_results: config.verification.search_max_results,
        };

        Self {
            ctx: Arc::new(ctx),
            verifiers: Arc::new(default_verifiers()),
            max_concurrent: config.verification.max_concurrent,
            deadline: config.verification.run_deadline(),
            cache: None,
            refresh: false,
            progress: None,
        }
    }

    /// Reuse and store results in `cache` under `document_key`
    pub fn with_cache(mut self, cache: VerificationCache, document_key: impl Into<String>) -> Self {
        self.cache = Some((cache, document_key.into()));
        self
    }

    /// Re-verify cached results instead of reusing them
    pub fn refresh(mut self, refresh: bool) -> Self {
        self.refresh = refresh;
        self
    }

    /// Abort verification still running after `deadline`
    pub fn deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent;
        self
    }

    /// Override per-call timeout and retry behavior
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        Arc::make_mut(&mut self.ctx).retry = retry;
        self
    }

    pub fn on_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    /// Replace the strategy list; strategies run in the given order
    pub fn with_verifiers(mut self, verifiers: Vec<Arc<dyn Verifier>>) -> Self {
        self.verifiers = Arc::new(verifiers);
        self
    }

    fn emit(&self, event: VerificationEvent) {
        if let Some(callback) = &self.progress {
            callback(event);
        }
    }

    fn cached(&self, reference: &Reference) -> Option<VerificationResult> {
        let (cache, key) = self.cache.as_ref()?;
        match cache.get(key, reference) {
            CacheResult::Hit(result) => Some(result),
            CacheResult::Miss | CacheResult::Stale => None,
        }
    }

    fn store(&self, reference: &Reference, result: &VerificationResult) {
        if let Some((cache, key)) = &self.cache {
            if result.checked {
                cache.put(key, reference, result);
            }
        }
    }

    /// Verify one reference without touching the cache
    pub async fn verify_one(&self, reference: &Reference) -> VerificationResult {
        if !reference.is_verifiable() {
            return unverifiable(reference);
        }
        run_verifiers(reference, &self.ctx, &self.verifiers).await
    }

    /// Verify every reference, returning one result per reference index
    pub async fn verify_all(&self, references: &[Reference]) -> BTreeMap<u32, VerificationResult> {
        let total = references.len();
        let mut results = BTreeMap::new();
        let mut completed = 0;

        let semaphore = Arc::new(Semaphore::new(self.max_concurrent.max(1)));
        let mut tasks = JoinSet::new();

        for reference in references {
            if !reference.is_verifiable() {
                let result = unverifiable(reference);
                completed += 1;
                self.emit(finished(&result, completed, total));
                results.insert(reference.index, result);
                continue;
            }

            let cached = self.cached(reference);
            if let Some(hit) = &cached {
                if !self.refresh && hit.status != VerificationStatus::Unverified {
                    tracing::debug!("Reusing cached result for reference {}", reference.index);
                    completed += 1;
                    self.emit(finished(hit, completed, total));
                    results.insert(reference.index, hit.clone());
                    continue;
                }
            }

            let reference = reference.clone();
            let ctx = Arc::clone(&self.ctx);
            let verifiers = Arc::clone(&self.verifiers);
            let semaphore = Arc::clone(&semaphore);
            let progress = self.progress.clone();

            tasks.spawn(async move {
                // The semaphore is never closed, so acquisition cannot fail
                let _permit = semaphore.acquire_owned().await.ok();
                if let Some(callback) = &progress {
                    callback(VerificationEvent::Started {
                        reference_index: reference.index,
                        total,
                    });
                }
                let fresh = run_verifiers(&reference, &ctx, &verifiers).await;
                (reference, cached, fresh)
            });
        }

        let deadline = self.deadline.map(|d| Instant::now() + d);

        loop {
            let next = match deadline {
                Some(at) => match timeout_at(at, tasks.join_next()).await {
                    Ok(next) => next,
                    Err(_) => {
                        tracing::warn!(
                            "Verification deadline reached with {} reference(s) pending",
                            tasks.len()
                        );
                        tasks.abort_all();
                        break;
                    }
                },
                None => tasks.join_next().await,
            };

            let Some(joined) = next else {
                break;
            };

            match joined {
                Ok((reference, cached, fresh)) => {
                    let result = match cached {
                        Some(cached) if self.refresh => reconcile(cached, fresh),
                        _ => fresh,
                    };
                    self.store(&reference, &result);
                    completed += 1;
                    self.emit(finished(&result, completed, total));
                    results.insert(reference.index, result);
                }
                Err(e) => tracing::error!("Verification task failed: {}", e),
            }
        }

        for reference in references {
            results.entry(reference.index).or_insert_with(|| {
                completed += 1;
                let result = VerificationResult::not_checked(reference.index, INCOMPLETE_NOTE);
                self.emit(finished(&result, completed, total));
                result
            });
        }

        results
    }
}

fn finished(result: &VerificationResult, completed: usize, total: usize) -> VerificationEvent {
    VerificationEvent::Finished {
        reference_index: result.reference_index,
        status: result.status,
        completed,
        total,
    }
}

fn unverifiable(reference: &Reference) -> VerificationResult {
    VerificationResult::not_checked(reference.index, "no identifier or title to verify")
}

/// Try each strategy in order until one is conclusive
async fn run_verifiers(
    reference: &Reference,
    ctx: &VerificationContext,
    verifiers: &[Arc<dyn Verifier>],
) -> VerificationResult {
    let mut reports = Vec::new();

    for verifier in verifiers {
        let found = verifier.verify(reference, ctx).await;
        let conclusive = found.iter().any(|r| r.outcome.is_conclusive());
        reports.extend(found);
        if conclusive {
            tracing::debug!(
                "Reference {} settled by {} verification",
                reference.index,
                verifier.name()
            );
            break;
        }
    }

    finalize(reference.index, &reports)
}

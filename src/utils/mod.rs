//! Utility modules shared by the checking pipeline.
//!
//! - [`validate_doi`], [`validate_pmid`], [`validate_isbn`], [`validate_url`]:
//!   structural validation of identifiers found in reference entries
//! - [`title_similarity`], [`candidate_score`], [`are_duplicate_references`]:
//!   fuzzy matching used for duplicate detection and search confidence
//! - [`HttpClient`]: HTTP client with a shared outbound rate limit
//! - [`with_retry`]: per-attempt timeout plus exponential backoff on
//!   transient provider errors
//! - [`CircuitBreaker`]: stops calling a provider that keeps failing
//! - [`VerificationCache`]: file cache of verification results
//!
//! # Retry with Backoff
//!
//! ```rust,no_run
//! use reference_checker::utils::{with_retry, RetryConfig};
//! use reference_checker::sources::SourceError;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let result = with_retry(RetryConfig::default(), "lookup", || async {
//!     Ok::<_, SourceError>("data")
//! })
//! .await
//! .into_result();
//! assert!(result.is_ok());
//! # }
//! ```

mod cache;
mod circuit_breaker;
mod display;
mod http;
mod retry;
mod similarity;
mod validate;

pub use cache::{CacheResult, VerificationCache};
pub use circuit_breaker::{CircuitBreaker, CircuitState};
pub use display::{collapse_whitespace, display_width, truncate_with_ellipsis};
pub use http::{status_error, HttpClient};
pub use retry::{with_retry, RetryConfig, RetryResult, TransientError};
pub(crate) use similarity::is_cjk;
pub use similarity::{
    are_duplicate_references, author_similarity, candidate_score, normalize_title, surname,
    title_similarity, tokenize,
};
pub use validate::{validate_doi, validate_isbn, validate_pmid, validate_url, ValidationError};

//! Configuration management.
//!
//! Configuration is read from a TOML file (see [`find_config_file`]) and can
//! be overridden with `REFERENCE_CHECKER__<SECTION>__<KEY>` environment
//! variables, e.g. `REFERENCE_CHECKER__VERIFICATION__MAX_CONCURRENT=2`.

mod file_config;

pub use file_config::{init_config, save_config, ConfigFileError};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable prefix for configuration overrides
pub const ENV_PREFIX: &str = "REFERENCE_CHECKER";

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Verification scheduling and retry settings
    #[serde(default)]
    pub verification: VerificationConfig,

    /// Similarity and relevance thresholds
    #[serde(default)]
    pub thresholds: ThresholdConfig,

    /// Entity extraction settings
    #[serde(default)]
    pub extraction: ExtractionConfig,

    /// API keys for external services
    #[serde(default)]
    pub api_keys: ApiKeys,

    /// Provider base URLs
    #[serde(default)]
    pub endpoints: EndpointConfig,

    /// Verification result cache
    #[serde(default)]
    pub cache: CacheConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Verification scheduling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VerificationConfig {
    /// Maximum number of references verified at once
    pub max_concurrent: usize,

    /// Outbound requests per second, shared by all providers
    pub requests_per_second: u32,

    /// Timeout for a single provider call
    pub timeout_secs: u64,

    /// Retries after a transient failure
    pub max_retries: u32,

    pub initial_backoff_ms: u64,

    pub max_backoff_ms: u64,

    /// Optional deadline for the whole verification run
    pub run_deadline_secs: Option<u64>,

    /// Candidates requested from search providers
    pub search_max_results: usize,

    /// Consecutive transient failures before a provider is skipped (0 disables)
    pub breaker_failures: usize,

    /// How long a failing provider is skipped before it is tried again
    pub breaker_cooldown_secs: u64,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 4,
            // NCBI allows 3 requests/s without an API key
            requests_per_second: 3,
            timeout_secs: 15,
            max_retries: 2,
            initial_backoff_ms: 500,
            max_backoff_ms: 4000,
            run_deadline_secs: None,
            search_max_results: 5,
            breaker_failures: 5,
            breaker_cooldown_secs: 60,
        }
    }
}

impl VerificationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    pub fn run_deadline(&self) -> Option<Duration> {
        self.run_deadline_secs.map(Duration::from_secs)
    }

    pub fn breaker_cooldown(&self) -> Duration {
        Duration::from_secs(self.breaker_cooldown_secs)
    }
}

/// Similarity and relevance thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    /// Title token Jaccard at which two references count as duplicates
    pub duplicate_title_similarity: f64,

    /// Combined title+author score a search candidate must reach
    pub search_match: f64,

    /// Score below which a search candidate is treated as unrelated noise
    pub search_near_miss: f64,

    /// Title agreement required for an identifier lookup to be confident
    pub identifier_title_agreement: f64,

    pub relevance_high: f64,

    pub relevance_moderate: f64,

    pub relevance_doubtful: f64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            duplicate_title_similarity: 0.8,
            search_match: 0.85,
            search_near_miss: 0.5,
            identifier_title_agreement: 0.5,
            relevance_high: 0.25,
            relevance_moderate: 0.12,
            relevance_doubtful: 0.05,
        }
    }
}

/// Entity extraction configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Characters of context captured on each side of a marker
    pub context_chars: usize,

    /// Largest range a single marker may span, e.g. `[1-50]`
    pub max_range_span: u32,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            context_chars: 100,
            max_range_span: 50,
        }
    }
}

/// API keys for external services
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeys {
    /// NCBI E-utilities API key (optional, raises the PubMed rate limit)
    #[serde(default)]
    pub ncbi_api_key: Option<String>,

    /// Contact address for the CrossRef polite pool
    #[serde(default)]
    pub crossref_mailto: Option<String>,
}

impl Default for ApiKeys {
    fn default() -> Self {
        Self {
            ncbi_api_key: std::env::var("NCBI_API_KEY").ok(),
            crossref_mailto: std::env::var("CROSSREF_MAILTO").ok(),
        }
    }
}

/// Provider base URLs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    pub crossref: String,
    pub pubmed: String,
    pub openlibrary: String,
    /// DOI handle resolver, the authority on whether a DOI exists
    pub doi_org: String,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            crossref: "https://api.crossref.org".to_string(),
            pubmed: "https://eutils.ncbi.nlm.nih.gov/entrez/eutils".to_string(),
            openlibrary: "https://openlibrary.org".to_string(),
            doi_org: "https://doi.org".to_string(),
        }
    }
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,

    /// Cache directory (defaults to the platform cache dir)
    pub directory: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            directory: None,
        }
    }
}

impl CacheConfig {
    /// Resolved cache directory
    pub fn resolved_directory(&self) -> PathBuf {
        self.directory.clone().unwrap_or_else(default_cache_dir)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,

    /// `"json"` for structured output, anything else for plain text
    pub format: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: None,
        }
    }
}

impl LoggingConfig {
    pub fn is_json(&self) -> bool {
        self.format.as_deref() == Some("json")
    }
}

/// Default cache directory: `<platform cache dir>/reference-checker`
pub fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from(".cache"))
        .join("reference-checker")
}

/// Look for a configuration file in the usual places
///
/// Checks `./reference-checker.toml`, then
/// `<platform config dir>/reference-checker/config.toml`.
pub fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("reference-checker.toml");
    if local.is_file() {
        return Some(local);
    }

    dirs::config_dir()
        .map(|dir| dir.join("reference-checker").join("config.toml"))
        .filter(|path| path.is_file())
}

/// Load configuration from a file, with environment overrides
pub fn load_config(path: &Path) -> Result<Config, config::ConfigError> {
    let settings = config::Config::builder()
        .add_source(config::File::from(path))
        .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
        .build()?;

    settings.try_deserialize()
}

/// Get the configuration from environment overrides and defaults only
pub fn get_config() -> Config {
    config::Config::builder()
        .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
        .build()
        .and_then(|settings| settings.try_deserialize())
        .unwrap_or_default()
}

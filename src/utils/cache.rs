//! Local cache for verification results.
//!
//! Results are stored per document and per reference position so that a
//! re-run over the same manuscript does not hit the network again for
//! entries whose text has not changed.
//!
//! # Cache Structure
//!
//! ```text
//! ~/.cache/reference-checker/
//!   verifications/
//!     <document key>/
//!       <reference index>.json
//! ```
//!
//! Each entry records the fingerprint of the reference text it was computed
//! for; an entry whose fingerprint no longer matches is reported as stale.

use crate::config::CacheConfig;
use crate::models::{Reference, VerificationResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Cached verification result plus metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CachedVerification {
    /// When the item was cached (Unix timestamp)
    cached_at: u64,

    /// Fingerprint of the reference text the result belongs to
    fingerprint: String,

    result: VerificationResult,
}

/// Result of a cache lookup
#[derive(Debug, Clone, PartialEq)]
pub enum CacheResult<T> {
    /// Item was found and matches the current reference text
    Hit(T),

    /// Item was not found
    Miss,

    /// Item was found but the reference text has changed since
    Stale,
}

/// File-backed store of verification results
#[derive(Debug, Clone)]
pub struct VerificationCache {
    /// Directory holding one sub-directory per document
    base_dir: PathBuf,

    enabled: bool,
}

impl VerificationCache {
    /// Create a cache from configuration
    pub fn from_config(config: &CacheConfig) -> Self {
        Self {
            base_dir: config.resolved_directory().join("verifications"),
            enabled: config.enabled,
        }
    }

    /// Create an enabled cache rooted at `dir`
    pub fn at(dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: dir.into().join("verifications"),
            enabled: true,
        }
    }

    /// Check if caching is enabled
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Stable key for a document, derived from its label or path
    pub fn document_key(label: &str) -> String {
        format!("{:x}", md5::compute(label.as_bytes()))
    }

    fn entry_path(&self, document_key: &str, index: u32) -> PathBuf {
        self.base_dir
            .join(document_key)
            .join(format!("{}.json", index))
    }

    /// Look up the cached result for a reference
    pub fn get(&self, document_key: &str, reference: &Reference) -> CacheResult<VerificationResult> {
        if !self.enabled {
            return CacheResult::Miss;
        }

        let path = self.entry_path(document_key, reference.index);
        match read_entry(&path) {
            Ok(Some(cached)) => {
                if cached.fingerprint == reference.fingerprint()
                    && cached.result.reference_index == reference.index
                {
                    tracing::debug!("Cache HIT for reference {}", reference.index);
                    CacheResult::Hit(cached.result)
                } else {
                    tracing::debug!("Cache entry stale for reference {}", reference.index);
                    CacheResult::Stale
                }
            }
            Ok(None) => {
                tracing::debug!("Cache MISS for reference {}", reference.index);
                CacheResult::Miss
            }
            Err(e) => {
                tracing::warn!("Ignoring unreadable cache entry {}: {}", path.display(), e);
                CacheResult::Miss
            }
        }
    }

    /// Store the result for a reference; failures are logged and ignored
    pub fn put(&self, document_key: &str, reference: &Reference, result: &VerificationResult) {
        if !self.enabled {
            return;
        }

        let cached = CachedVerification {
            cached_at: SystemTime::now()
                .duration_since(SystemTime::UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
            fingerprint: reference.fingerprint(),
            result: result.clone(),
        };

        let path = self.entry_path(document_key, reference.index);
        if let Err(e) = write_entry(&path, &cached) {
            tracing::warn!("Failed to cache verification result: {}", e);
        } else {
            tracing::debug!("Cached verification result: {}", path.display());
        }
    }

    /// Remove every cached result for one document
    pub fn clear_document(&self, document_key: &str) -> std::io::Result<()> {
        let dir = self.base_dir.join(document_key);
        if dir.exists() {
            fs::remove_dir_all(dir)?;
        }
        Ok(())
    }
}

fn read_entry(path: &Path) -> Result<Option<CachedVerification>, std::io::Error> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };
    serde_json::from_str(&content)
        .map(Some)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))
}

fn write_entry(path: &Path, data: &CachedVerification) -> Result<(), std::io::Error> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let content = serde_json::to_string_pretty(data)?;
    fs::write(path, content)
}

//! Writing configuration files.
//!
//! # Configuration File Format
//!
//! ```toml
//! [verification]
//! max_concurrent = 4
//! requests_per_second = 3
//! timeout_secs = 15
//! max_retries = 2
//! breaker_failures = 5
//!
//! [thresholds]
//! duplicate_title_similarity = 0.8
//! search_match = 0.85
//!
//! [api_keys]
//! ncbi_api_key = "your-ncbi-key"
//! crossref_mailto = "you@example.org"
//!
//! [cache]
//! enabled = true
//!
//! [logging]
//! level = "info"
//! ```

use std::path::Path;

use super::Config;

/// Configuration file errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigFileError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Serialize error: {0}")]
    Serialize(String),

    #[error("{0} already exists (use --force to overwrite)")]
    AlreadyExists(String),
}

/// Save configuration to a TOML file
pub fn save_config(config: &Config, path: &Path) -> Result<(), ConfigFileError> {
    let content =
        toml::to_string_pretty(config).map_err(|e| ConfigFileError::Serialize(e.to_string()))?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| ConfigFileError::Io(e.to_string()))?;
    }

    std::fs::write(path, content).map_err(|e| ConfigFileError::Io(e.to_string()))
}

/// Write a default configuration file, refusing to clobber one unless `force`
pub fn init_config(path: &Path, force: bool) -> Result<(), ConfigFileError> {
    if path.exists() && !force {
        return Err(ConfigFileError::AlreadyExists(path.display().to_string()));
    }

    let mut config = Config::default();
    // Keys picked up from the environment stay out of the written file
    config.api_keys.ncbi_api_key = None;
    config.api_keys.crossref_mailto = None;

    save_config(&config, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_config;
    use tempfile::tempdir;

    #[test]
    fn test_config_save_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = Config::default();
        config.verification.max_concurrent = 7;
        config.thresholds.relevance_high = 0.3;

        save_config(&config, &path).unwrap();

        let loaded = load_config(&path).unwrap();
        assert_eq!(loaded.verification.max_concurrent, 7);
        assert_eq!(loaded.thresholds.relevance_high, 0.3);
    }

    #[test]
    fn test_init_config_refuses_overwrite() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        init_config(&path, false).unwrap();
        assert!(path.is_file());

        let again = init_config(&path, false);
        assert!(matches!(again, Err(ConfigFileError::AlreadyExists(_))));

        init_config(&path, true).unwrap();
    }
}

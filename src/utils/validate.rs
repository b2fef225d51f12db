//! Structural validation of DOIs, PMIDs, ISBNs and URLs.
//!
//! These checks run before any network call: an identifier that fails here
//! is reported as malformed and never looked up.

use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;

/// Validation error types
#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("Invalid DOI format: {0}")]
    InvalidDoi(String),

    #[error("Invalid PMID: {0}")]
    InvalidPmid(String),

    #[error("Invalid ISBN: {0}")]
    InvalidIsbn(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

fn doi_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^10\.\d{4,9}/\S+$").expect("valid DOI regex"))
}

/// Validate and normalise a DOI
///
/// Strips `doi:` and resolver URL prefixes and lowercases the result. DOIs
/// have the format `10.<registrant>/<suffix>` with a 4-9 digit registrant.
pub fn validate_doi(doi: &str) -> Result<String, ValidationError> {
    let doi = doi.trim().to_lowercase();

    if doi.is_empty() {
        return Err(ValidationError::InvalidDoi("empty DOI".to_string()));
    }

    let doi = doi.strip_prefix("doi:").map(str::trim).unwrap_or(&doi);
    let doi = doi
        .strip_prefix("https://doi.org/")
        .or_else(|| doi.strip_prefix("http://doi.org/"))
        .or_else(|| doi.strip_prefix("https://dx.doi.org/"))
        .or_else(|| doi.strip_prefix("http://dx.doi.org/"))
        .unwrap_or(doi);

    if !doi.starts_with("10.") {
        return Err(ValidationError::InvalidDoi(
            "DOI must start with '10.'".to_string(),
        ));
    }

    if !doi_regex().is_match(doi) {
        return Err(ValidationError::InvalidDoi(doi.to_string()));
    }

    Ok(doi.to_string())
}

/// Validate a PubMed identifier (1-8 digits, not zero)
pub fn validate_pmid(pmid: &str) -> Result<String, ValidationError> {
    let pmid = pmid.trim();

    if pmid.is_empty() || pmid.len() > 8 || !pmid.chars().all(|c| c.is_ascii_digit()) {
        return Err(ValidationError::InvalidPmid(pmid.to_string()));
    }

    let trimmed = pmid.trim_start_matches('0');
    if trimmed.is_empty() {
        return Err(ValidationError::InvalidPmid(pmid.to_string()));
    }

    Ok(trimmed.to_string())
}

/// Validate an ISBN-10 or ISBN-13 checksum and return the bare digits
pub fn validate_isbn(isbn: &str) -> Result<String, ValidationError> {
    let compact: String = isbn
        .chars()
        .filter(|c| !matches!(c, '-' | ' ' | '\u{2010}' | '\u{2013}'))
        .map(|c| c.to_ascii_uppercase())
        .collect();

    let valid = match compact.len() {
        10 => isbn10_checksum_ok(&compact),
        13 => isbn13_checksum_ok(&compact),
        _ => false,
    };

    if valid {
        Ok(compact)
    } else {
        Err(ValidationError::InvalidIsbn(isbn.trim().to_string()))
    }
}

fn isbn10_checksum_ok(isbn: &str) -> bool {
    let mut sum = 0u32;
    for (i, c) in isbn.chars().enumerate() {
        let value = match c {
            '0'..='9' => c as u32 - '0' as u32,
            'X' if i == 9 => 10,
            _ => return false,
        };
        sum += value * (10 - i as u32);
    }
    sum % 11 == 0
}

fn isbn13_checksum_ok(isbn: &str) -> bool {
    if !isbn.starts_with("978") && !isbn.starts_with("979") {
        return false;
    }

    let mut sum = 0u32;
    for (i, c) in isbn.chars().enumerate() {
        let Some(digit) = c.to_digit(10) else {
            return false;
        };
        sum += if i % 2 == 0 { digit } else { digit * 3 };
    }
    sum % 10 == 0
}

/// Validate an http(s) URL
pub fn validate_url(url: &str) -> Result<String, ValidationError> {
    let url = url.trim();

    let parsed = url::Url::parse(url).map_err(|e| ValidationError::InvalidUrl(e.to_string()))?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => {
            return Err(ValidationError::InvalidUrl(format!(
                "invalid scheme: {}",
                scheme
            )))
        }
    }

    if parsed.host_str().is_none() {
        return Err(ValidationError::InvalidUrl("missing host".to_string()));
    }

    Ok(url.to_string())
}

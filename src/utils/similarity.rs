//! Text similarity helpers for duplicate detection and candidate matching.

use std::collections::BTreeSet;
use strsim::jaro_winkler;

use crate::models::{Candidate, Reference};

/// Jaro-Winkler score at which two surnames are considered the same
const SURNAME_MATCH: f64 = 0.9;

/// Weight of the title in a combined title+author score
const TITLE_WEIGHT: f64 = 0.7;

pub(crate) fn is_cjk(c: char) -> bool {
    matches!(c as u32,
        0x3040..=0x30FF | 0x3400..=0x4DBF | 0x4E00..=0x9FFF | 0xAC00..=0xD7AF | 0xF900..=0xFAFF)
}

/// Split text into lowercase word tokens
///
/// Runs of CJK characters have no word boundaries, so they contribute
/// overlapping character bigrams instead.
pub fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut word = String::new();
    let mut cjk_run: Vec<char> = Vec::new();

    let flush_cjk = |run: &mut Vec<char>, tokens: &mut Vec<String>| {
        match run.len() {
            0 => {}
            1 => tokens.push(run[0].to_string()),
            _ => tokens.extend(run.windows(2).map(|w| w.iter().collect::<String>())),
        }
        run.clear();
    };

    for c in text.chars() {
        if is_cjk(c) {
            if !word.is_empty() {
                tokens.push(std::mem::take(&mut word));
            }
            cjk_run.push(c);
        } else if c.is_alphanumeric() {
            flush_cjk(&mut cjk_run, &mut tokens);
            word.extend(c.to_lowercase());
        } else {
            flush_cjk(&mut cjk_run, &mut tokens);
            if !word.is_empty() {
                tokens.push(std::mem::take(&mut word));
            }
        }
    }
    flush_cjk(&mut cjk_run, &mut tokens);
    if !word.is_empty() {
        tokens.push(word);
    }

    tokens
}

/// Normalize a title for comparison
pub fn normalize_title(title: &str) -> String {
    tokenize(title).join(" ")
}

/// Token Jaccard similarity of two titles, in `[0, 1]`
pub fn title_similarity(a: &str, b: &str) -> f64 {
    let a: BTreeSet<String> = tokenize(a).into_iter().collect();
    let b: BTreeSet<String> = tokenize(b).into_iter().collect();

    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let shared = a.intersection(&b).count() as f64;
    let union = a.union(&b).count() as f64;
    shared / union
}

/// Best-effort family name of an author string
///
/// Handles "Smith, John", "Smith J", "Smith JA", "J. Smith" and "John Smith".
pub fn surname(author: &str) -> String {
    let author = author.trim();

    if let Some((family, _)) = author.split_once(',') {
        return normalize_title(family);
    }

    let parts: Vec<&str> = author.split_whitespace().collect();
    let family = match parts.as_slice() {
        [] => "",
        [only] => only,
        [first, .., last] => {
            let looks_like_initials = |s: &str| {
                let letters: String = s.chars().filter(|c| c.is_alphabetic()).collect();
                !letters.is_empty()
                    && letters.chars().count() <= 3
                    && letters.chars().all(|c| c.is_uppercase())
            };
            if looks_like_initials(last) && !looks_like_initials(first) {
                first
            } else {
                last
            }
        }
    };

    normalize_title(family)
}

/// Similarity of two authors' family names, in `[0, 1]`
pub fn author_similarity(a: &str, b: &str) -> f64 {
    let (a, b) = (surname(a), surname(b));
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    jaro_winkler(&a, &b)
}

/// Check if two references are likely the same work listed twice
pub fn are_duplicate_references(a: &Reference, b: &Reference, title_threshold: f64) -> bool {
    // Same DOI is the strongest signal
    if let (Some(doi_a), Some(doi_b)) = (a.fields.doi.parsed(), b.fields.doi.parsed()) {
        if doi_a.eq_ignore_ascii_case(doi_b) {
            return true;
        }
    }

    let (Some(title_a), Some(title_b)) = (a.fields.title.parsed(), b.fields.title.parsed()) else {
        return false;
    };

    if title_similarity(title_a, title_b) < title_threshold {
        return false;
    }

    match (a.fields.first_author(), b.fields.first_author()) {
        (Some(x), Some(y)) => author_similarity(x, y) >= SURNAME_MATCH,
        // Assume match if author info is missing
        _ => true,
    }
}

/// Combined title+author score of a candidate against a reference
pub fn candidate_score(reference: &Reference, candidate: &Candidate) -> f64 {
    let Some(title) = reference.fields.title.parsed() else {
        return 0.0;
    };

    let title_score = title_similarity(title, &candidate.title);

    match (reference.fields.first_author(), candidate.authors.first()) {
        (Some(ours), Some(theirs)) => {
            TITLE_WEIGHT * title_score + (1.0 - TITLE_WEIGHT) * author_similarity(ours, theirs)
        }
        _ => title_score,
    }
}

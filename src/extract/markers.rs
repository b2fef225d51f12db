//! Citation marker scanning.
//!
//! Grammar of the text between brackets:
//!
//! ```text
//! marker = item (sep item)*     sep  = "," | ";"
//! item   = N | N dash N         dash = "-" | "–" | "—"
//! ```
//!
//! with `N >= 1`, range start <= end and a bounded range span. Bracketed
//! groups made only of digits, separators, dashes and spaces that break
//! these rules are reported as malformed rather than dropped.

use std::collections::HashMap;

use crate::config::ExtractionConfig;
use crate::models::{Citation, MalformedMarker, Occurrence};
use crate::utils::collapse_whitespace;

/// Result of scanning a body of text
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MarkerScan {
    /// Distinct markers in order of first occurrence
    pub citations: Vec<Citation>,

    pub malformed: Vec<MalformedMarker>,
}

/// Parse the inside of a bracketed marker into the numbers it cites
pub fn parse_marker(content: &str, max_range_span: u32) -> Result<Vec<u32>, String> {
    let mut numbers = Vec::new();

    for item in content.split([',', ';']) {
        let item = item.trim();
        if item.is_empty() {
            return Err("empty item in marker list".to_string());
        }

        let bounds: Vec<&str> = item.split(['-', '–', '—']).map(str::trim).collect();
        match bounds.as_slice() {
            [single] => numbers.push(parse_number(single)?),
            [from, to] => {
                let start = parse_number(from)?;
                let end = parse_number(to)?;
                if start > end {
                    return Err(format!("range {}-{} runs backwards", start, end));
                }
                if end - start >= max_range_span {
                    return Err(format!(
                        "range {}-{} spans more than {} entries",
                        start, end, max_range_span
                    ));
                }
                numbers.extend(start..=end);
            }
            _ => return Err(format!("'{}' is not a number or a range", item)),
        }
    }

    Ok(numbers)
}

fn parse_number(text: &str) -> Result<u32, String> {
    if text.is_empty() || !text.chars().all(|c| c.is_ascii_digit()) {
        return Err(format!("'{}' is not a number", text));
    }
    match text.parse::<u32>() {
        Ok(0) => Err("marker numbers start at 1".to_string()),
        Ok(n) => Ok(n),
        Err(_) => Err(format!("'{}' is too large", text)),
    }
}

/// Context window of `chars` characters on either side of `start..end`
fn context_window(text: &str, start: usize, end: usize, chars: usize) -> String {
    let before: Vec<char> = text[..start].chars().rev().take(chars).collect();
    let before: String = before.into_iter().rev().collect();
    let after: String = text[end..].chars().take(chars).collect();

    collapse_whitespace(&format!("{}{}{}", before, &text[start..end], after))
}

/// Scan `body` for citation markers
pub fn scan_markers(body: &str, config: &ExtractionConfig) -> MarkerScan {
    let bracketed = regex!(r"\[([^\[\]\n]{1,80})\]");
    let numeric = regex!(r"^[\d\s,;\-–—]+$");

    let mut scan = MarkerScan::default();
    let mut by_marker: HashMap<u32, usize> = HashMap::new();

    for caps in bracketed.captures_iter(body) {
        let (Some(whole), Some(inner)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let content = inner.as_str();
        if !numeric.is_match(content) || !content.chars().any(|c| c.is_ascii_digit()) {
            continue;
        }

        let numbers = match parse_marker(content, config.max_range_span) {
            Ok(numbers) => numbers,
            Err(reason) => {
                tracing::debug!("Malformed marker {} at {}: {}", whole.as_str(), whole.start(), reason);
                scan.malformed.push(MalformedMarker {
                    position: whole.start(),
                    text: whole.as_str().to_string(),
                    reason,
                });
                continue;
            }
        };

        let context = context_window(body, whole.start(), whole.end(), config.context_chars);
        for number in numbers {
            let occurrence = Occurrence {
                position: whole.start(),
                marker_text: whole.as_str().to_string(),
                context: context.clone(),
            };

            match by_marker.get(&number) {
                Some(&slot) => {
                    let citation = &mut scan.citations[slot];
                    // "[1,1]" cites the same work once
                    if !citation.occurrences.iter().any(|o| o.position == occurrence.position) {
                        citation.occurrences.push(occurrence);
                    }
                }
                None => {
                    by_marker.insert(number, scan.citations.len());
                    scan.citations.push(Citation::new(number, occurrence));
                }
            }
        }
    }

    scan
}

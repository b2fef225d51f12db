//! Annotated copy of the source document.
//!
//! Flags are inserted right after each occurrence of a flagged marker as
//! `⟦!n: reason⟧`. Nothing else in the text is touched, so removing the
//! flags restores the original byte for byte.

use std::cmp::Reverse;

use crate::models::Citation;
use crate::report::Report;

const FLAG_OPEN: &str = "⟦!";
const FLAG_CLOSE: &str = "⟧";

/// Insert inline flags after flagged citation markers
pub fn annotate(source: &str, citations: &[Citation], report: &Report) -> String {
    let mut insertions: Vec<(usize, u32, String)> = Vec::new();

    for citation in citations {
        let Some(flag) = report.citation(citation.marker).and_then(|c| c.flag.as_deref()) else {
            continue;
        };
        for occurrence in &citation.occurrences {
            let at = occurrence.end();
            if at > source.len() || !source.is_char_boundary(at) {
                tracing::warn!("Skipping flag for [{}] outside the source text", citation.marker);
                continue;
            }
            insertions.push((at, citation.marker, format!("{}{}: {}{}", FLAG_OPEN, citation.marker, flag, FLAG_CLOSE)));
        }
    }

    if insertions.is_empty() {
        return source.to_string();
    }

    // Back to front so earlier offsets stay valid; at a shared offset the
    // highest marker goes in first and ends up last
    insertions.sort_by_key(|(at, marker, _)| (Reverse(*at), Reverse(*marker)));
    insertions.dedup_by_key(|(at, marker, _)| (*at, *marker));

    let mut annotated = source.to_string();
    for (at, _, flag) in insertions {
        annotated.insert_str(at, &flag);
    }
    annotated
}

/// Remove every inline flag inserted by [`annotate`]
pub fn strip_annotations(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find(FLAG_OPEN) {
        let Some(len) = rest[start..].find(FLAG_CLOSE) else {
            break;
        };
        out.push_str(&rest[..start]);
        rest = &rest[start + len + FLAG_CLOSE.len()..];
    }
    out.push_str(rest);
    out
}

//! Width-aware text helpers for terminal reports.
//!
//! Reference entries mix Latin and CJK text, so widths are measured in
//! terminal columns rather than bytes or chars.

use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

const ELLIPSIS: &str = "...";

/// Display width of `text` in terminal columns
pub fn display_width(text: &str) -> usize {
    UnicodeWidthStr::width(text)
}

/// Truncate text to at most `max_width` columns, appending an ellipsis
/// when anything was cut.
pub fn truncate_with_ellipsis(text: &str, max_width: usize) -> String {
    if max_width == 0 {
        return String::new();
    }
    if display_width(text) <= max_width {
        return text.to_string();
    }

    let budget = max_width.saturating_sub(ELLIPSIS.len());
    let mut used = 0;
    let mut out = String::new();
    for c in text.chars() {
        let w = c.width().unwrap_or(1);
        if used + w > budget {
            break;
        }
        used += w;
        out.push(c);
    }

    if out.is_empty() {
        return ELLIPSIS.chars().take(max_width).collect();
    }
    format!("{}{}", out.trim_end(), ELLIPSIS)
}

/// Collapse runs of whitespace (including newlines) into single spaces
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

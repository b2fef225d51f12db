//! In-text citation markers and their occurrences.

use serde::{Deserialize, Serialize};

/// A single appearance of a citation marker in the document body.
///
/// List and range markers (`[1,2,5]`, `[1-3]`) produce one occurrence per
/// cited number, all sharing the same `position` and `marker_text`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occurrence {
    /// Byte offset of the literal marker in the source text
    pub position: usize,

    /// Literal marker text as written, e.g. `[1-3]`
    pub marker_text: String,

    /// Whitespace-collapsed text surrounding the marker
    pub context: String,
}

impl Occurrence {
    /// Byte offset just past the literal marker
    pub fn end(&self) -> usize {
        self.position + self.marker_text.len()
    }
}

/// A cited reference number together with every place it is cited
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    /// The reference number (always >= 1)
    pub marker: u32,

    /// Occurrences in document order
    pub occurrences: Vec<Occurrence>,
}

impl Citation {
    /// Create a citation with its first occurrence
    pub fn new(marker: u32, first: Occurrence) -> Self {
        Self {
            marker,
            occurrences: vec![first],
        }
    }

    /// Position of the first occurrence
    pub fn first_position(&self) -> usize {
        self.occurrences.first().map(|o| o.position).unwrap_or(0)
    }

    /// Number of times this marker is cited
    pub fn occurrence_count(&self) -> usize {
        self.occurrences.len()
    }
}

/// Bracketed numeric-looking text that does not follow the marker grammar
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MalformedMarker {
    /// Byte offset of the literal text in the source
    pub position: usize,

    /// Literal text, brackets included
    pub text: String,

    /// Why the grammar rejected it
    pub reason: String,
}

//! Reference list entries and their best-effort extracted fields.

use serde::{Deserialize, Serialize};

/// Outcome of extracting one bibliographic field from raw text.
///
/// A field that is not recognisable stays `Absent`; it is never guessed.
/// Text that looks like the field but fails validation is kept as
/// `Malformed` so that downstream checks can report it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum Field<T> {
    Parsed(T),
    Absent,
    Malformed(String),
}

impl<T> Default for Field<T> {
    fn default() -> Self {
        Field::Absent
    }
}

impl<T> Field<T> {
    /// The parsed value, if any
    pub fn parsed(&self) -> Option<&T> {
        match self {
            Field::Parsed(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_parsed(&self) -> bool {
        matches!(self, Field::Parsed(_))
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Field::Absent)
    }

    pub fn is_malformed(&self) -> bool {
        matches!(self, Field::Malformed(_))
    }

    /// Convert to `Option`, treating malformed values as missing
    pub fn into_option(self) -> Option<T> {
        match self {
            Field::Parsed(value) => Some(value),
            _ => None,
        }
    }
}

impl<T> From<Option<T>> for Field<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => Field::Parsed(v),
            None => Field::Absent,
        }
    }
}

/// Kind of cited work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceType {
    JournalArticle,
    Book,
    ConferencePaper,
    Thesis,
    WebResource,
    Unknown,
}

impl ReferenceType {
    /// Human-readable label
    pub fn label(&self) -> &'static str {
        match self {
            ReferenceType::JournalArticle => "journal article",
            ReferenceType::Book => "book",
            ReferenceType::ConferencePaper => "conference paper",
            ReferenceType::Thesis => "thesis",
            ReferenceType::WebResource => "web resource",
            ReferenceType::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ReferenceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Fields extracted from a reference entry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceFields {
    pub authors: Field<Vec<String>>,
    pub title: Field<String>,
    pub year: Field<u16>,
    pub venue: Field<String>,
    pub doi: Field<String>,
    pub pmid: Field<String>,
    pub isbn: Field<String>,
    pub url: Field<String>,
}

impl ReferenceFields {
    /// Whether any external identifier (DOI, PMID, ISBN) was parsed
    pub fn has_identifier(&self) -> bool {
        self.doi.is_parsed() || self.pmid.is_parsed() || self.isbn.is_parsed()
    }

    /// Whether any identifier is present but structurally malformed
    pub fn has_malformed_identifier(&self) -> bool {
        self.doi.is_malformed() || self.pmid.is_malformed() || self.isbn.is_malformed()
    }

    /// First listed author, if authors were recognised
    pub fn first_author(&self) -> Option<&str> {
        self.authors
            .parsed()
            .and_then(|list| list.first())
            .map(|s| s.as_str())
    }
}

/// One entry of the reference list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    /// 1-based position in the reference list
    pub index: u32,

    /// Number printed in front of the entry, when present
    pub label: Option<u32>,

    /// Entry text with continuation lines joined
    pub raw_text: String,

    pub fields: ReferenceFields,

    pub reference_type: ReferenceType,
}

impl Reference {
    /// Whether the orchestrator has anything to look up for this entry
    pub fn is_verifiable(&self) -> bool {
        self.fields.has_identifier()
            || self.fields.has_malformed_identifier()
            || self.fields.title.is_parsed()
    }

    /// Stable fingerprint of the raw text, used to invalidate cached results
    pub fn fingerprint(&self) -> String {
        format!("{:x}", md5::compute(self.raw_text.trim().as_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference(raw: &str) -> Reference {
        Reference {
            index: 1,
            label: Some(1),
            raw_text: raw.to_string(),
            fields: ReferenceFields::default(),
            reference_type: ReferenceType::Unknown,
        }
    }

    #[test]
    fn test_field_defaults_to_absent() {
        let fields = ReferenceFields::default();
        assert!(fields.title.is_absent());
        assert!(!fields.has_identifier());
        assert!(fields.first_author().is_none());
    }

    #[test]
    fn test_field_serializes_tagged() {
        let json = serde_json::to_string(&Field::Parsed("10.1000/x".to_string())).unwrap();
        assert_eq!(json, r#"{"state":"parsed","value":"10.1000/x"}"#);

        let json = serde_json::to_string(&Field::<String>::Absent).unwrap();
        assert_eq!(json, r#"{"state":"absent"}"#);
    }

    #[test]
    fn test_verifiable_requires_identifier_or_title() {
        let mut r = reference("Anonymous notes");
        assert!(!r.is_verifiable());

        r.fields.title = Field::Parsed("A study of things".to_string());
        assert!(r.is_verifiable());

        let mut r = reference("Bad isbn");
        r.fields.isbn = Field::Malformed("123".to_string());
        assert!(r.is_verifiable());
    }

    #[test]
    fn test_fingerprint_ignores_outer_whitespace() {
        assert_eq!(
            reference("Smith J. Title.").fingerprint(),
            reference("  Smith J. Title.\n").fingerprint()
        );
        assert_ne!(
            reference("Smith J. Title.").fingerprint(),
            reference("Smith J. Other.").fingerprint()
        );
    }
}

//! Entity extraction: citation markers from the body and numbered entries
//! from the reference list.
//!
//! Extraction is a pure function of the input text; running it twice over
//! unchanged text yields identical output.

use serde::{Deserialize, Serialize};

/// Lazily compiled static regex
macro_rules! regex {
    ($pattern:expr) => {{
        static RE: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
        RE.get_or_init(|| regex::Regex::new($pattern).expect("valid regex"))
    }};
}

mod fields;
mod markers;

pub use fields::{classify, extract_fields};
pub use markers::{parse_marker, scan_markers, MarkerScan};

use crate::config::ExtractionConfig;
use crate::models::{Citation, MalformedMarker, Reference};

/// Errors that make a document impossible to check
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtractionError {
    /// Neither a heading nor a trailing numbered block was found
    #[error("no reference section found")]
    NoReferenceSection,

    /// The reference section exists but holds no numbered entries
    #[error("the reference section contains no numbered entries")]
    NoNumberedEntries,
}

impl ExtractionError {
    /// What the author can do about it
    pub fn hint(&self) -> &'static str {
        match self {
            ExtractionError::NoReferenceSection => {
                "add a \"References\" (or \"参考文献\") heading before the reference list, \
                 or pass the list as a separate file with --references"
            }
            ExtractionError::NoNumberedEntries => {
                "number each entry as \"[1] ...\" or \"1. ...\" at the start of its line"
            }
        }
    }
}

/// Everything extracted from one document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Extraction {
    /// One entry per distinct marker, in order of first occurrence
    pub citations: Vec<Citation>,

    /// Reference list entries in list order
    pub references: Vec<Reference>,

    pub malformed_markers: Vec<MalformedMarker>,

    /// Byte offset where the body ends (start of the reference section)
    pub body_end: usize,
}

/// Extract citations and references from a single document
pub fn extract_entities(
    text: &str,
    config: &ExtractionConfig,
) -> Result<Extraction, ExtractionError> {
    let section = locate_reference_section(text).ok_or(ExtractionError::NoReferenceSection)?;
    let references = parse_reference_list(&text[section.list_start..])?;

    let body = &text[..section.body_end];
    let scan = scan_markers(body, config);

    tracing::debug!(
        "Extracted {} citations, {} malformed markers and {} references",
        scan.citations.len(),
        scan.malformed.len(),
        references.len()
    );

    Ok(Extraction {
        citations: scan.citations,
        references,
        malformed_markers: scan.malformed,
        body_end: section.body_end,
    })
}

/// Extract citations from `body` and references from a separate list document
pub fn extract_with_reference_list(
    body: &str,
    list_text: &str,
    config: &ExtractionConfig,
) -> Result<Extraction, ExtractionError> {
    let references = parse_reference_list(list_text)?;
    let scan = scan_markers(body, config);

    Ok(Extraction {
        citations: scan.citations,
        references,
        malformed_markers: scan.malformed,
        body_end: body.len(),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SectionBounds {
    /// Start of the heading line (or of the first entry when headless)
    body_end: usize,
    /// Start of the text holding the entries
    list_start: usize,
}

/// Lines with their starting byte offsets
fn lines_with_offsets(text: &str) -> impl Iterator<Item = (usize, &str)> {
    let mut offset = 0;
    text.split_inclusive('\n').map(move |line| {
        let start = offset;
        offset += line.len();
        (start, line.trim_end_matches(['\n', '\r']))
    })
}

fn is_reference_heading(line: &str) -> bool {
    regex!(
        r"(?i)^\s*(?:#+\s*)?(?:(?:\d+(?:\.\d+)*|[IVXLC]+)[.)]?\s+)?(?:references|bibliography|works\s+cited|literature\s+cited|reference\s+list|参考文献|引用文献|文\s*献)\s*[:：]?\s*$"
    )
    .is_match(line)
}

fn opens_first_entry(line: &str) -> bool {
    regex!(r"^\s*(?:\[1\]|1\.\s)").is_match(line)
}

fn locate_reference_section(text: &str) -> Option<SectionBounds> {
    let mut heading = None;
    let mut first_entry = None;

    for (start, line) in lines_with_offsets(text) {
        if is_reference_heading(line) {
            heading = Some(SectionBounds {
                body_end: start,
                list_start: (start + line.len()).min(text.len()),
            });
        } else if opens_first_entry(line) {
            first_entry = Some(start);
        }
    }

    heading.or_else(|| {
        first_entry.map(|start| SectionBounds {
            body_end: start,
            list_start: start,
        })
    })
}

/// Split a reference list into numbered entries
///
/// Lines before the first numbered entry are ignored; other non-empty lines
/// continue the current entry.
fn parse_reference_list(list_text: &str) -> Result<Vec<Reference>, ExtractionError> {
    let opener = regex!(r"^\s*(?:\[(\d{1,4})\]|(\d{1,3})[.)]\s)\s*(.*)$");

    let mut entries: Vec<(Option<u32>, String)> = Vec::new();
    for line in list_text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        if let Some(caps) = opener.captures(line) {
            let label = caps
                .get(1)
                .or_else(|| caps.get(2))
                .and_then(|m| m.as_str().parse().ok());
            let rest = caps.get(3).map(|m| m.as_str().trim()).unwrap_or_default();
            entries.push((label, rest.to_string()));
        } else if let Some((_, current)) = entries.last_mut() {
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(trimmed);
        }
    }

    if entries.is_empty() {
        return Err(ExtractionError::NoNumberedEntries);
    }

    Ok(entries
        .into_iter()
        .enumerate()
        .map(|(position, (label, raw_text))| {
            let fields = extract_fields(&raw_text);
            let reference_type = classify(&raw_text, &fields);
            Reference {
                index: position as u32 + 1,
                label,
                raw_text,
                fields,
                reference_type,
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Field;

    const DOCUMENT: &str = "\
# Introduction

Thermometry at small scales is hard [1]. Several groups tried [2-3], \
and others [1, 4].

## References

[1] Kucsko G, Maurer PC. Nanometre-scale thermometry in a living cell. Nature 2013;500(7460):54-58. doi:10.1038/nature12373
[2] Smith J, Doe A. Deep learning for cell imaging. Nat Methods 2019;16(1):1-2.
[3] 张三, 李四. 深度学习在医学影像中的应用[J]. 中国医学影像技术, 2020, 36(1): 1-5.
[4] Cormen TH, Leiserson CE. Introduction to algorithms. Cambridge: MIT Press; 2009.
    ISBN 978-0-262-03384-8.
";

    #[test]
    fn test_extract_entities() {
        let extraction = extract_entities(DOCUMENT, &ExtractionConfig::default()).unwrap();

        let markers: Vec<u32> = extraction.citations.iter().map(|c| c.marker).collect();
        assert_eq!(markers, vec![1, 2, 3, 4]);
        assert_eq!(extraction.citations[0].occurrence_count(), 2);
        assert!(extraction.malformed_markers.is_empty());

        assert_eq!(extraction.references.len(), 4);
        assert_eq!(extraction.references[3].index, 4);
        assert_eq!(extraction.references[3].label, Some(4));
        // Continuation line is joined onto the entry
        assert!(extraction.references[3].raw_text.ends_with("ISBN 978-0-262-03384-8."));
        assert_eq!(
            extraction.references[0].fields.doi,
            Field::Parsed("10.1038/nature12373".to_string())
        );

        assert!(DOCUMENT[extraction.body_end..].starts_with("## References"));
    }

    #[test]
    fn test_markers_in_reference_list_are_not_citations() {
        let text = "Body cites [1].\n\nReferences\n[1] A. See also [2].\n";
        let extraction = extract_entities(text, &ExtractionConfig::default()).unwrap();
        assert_eq!(extraction.citations.len(), 1);
    }

    #[test]
    fn test_last_heading_wins() {
        let text = "Intro mentions references in general [1].\nReferences\nMore body [2].\nReferences\n[1] One. Title one here.\n[2] Two. Title two here.\n";
        let extraction = extract_entities(text, &ExtractionConfig::default()).unwrap();
        assert_eq!(extraction.citations.len(), 2);
        assert_eq!(extraction.references.len(), 2);
    }

    #[test]
    fn test_chinese_heading() {
        let text = "正文引用[1]。\n参考文献：\n[1] 张三. 标题示例[J]. 期刊, 2020.\n";
        let extraction = extract_entities(text, &ExtractionConfig::default()).unwrap();
        assert_eq!(extraction.references.len(), 1);
    }

    #[test]
    fn test_headless_fallback() {
        let text = "Body cites [1] and [2].\n\n1. Smith J. First title words. J Test 2020.\n2. Doe A. Second title words. J Test 2021.\n";
        let extraction = extract_entities(text, &ExtractionConfig::default()).unwrap();
        assert_eq!(extraction.references.len(), 2);
        assert_eq!(extraction.citations.len(), 2);
    }

    #[test]
    fn test_no_reference_section() {
        let err = extract_entities("Just prose [1].", &ExtractionConfig::default()).unwrap_err();
        assert_eq!(err, ExtractionError::NoReferenceSection);
        assert!(err.hint().contains("--references"));
    }

    #[test]
    fn test_no_numbered_entries() {
        let text = "Body [1].\nReferences\nSmith J. Unnumbered entry.\n";
        let err = extract_entities(text, &ExtractionConfig::default()).unwrap_err();
        assert_eq!(err, ExtractionError::NoNumberedEntries);
    }

    #[test]
    fn test_label_differs_from_position() {
        let text = "Body [1].\nReferences\n[1] First entry title.\n[3] Second entry title.\n";
        let extraction = extract_entities(text, &ExtractionConfig::default()).unwrap();
        assert_eq!(extraction.references[1].index, 2);
        assert_eq!(extraction.references[1].label, Some(3));
    }

    #[test]
    fn test_companion_reference_list() {
        let body = "Claims [1] and [2].";
        let list = "References\n[1] One title words.\n[2] Two title words.\n";
        let extraction =
            extract_with_reference_list(body, list, &ExtractionConfig::default()).unwrap();
        assert_eq!(extraction.references.len(), 2);
        assert_eq!(extraction.body_end, body.len());
    }

    #[test]
    fn test_idempotent() {
        let config = ExtractionConfig::default();
        let first = extract_entities(DOCUMENT, &config).unwrap();
        let second = extract_entities(DOCUMENT, &config).unwrap();
        assert_eq!(first, second);
    }
}

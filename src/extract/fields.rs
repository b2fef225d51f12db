//! Best-effort field extraction from a single reference entry.
//!
//! Each field is tagged: recognised and valid (`Parsed`), recognised but
//! failing validation (`Malformed`), or not recognised (`Absent`). Layout
//! detection tries GB/T 7714 type tags, quoted titles (IEEE), APA
//! `(Year). Title.` and finally period-delimited segments (Vancouver).

use crate::models::{Field, ReferenceFields, ReferenceType};
use crate::utils::{
    collapse_whitespace, is_cjk, validate_doi, validate_isbn, validate_pmid, validate_url,
};

/// Extract every field from an entry's raw text
pub fn extract_fields(raw: &str) -> ReferenceFields {
    let text = collapse_whitespace(raw);
    let scrubbed = scrub_identifiers(&text);
    let layout = detect_layout(&scrubbed);

    ReferenceFields {
        authors: layout.authors,
        title: layout.title,
        year: extract_year(&scrubbed),
        venue: layout.venue,
        doi: extract_doi(&text),
        pmid: extract_pmid(&text),
        isbn: extract_isbn(&text),
        url: extract_url(&text),
    }
}

/// Classify an entry by GB/T type tag, then by keywords
pub fn classify(raw: &str, fields: &ReferenceFields) -> ReferenceType {
    if regex!(r"\[J(?:/OL)?\]").is_match(raw)
        || regex!(r"\d{1,4}\s?\(\d{1,4}(?:[-–]\d{1,4})?\)\s*[:,]").is_match(raw)
    {
        ReferenceType::JournalArticle
    } else if regex!(r"\[M(?:/OL)?\]").is_match(raw)
        || regex!(r"(?i)出版社|\bpress\b|\bpublishing\b|\bpublishers?\b").is_match(raw)
    {
        ReferenceType::Book
    } else if regex!(r"\[C(?:/OL)?\]").is_match(raw)
        || regex!(r"(?i)会议|\bconference\b|\bproceedings\b|\bsymposium\b|\bproc\.").is_match(raw)
    {
        ReferenceType::ConferencePaper
    } else if regex!(r"\[D(?:/OL)?\]").is_match(raw)
        || regex!(r"(?i)博士|硕士|学位论文|\bthesis\b|\bdissertation\b").is_match(raw)
    {
        ReferenceType::Thesis
    } else if regex!(r"\[EB/OL\]").is_match(raw)
        || (fields.url.is_parsed() && !fields.doi.is_parsed() && fields.venue.is_absent())
    {
        ReferenceType::WebResource
    } else {
        ReferenceType::Unknown
    }
}

fn trim_trailing_punct(text: &str) -> &str {
    let strip = |s: &str| s.trim_end_matches(['.', ',', ';', ':', '。', '，', '；']).len();
    let mut end = strip(text);
    // Keep a closing paren only when it is balanced, as in 10.1002/(SICI)...
    while text[..end].ends_with(')')
        && text[..end].matches('(').count() < text[..end].matches(')').count()
    {
        end = strip(&text[..end - 1]);
    }
    &text[..end]
}

fn extract_doi(text: &str) -> Field<String> {
    if let Some(m) = regex!(r"10\.\d{4,9}/[^\s\[\]<>\x22“”]+").find(text) {
        if let Ok(doi) = validate_doi(trim_trailing_punct(m.as_str())) {
            return Field::Parsed(doi);
        }
    }
    match regex!(r"(?i)\bdoi\s*[:：]\s*(\S+)").captures(text) {
        Some(caps) => Field::Malformed(trim_trailing_punct(&caps[1]).to_string()),
        None => Field::Absent,
    }
}

fn extract_pmid(text: &str) -> Field<String> {
    let Some(caps) = regex!(r"(?i)\b(?:PMID|PubMed\s*ID)\s*[:：]?\s*([^\s,;]+)").captures(text)
    else {
        return Field::Absent;
    };
    let token = trim_trailing_punct(&caps[1]);
    match validate_pmid(token) {
        Ok(pmid) => Field::Parsed(pmid),
        Err(_) => Field::Malformed(token.to_string()),
    }
}

fn extract_isbn(text: &str) -> Field<String> {
    let Some(caps) = regex!(r"(?i)\bISBN(?:-1[03])?\s*[:：]?\s*([^\s,;]+)").captures(text) else {
        return Field::Absent;
    };
    let token = trim_trailing_punct(&caps[1]);
    match validate_isbn(token) {
        Ok(isbn) => Field::Parsed(isbn),
        Err(_) => Field::Malformed(token.to_string()),
    }
}

fn extract_url(text: &str) -> Field<String> {
    let Some(m) = regex!(r"https?://[^\s<>\x22\]]+").find(text) else {
        return Field::Absent;
    };
    let candidate = trim_trailing_punct(m.as_str());
    match validate_url(candidate) {
        Ok(url) => Field::Parsed(url),
        Err(_) => Field::Malformed(candidate.to_string()),
    }
}

/// Blank out identifiers so their digits are not mistaken for years or titles
fn scrub_identifiers(text: &str) -> String {
    let patterns = [
        regex!(r"https?://\S+"),
        regex!(r"(?i)\bdoi\s*[:：]?\s*\S+"),
        regex!(r"10\.\d{4,9}/\S+"),
        regex!(r"(?i)\b(?:PMID|PubMed\s*ID|ISBN(?:-1[03])?)\s*[:：]?\s*\S+"),
    ];
    let mut scrubbed = text.to_string();
    for pattern in patterns {
        scrubbed = pattern.replace_all(&scrubbed, " ").into_owned();
    }
    collapse_whitespace(&scrubbed)
}

fn extract_year(text: &str) -> Field<u16> {
    let in_parens = regex!(r"\((1[5-9]\d{2}|20\d{2})[a-z]?\)");
    let bare = regex!(r"(?:^|[^\d])(1[5-9]\d{2}|20\d{2})[a-z]?(?:$|[^\d])");

    in_parens
        .captures(text)
        .or_else(|| bare.captures(text))
        .and_then(|caps| caps[1].parse().ok())
        .into()
}

#[derive(Debug, Default)]
struct Layout {
    authors: Field<Vec<String>>,
    title: Field<String>,
    venue: Field<String>,
}

fn detect_layout(text: &str) -> Layout {
    gbt_layout(text)
        .or_else(|| quoted_layout(text))
        .or_else(|| apa_layout(text))
        .unwrap_or_else(|| segment_layout(text))
}

fn layout(authors: Option<&str>, title: &str, rest: &str) -> Layout {
    let title = title.trim().trim_end_matches(['.', ',']).trim();
    Layout {
        authors: authors.map(parse_authors).unwrap_or_default(),
        title: if title.chars().count() >= 2 {
            Field::Parsed(title.to_string())
        } else {
            Field::Absent
        },
        venue: venue_from(rest),
    }
}

/// `Authors. Title[J]. Venue, 2020, 1(2): 3-4.`
fn gbt_layout(text: &str) -> Option<Layout> {
    let caps = regex!(
        r"^(?:(?P<authors>[^\[]*?)\.\s*)?(?P<title>[^.\[\]]{2,}?)\s*\[(?:J|M|C|D|N|R|P|S|Z|A|G|EB|DB|CP)(?:/OL)?\]\s*[.,]?\s*(?P<rest>.*)$"
    )
    .captures(text)?;
    Some(layout(
        caps.name("authors").map(|m| m.as_str()),
        &caps["title"],
        &caps["rest"],
    ))
}

/// `J. Smith and A. Doe, "Title," in Venue, 2020.`
fn quoted_layout(text: &str) -> Option<Layout> {
    let caps = regex!(
        r#"^(?P<authors>[^"“]*?)[,\s]*["“](?P<title>[^"”]{4,}?)[,.]?["”]\s*[,.]?\s*(?P<rest>.*)$"#
    )
    .captures(text)?;
    let authors = caps.name("authors").map(|m| m.as_str()).filter(|a| !a.trim().is_empty());
    Some(layout(authors, &caps["title"], &caps["rest"]))
}

/// `Smith, J., & Doe, A. (2020). Title. Venue, 5(2), 1-10.`
fn apa_layout(text: &str) -> Option<Layout> {
    let caps = regex!(
        r"^(?P<authors>.+?)\s*\((?:1[5-9]\d{2}|20\d{2})[a-z]?\)\.?\s*(?P<title>[^.?!]+[?!]?)\.?\s*(?P<rest>.*)$"
    )
    .captures(text)?;
    Some(layout(Some(&caps["authors"]), &caps["title"], &caps["rest"]))
}

/// `Smith J, Doe A. Title. Venue 2020;1:2.`
fn segment_layout(text: &str) -> Layout {
    let segments: Vec<&str> = regex!(r"[.。]\s+|。")
        .split(text)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    let Some(first) = segments.first() else {
        return Layout::default();
    };

    if looks_like_names(first) {
        // Skip initials split off by the period ("Smith J. A. Title")
        let Some(title_at) = (1..segments.len()).find(|&i| segments[i].chars().count() > 3) else {
            return Layout {
                authors: parse_authors(first),
                ..Default::default()
            };
        };
        let authors = segments[..title_at].join(". ");
        let rest = segments[title_at + 1..].join(". ");
        layout(Some(&authors), segments[title_at], &rest)
    } else if first.split_whitespace().count() >= 3 {
        layout(None, first, &segments[1..].join(". "))
    } else {
        Layout::default()
    }
}

fn venue_from(rest: &str) -> Field<String> {
    let rest = regex!(r"(?i)^(?:in[:\s]\s*)").replace(rest.trim(), "");
    let venue = rest
        .split([',', ';', '(', '，', '；'])
        .next()
        .unwrap_or_default()
        .split(|c: char| c.is_ascii_digit())
        .next()
        .unwrap_or_default()
        .trim()
        .trim_end_matches(['.', ':', '：'])
        .trim();

    if venue.chars().count() >= 2 && venue.chars().any(char::is_alphabetic) {
        Field::Parsed(venue.to_string())
    } else {
        Field::Absent
    }
}

fn is_initials(token: &str) -> bool {
    regex!(r"^(?:[A-Z]\.?-?){1,3}$").is_match(token)
}

fn is_particle(word: &str) -> bool {
    matches!(
        word.to_lowercase().as_str(),
        "van" | "von" | "de" | "der" | "den" | "la" | "le" | "di" | "da" | "du" | "del"
    )
}

fn is_et_al(part: &str) -> bool {
    let lower = part.trim().trim_end_matches('.').to_lowercase();
    lower == "et al" || lower == "等" || lower == "others"
}

/// Split an author segment, re-attaching initials that follow a surname
fn split_names(segment: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for part in regex!(r"\s*(?:[,;&，、；]|\band\b)\s*").split(segment) {
        let part = part.trim();
        if part.is_empty() || is_et_al(part) {
            continue;
        }
        let initials_only = part.split_whitespace().all(is_initials);
        match names.last_mut() {
            Some(last) if initials_only && !last.split_whitespace().any(is_initials) => {
                last.push_str(", ");
                last.push_str(part);
            }
            _ => names.push(part.to_string()),
        }
    }
    names
}

fn is_name(part: &str) -> bool {
    if part.chars().all(|c| is_cjk(c) || c == '·') {
        return (2..=5).contains(&part.chars().count());
    }
    let words: Vec<&str> = part.split_whitespace().collect();
    !words.is_empty()
        && words.len() <= 5
        && words.iter().all(|w| {
            is_particle(w) || w.chars().next().is_some_and(char::is_uppercase)
        })
}

fn looks_like_names(segment: &str) -> bool {
    if segment.is_empty() || segment.chars().count() > 400 || segment.chars().any(|c| c.is_ascii_digit()) {
        return false;
    }
    let names = split_names(segment);
    if names.is_empty() || !names.iter().all(|n| is_name(&n.replace(',', " "))) {
        return false;
    }
    names.len() >= 2
        || names.iter().any(|n| n.chars().all(|c| is_cjk(c) || c == '·'))
        || names[0].replace(',', " ").split_whitespace().any(is_initials)
}

fn parse_authors(segment: &str) -> Field<Vec<String>> {
    let segment = segment.trim().trim_end_matches(',');
    if looks_like_names(segment) {
        Field::Parsed(split_names(segment))
    } else {
        Field::Absent
    }
}

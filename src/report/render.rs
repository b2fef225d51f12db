//! Text and JSON rendering of a [`Report`].

use comfy_table::{presets, Attribute, Cell, Color, ContentArrangement, Table};
use owo_colors::{OwoColorize, Style};
use std::fmt::Write;

use crate::models::{ConsistencyIssue, IssueKind, Verdict, VerificationStatus};
use crate::report::{Correction, CorrectionKind, OverallAssessment, Report, Severity};
use crate::utils::{collapse_whitespace, truncate_with_ellipsis};

const RAW_TEXT_WIDTH: usize = 80;

/// Applies colors only when asked to
#[derive(Debug, Clone, Copy)]
struct Painter {
    colored: bool,
}

impl Painter {
    fn paint(&self, text: &str, style: Style) -> String {
        if self.colored {
            text.style(style).to_string()
        } else {
            text.to_string()
        }
    }

    fn section(&self, title: &str) -> String {
        self.paint(&format!("━━━ {} ━━━", title), Style::new().bold().cyan())
    }

    fn severity(&self, severity: Severity, text: &str) -> String {
        let style = match severity {
            Severity::High => Style::new().red().bold(),
            Severity::Medium => Style::new().yellow().bold(),
            Severity::Low => Style::new().blue(),
        };
        self.paint(text, style)
    }

    fn assessment(&self, assessment: OverallAssessment) -> String {
        let style = match assessment {
            OverallAssessment::SeriousProblems => Style::new().red().bold(),
            OverallAssessment::NeedsRevision => Style::new().yellow().bold(),
            OverallAssessment::MinorIssues => Style::new().blue().bold(),
            OverallAssessment::Good => Style::new().green().bold(),
        };
        self.paint(assessment.label(), style)
    }
}

fn status_icon(status: VerificationStatus, checked: bool) -> &'static str {
    match status {
        VerificationStatus::Verified => "✓",
        VerificationStatus::Invalid => "✗",
        VerificationStatus::Suspicious => "⚠",
        VerificationStatus::Unverified if checked => "?",
        VerificationStatus::Unverified => "○",
    }
}

fn status_color(status: VerificationStatus) -> Color {
    match status {
        VerificationStatus::Verified => Color::Green,
        VerificationStatus::Invalid => Color::Red,
        VerificationStatus::Suspicious => Color::Yellow,
        VerificationStatus::Unverified => Color::Grey,
    }
}

fn verdict_color(verdict: Verdict) -> Color {
    match verdict {
        Verdict::High | Verdict::Moderate => Color::Green,
        Verdict::Doubtful => Color::Yellow,
        Verdict::Unrelated => Color::Red,
        Verdict::NotAssessed => Color::Grey,
    }
}

/// Human-readable report, findings grouped by severity
pub fn render_text(report: &Report, colored: bool) -> String {
    let painter = Painter { colored };
    let mut out = String::new();
    let s = &report.summary;

    let _ = writeln!(out, "Reference check: {}", report.document);
    let _ = writeln!(out, "Generated {}", report.generated_at.format("%Y-%m-%d %H:%M:%S UTC"));
    let _ = writeln!(
        out,
        "Overall assessment: {} (urgency: {}){}",
        painter.assessment(report.assessment),
        report.urgency.label(),
        if report.strict { " [strict]" } else { "" }
    );

    let _ = writeln!(out, "\n{}", painter.section("Summary"));
    let _ = writeln!(
        out,
        "References: {} total, {} verified ({:.1}%)",
        s.total_references, s.verified, s.validity_rate
    );
    let _ = writeln!(
        out,
        "  invalid {}, suspicious {}, unverified {}, could not check {}",
        s.invalid, s.suspicious, s.unverified, s.could_not_check
    );
    let _ = writeln!(
        out,
        "Citations: {} markers, {} occurrences",
        s.cited_markers, s.citation_occurrences
    );
    let _ = writeln!(
        out,
        "Consistency: missing {}, unused {}, out of order {}, duplicates {}, malformed {}",
        s.missing_references, s.unused_references, s.out_of_order, s.duplicates, s.malformed_markers
    );
    let _ = writeln!(
        out,
        "Relevance: {} flagged, {} not assessed",
        s.relevance_flagged, s.relevance_not_assessed
    );

    for severity in [Severity::High, Severity::Medium, Severity::Low] {
        let group: Vec<&Correction> = report
            .corrections
            .iter()
            .filter(|c| c.severity == severity)
            .collect();
        if group.is_empty() {
            continue;
        }

        let title = format!("{} severity", capitalize(severity.label()));
        let _ = writeln!(out, "\n{}", painter.section(&title));
        for correction in group {
            render_correction(&mut out, report, correction, &painter);
        }
    }

    let unchecked: Vec<_> = report.references.iter().filter(|r| r.could_not_check()).collect();
    if !unchecked.is_empty() {
        let _ = writeln!(out, "\n{}", painter.section("Could not be checked"));
        for entry in unchecked {
            let reason = entry.notes.last().map(String::as_str).unwrap_or("no reason recorded");
            let _ = writeln!(out, "  [{}] {}", entry.index, reason);
        }
    }

    if !report.citations.is_empty() {
        let _ = writeln!(out, "\n{}", painter.section("Citation audit"));
        let _ = writeln!(out, "{}", citation_table(report, colored));
    }

    let _ = writeln!(out, "\n{}", painter.section("Suggestions"));
    if report.suggestions.is_empty() {
        let _ = writeln!(out, "No changes needed.");
    }
    for (i, suggestion) in report.suggestions.iter().enumerate() {
        let _ = writeln!(out, "{}. {}", i + 1, suggestion);
    }

    if !report.links.is_empty() {
        let _ = writeln!(out, "\n{}", painter.section("Verification links"));
        for (title, links) in [
            ("DOI", &report.links.doi),
            ("PubMed", &report.links.pubmed),
            ("Other", &report.links.other),
        ] {
            if links.is_empty() {
                continue;
            }
            let _ = writeln!(out, "{}:", title);
            for link in links {
                let _ = writeln!(out, "  [{}] {}", link.reference_index, link.url);
            }
        }
    }

    out
}

fn render_correction(out: &mut String, report: &Report, correction: &Correction, painter: &Painter) {
    let heading = format!("{} ({})", correction.kind.title(), correction.items.len().max(1));
    let _ = writeln!(out, "{}", painter.severity(correction.severity, &heading));
    let _ = writeln!(out, "  {}", correction.description);

    if correction.kind.lists_references() {
        for index in &correction.items {
            let Some(entry) = report.references.iter().find(|r| r.index == *index) else {
                continue;
            };
            let text = truncate_with_ellipsis(&collapse_whitespace(&entry.raw_text), RAW_TEXT_WIDTH);
            let _ = writeln!(
                out,
                "  {} [{}] {}",
                status_icon(entry.status, entry.checked),
                entry.index,
                text
            );
            for note in &entry.notes {
                let _ = writeln!(out, "      {}", note);
            }
        }
    } else {
        let related: Vec<String> = match correction.kind {
            CorrectionKind::RelevanceReview => report
                .relevance
                .iter()
                .filter(|j| correction.items.contains(&j.citation_marker))
                .map(|j| format!("[{}] {}: {}", j.citation_marker, j.verdict, j.rationale))
                .collect(),
            _ => report
                .issues
                .iter()
                .filter(|issue| issue_matches(correction, issue))
                .map(|issue| issue.detail.clone())
                .collect(),
        };
        for detail in related {
            let _ = writeln!(out, "  - {}", detail);
        }
    }

    let _ = writeln!(out, "  -> {}", correction.action);
}

fn issue_matches(correction: &Correction, issue: &ConsistencyIssue) -> bool {
    let kind = match correction.kind {
        CorrectionKind::MissingReferences => IssueKind::MissingReference,
        CorrectionKind::OrderIssues => IssueKind::OutOfOrder,
        CorrectionKind::MalformedMarkers => IssueKind::MalformedMarker,
        CorrectionKind::UnusedReferences => IssueKind::UnusedReference,
        CorrectionKind::DuplicateReferences => IssueKind::DuplicateCitationMarker,
        _ => return false,
    };
    issue.kind == kind
}

fn citation_table(report: &Report, colored: bool) -> Table {
    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    if colored {
        table.enforce_styling();
    }
    table.set_header(vec!["Marker", "Cited", "Reference", "Relevance", "Flag"]);

    for entry in &report.citations {
        let reference = match entry.status {
            Some(status) if entry.has_reference => {
                let checked = report
                    .references
                    .iter()
                    .find(|r| r.index == entry.marker)
                    .map(|r| r.checked)
                    .unwrap_or(false);
                let cell = Cell::new(format!("{} {}", status_icon(status, checked), status));
                if colored {
                    cell.fg(status_color(status))
                } else {
                    cell
                }
            }
            _ if entry.has_reference => Cell::new("not verified"),
            _ => {
                let cell = Cell::new("missing");
                if colored {
                    cell.fg(Color::Red)
                } else {
                    cell
                }
            }
        };

        let relevance = match entry.verdict {
            Some(verdict) if colored => Cell::new(verdict.label()).fg(verdict_color(verdict)),
            Some(verdict) => Cell::new(verdict.label()),
            None => Cell::new("-"),
        };

        let mut flags: Vec<&str> = Vec::new();
        if let Some(flag) = &entry.flag {
            flags.push(flag);
        }
        if entry.out_of_order {
            flags.push("out of order");
        }

        table.add_row(vec![
            Cell::new(format!("[{}]", entry.marker)).add_attribute(Attribute::Bold),
            Cell::new(entry.occurrences),
            reference,
            relevance,
            Cell::new(flags.join(", ")),
        ]);
    }

    table
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Pretty-printed JSON report
pub fn to_json(report: &Report) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(report)
}

//! # Reference Checker
//!
//! Verification and consistency checking of the citations and reference
//! list of a manuscript.
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`models`]: Core data structures (Citation, Reference, VerificationResult, etc.)
//! - [`extract`]: Citation marker scanning and reference list parsing
//! - [`consistency`]: Cross-checks between citations and references
//! - [`sources`]: Lookup providers behind a trait-based plugin registry
//! - [`verify`]: Bounded-concurrency verification of every reference
//! - [`relevance`]: Citation context against cited work comparison
//! - [`report`]: Report building, text and JSON rendering, annotated copies
//! - [`utils`]: HTTP client, retry, similarity, identifier validation, caching
//! - [`config`]: Configuration management
//! - [`ui`]: Terminal helpers for the command-line interface
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use reference_checker::config::Config;
//! use reference_checker::sources::SourceRegistry;
//! use reference_checker::verify::VerificationOrchestrator;
//! use reference_checker::{check_document, CheckOptions};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::default();
//! let text = std::fs::read_to_string("paper.txt")?;
//! let orchestrator = VerificationOrchestrator::new(SourceRegistry::new(), &config);
//!
//! let outcome = check_document(&text, &orchestrator, &config, &CheckOptions::new("paper.txt")).await?;
//! println!("{}", outcome.report.assessment);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod consistency;
pub mod extract;
pub mod models;
pub mod relevance;
pub mod report;
pub mod sources;
pub mod ui;
pub mod utils;
pub mod verify;

use std::collections::BTreeMap;

use chrono::Utc;

use crate::config::Config;
use crate::consistency::{AnalysisOptions, NumberingConvention};
use crate::extract::{Extraction, ExtractionError};
use crate::models::{ConsistencyIssue, RelevanceJudgment, VerificationResult};
use crate::relevance::RelevanceThresholds;
use crate::report::{build_report, Report, ReportInputs};
use crate::verify::VerificationOrchestrator;

// Re-export commonly used types
pub use models::{Citation, Reference};
pub use sources::{Source, SourceRegistry};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Options for [`check_document`]
#[derive(Debug, Clone, Default)]
pub struct CheckOptions {
    /// Name shown in the report header
    pub document: String,

    /// Reference list kept in a separate document
    pub reference_list: Option<String>,

    pub convention: NumberingConvention,

    /// Treat every consistency issue as requiring revision
    pub strict: bool,
}

impl CheckOptions {
    pub fn new(document: impl Into<String>) -> Self {
        Self {
            document: document.into(),
            ..Default::default()
        }
    }

    pub fn reference_list(mut self, text: impl Into<String>) -> Self {
        self.reference_list = Some(text.into());
        self
    }

    pub fn convention(mut self, convention: NumberingConvention) -> Self {
        self.convention = convention;
        self
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }
}

/// Everything produced by one run of the pipeline
#[derive(Debug, Clone)]
pub struct CheckOutcome {
    pub extraction: Extraction,
    pub issues: Vec<ConsistencyIssue>,
    pub results: BTreeMap<u32, VerificationResult>,
    pub judgments: Vec<RelevanceJudgment>,
    pub report: Report,
}

/// Run the whole pipeline over one document
///
/// Extraction failure is the only error; provider trouble ends up in the
/// report as references that could not be checked.
pub async fn check_document(
    text: &str,
    orchestrator: &VerificationOrchestrator,
    config: &Config,
    options: &CheckOptions,
) -> Result<CheckOutcome, ExtractionError> {
    let extraction = match &options.reference_list {
        Some(list) => crate::extract::extract_with_reference_list(text, list, &config.extraction)?,
        None => crate::extract::extract_entities(text, &config.extraction)?,
    };

    let analysis = AnalysisOptions::from_thresholds(&config.thresholds).convention(options.convention);
    let issues = crate::consistency::analyze(
        &extraction.citations,
        &extraction.references,
        &extraction.malformed_markers,
        &analysis,
    );
    tracing::info!(
        "{} citations, {} references, {} consistency issues",
        extraction.citations.len(),
        extraction.references.len(),
        issues.len()
    );

    let results = orchestrator.verify_all(&extraction.references).await;

    let judgments = crate::relevance::assess(
        &extraction.citations,
        &extraction.references,
        &results,
        &RelevanceThresholds::from(&config.thresholds),
    );

    let report = build_report(ReportInputs {
        document: &options.document,
        generated_at: Utc::now(),
        references: &extraction.references,
        citations: &extraction.citations,
        issues: &issues,
        results: &results,
        judgments: &judgments,
        strict: options.strict,
    });

    Ok(CheckOutcome {
        extraction,
        issues,
        results,
        judgments,
        report,
    })
}

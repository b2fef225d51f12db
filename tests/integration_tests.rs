//! Integration tests for Reference Checker
//!
//! These tests run the whole pipeline over small documents, with scripted
//! providers standing in for the network.

use reference_checker::config::Config;
use reference_checker::consistency::NumberingConvention;
use reference_checker::models::{
    Candidate, EvidenceSource, Field, IssueKind, Reference, ReferenceFields, ReferenceType,
    Verdict, VerificationResult, VerificationStatus,
};
use reference_checker::report::{annotate, strip_annotations, to_json, OverallAssessment};
use reference_checker::sources::{
    CrossRefSource, DoiOrgSource, MockReply, MockSource, SourceRegistry,
};
use reference_checker::utils::{HttpClient, RetryConfig, VerificationCache};
use reference_checker::verify::VerificationOrchestrator;
use reference_checker::{check_document, CheckOptions, CheckOutcome};
use std::sync::Arc;
use std::time::Duration;

fn fast_retry() -> RetryConfig {
    RetryConfig {
        max_retries: 1,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(2),
        backoff_multiplier: 2.0,
        attempt_timeout: Duration::from_millis(500),
    }
}

fn offline(config: &Config) -> VerificationOrchestrator {
    VerificationOrchestrator::new(SourceRegistry::new(), config)
}

fn with_mock(source: Arc<MockSource>, config: &Config) -> VerificationOrchestrator {
    let mut registry = SourceRegistry::new();
    registry.register(source);
    VerificationOrchestrator::new(registry, config).retry(fast_retry())
}

async fn run(text: &str, orchestrator: &VerificationOrchestrator, config: &Config) -> CheckOutcome {
    check_document(text, orchestrator, config, &CheckOptions::new("test.txt"))
        .await
        .expect("document should extract")
}

fn kinds(outcome: &CheckOutcome, kind: IssueKind) -> Vec<u32> {
    outcome
        .issues
        .iter()
        .filter(|i| i.kind == kind)
        .filter_map(|i| i.citation_marker.or(i.reference_index))
        .collect()
}

const FIVE_REFERENCES: &str = "\
Thermometry at small scales is established [1]. Later work extended it [2]. \
Two groups disagree [3], and the disagreement persists [3]. A survey exists [5].

References
[1] Kucsko G, Maurer PC. Nanometre-scale thermometry in a living cell. Nature 2013;500:54-58.
[2] Okabe K, Inada N. Intracellular temperature mapping. Nat Commun 2012;3:705.
[3] Brites CDS, Lima PP. Thermometry at the nanoscale. Nanoscale 2012;4:4799-4829.
[4] Wang XD, Wolfbeis OS. Luminescent probes and sensors for temperature. Chem Soc Rev 2013;42:7834-7869.
[5] Jaque D, Vetrone F. Luminescence nanothermometry. Nanoscale 2012;4:4301-4326.
";

#[tokio::test]
async fn test_uncited_reference_is_the_only_finding() {
    let config = Config::default();
    let outcome = run(FIVE_REFERENCES, &offline(&config), &config).await;

    assert_eq!(outcome.extraction.references.len(), 5);
    assert_eq!(kinds(&outcome, IssueKind::UnusedReference), vec![4]);
    assert!(kinds(&outcome, IssueKind::MissingReference).is_empty());
    assert!(kinds(&outcome, IssueKind::OutOfOrder).is_empty());

    let three = outcome
        .extraction
        .citations
        .iter()
        .find(|c| c.marker == 3)
        .expect("[3] is cited");
    assert_eq!(three.occurrence_count(), 2);
}

#[tokio::test]
async fn test_missing_and_unused_partition_the_markers() {
    let config = Config::default();
    let text = "Cited twice [1] and once [6].\n\nReferences\n[1] Doe A. First work. J Test 2020;1:1-2.\n[2] Roe B. Second work. J Test 2021;2:3-4.\n";
    let outcome = run(text, &offline(&config), &config).await;

    assert_eq!(kinds(&outcome, IssueKind::MissingReference), vec![6]);
    assert_eq!(kinds(&outcome, IssueKind::UnusedReference), vec![2]);
    assert_eq!(outcome.report.assessment, OverallAssessment::NeedsRevision);
    assert_eq!(outcome.report.summary.missing_references, 1);
    assert_eq!(outcome.report.summary.unused_references, 1);
}

#[tokio::test]
async fn test_out_of_order_citation() {
    let config = Config::default();
    let text = "\
Start [1]. Then jump ahead [3]. Then back [2].

References
[1] Doe A. First work. J Test 2020;1:1-2.
[2] Roe B. Second work. J Test 2021;2:3-4.
[3] Poe C. Third work. J Test 2022;3:5-6.
";
    let outcome = run(text, &offline(&config), &config).await;

    let issues: Vec<_> = outcome
        .issues
        .iter()
        .filter(|i| i.kind == IssueKind::OutOfOrder)
        .collect();
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].citation_marker, Some(3));
    let first_three = text.find("[3]").expect("marker present");
    assert!(issues[0].detail.contains(&format!("offset {}", first_three)));
}

#[tokio::test]
async fn test_alphabetical_style_skips_order_check() {
    let config = Config::default();
    let text = "Start [1]. Then [3]. Then [2].\n\nReferences\n[1] A. One.\n[2] B. Two.\n[3] C. Three.\n";
    let options = CheckOptions::new("test.txt").convention(NumberingConvention::Alphabetical);
    let outcome = check_document(text, &offline(&config), &config, &options)
        .await
        .unwrap();

    assert!(kinds(&outcome, IssueKind::OutOfOrder).is_empty());
}

const EIGHT_REFERENCES: &str = "\
All of these were consulted [1-8].

References
[1] Personal communication.
[2] Personal communication.
[3] Personal communication.
[4] Personal communication.
[5] Personal communication.
[6] Personal communication.
[7] Doe A. A paper that does not exist. J Test 2020;1:1-2. doi:10.1038/bad-doi-404
[8] Roe B. Notes on an unpublished survey. Internal report; 2019.
";

#[tokio::test]
async fn test_nonexistent_doi_and_unmatched_search() {
    let config = Config::default();
    let source = Arc::new(
        MockSource::new("mock").with_doi("10.1038/bad-doi-404", MockReply::NotFound),
    );
    let outcome = run(EIGHT_REFERENCES, &with_mock(source, &config), &config).await;

    let seven = &outcome.results[&7];
    assert_eq!(seven.status, VerificationStatus::Invalid);
    assert_eq!(seven.evidence.len(), 1);
    assert_eq!(seven.evidence[0].source, EvidenceSource::Doi);
    assert_eq!(seven.evidence[0].confidence, 0.0);

    let eight = &outcome.results[&8];
    assert_eq!(eight.status, VerificationStatus::Unverified);
    assert!(eight.checked);

    assert_eq!(outcome.report.assessment, OverallAssessment::SeriousProblems);
    assert_eq!(outcome.report.summary.invalid, 1);
}

const CONTROL_DOCUMENT: &str = "\
Relay feedback identifies the ultimate gain of a process loop [1]. We tune the PID controller gains for the heating plant [2].

References
[1] Astrom KJ, Hagglund T. Automatic tuning of simple regulators with specifications on phase and amplitude margins. Automatica 1984;20:645-651. doi:10.1016/automatica.1984.645
[2] Lee M, Park S. Qualitative nursing interviews in rural clinics. J Nurs Res 2015;12:100-110. doi:10.1000/nurs.2015.12
";

fn control_sources() -> Arc<MockSource> {
    Arc::new(
        MockSource::new("mock")
            .with_doi(
                "10.1016/automatica.1984.645",
                MockReply::found(
                    Candidate::new(
                        "Automatic tuning of simple regulators with specifications on phase and amplitude margins",
                    )
                    .url("https://doi.org/10.1016/automatica.1984.645")
                    .summary("Relay feedback experiments identify the ultimate gain used for PID tuning."),
                ),
            )
            .with_doi(
                "10.1000/nurs.2015.12",
                MockReply::found(
                    Candidate::new("Qualitative nursing interviews in rural clinics")
                        .url("https://doi.org/10.1000/nurs.2015.12")
                        .summary("Semi-structured interviews with nurses about rural primary care."),
                ),
            ),
    )
}

fn narrow_context() -> Config {
    let mut config = Config::default();
    config.extraction.context_chars = 40;
    config
}

#[tokio::test]
async fn test_unrelated_citation_context() {
    let config = narrow_context();
    let outcome = run(CONTROL_DOCUMENT, &with_mock(control_sources(), &config), &config).await;

    assert!(outcome.results[&1].is_verified());
    assert!(outcome.results[&2].is_verified());

    let two = outcome
        .judgments
        .iter()
        .find(|j| j.citation_marker == 2)
        .expect("[2] is judged");
    assert_eq!(two.verdict, Verdict::Unrelated);

    let one = outcome
        .judgments
        .iter()
        .find(|j| j.citation_marker == 1)
        .expect("[1] is judged");
    assert_ne!(one.verdict, Verdict::Unrelated);

    assert_eq!(outcome.report.assessment, OverallAssessment::NeedsRevision);
    assert_eq!(
        outcome.report.citation(2).and_then(|c| c.flag.as_deref()),
        Some("unrelated relevance")
    );
    assert_eq!(outcome.report.links.doi.len(), 2);
}

#[tokio::test]
async fn test_annotated_copy_round_trips() {
    let config = narrow_context();
    let outcome = run(CONTROL_DOCUMENT, &with_mock(control_sources(), &config), &config).await;

    let annotated = annotate(CONTROL_DOCUMENT, &outcome.extraction.citations, &outcome.report);
    assert_ne!(annotated, CONTROL_DOCUMENT);
    assert!(annotated.contains("[2]⟦!2: unrelated relevance⟧"));
    assert_eq!(strip_annotations(&annotated), CONTROL_DOCUMENT);
}

#[tokio::test]
async fn test_clean_document_annotation_is_identical() {
    let config = Config::default();
    let text = "Thermometry in cells [1].\n\nReferences\n[1] Kucsko G, Maurer PC. Nanometre-scale thermometry in a living cell. Nature 2013;500:54-58. doi:10.1038/nature12373\n";
    let source = Arc::new(MockSource::new("mock").with_doi(
        "10.1038/nature12373",
        MockReply::found(
            Candidate::new("Nanometre-scale thermometry in a living cell")
                .summary("Nanometre-scale thermometry in living cells with nitrogen-vacancy centres."),
        ),
    ));
    let outcome = run(text, &with_mock(source, &config), &config).await;

    assert_eq!(outcome.report.assessment, OverallAssessment::Good);
    assert!(!outcome.report.has_findings());
    assert_eq!(annotate(text, &outcome.extraction.citations, &outcome.report), text);
}

#[tokio::test]
async fn test_pipeline_is_idempotent() {
    let config = narrow_context();
    let source = control_sources();
    let orchestrator = with_mock(source, &config);

    let mut first = run(CONTROL_DOCUMENT, &orchestrator, &config).await;
    let second = run(CONTROL_DOCUMENT, &orchestrator, &config).await;
    first.report.generated_at = second.report.generated_at;

    assert_eq!(first.issues, second.issues);
    assert_eq!(first.results, second.results);
    assert_eq!(first.judgments, second.judgments);
    assert_eq!(first.report, second.report);
    assert_eq!(to_json(&first.report).unwrap(), to_json(&second.report).unwrap());
}

#[tokio::test]
async fn test_offline_run_reports_everything_as_unchecked() {
    let config = Config::default();
    let outcome = run(CONTROL_DOCUMENT, &offline(&config), &config).await;

    assert!(outcome.results.values().all(|r| r.could_not_check()));
    assert_eq!(outcome.report.summary.could_not_check, 2);
    assert!(outcome
        .judgments
        .iter()
        .all(|j| j.verdict == Verdict::NotAssessed));
}

#[tokio::test]
async fn test_provider_outage_is_isolated_per_reference() {
    let config = narrow_context();
    let source = Arc::new(
        MockSource::new("mock")
            .with_doi(
                "10.1016/automatica.1984.645",
                MockReply::found(Candidate::new(
                    "Automatic tuning of simple regulators with specifications on phase and amplitude margins",
                )),
            )
            .with_doi("10.1000/nurs.2015.12", MockReply::ServerError(503))
            .with_search("qualitative nursing", MockReply::NetworkError),
    );
    let outcome = run(CONTROL_DOCUMENT, &with_mock(source, &config), &config).await;

    assert!(outcome.results[&1].is_verified());
    let two = &outcome.results[&2];
    assert!(two.could_not_check());
    assert!(!two.failures.is_empty());
    assert_eq!(outcome.report.summary.could_not_check, 1);
}

#[tokio::test]
async fn test_cached_results_survive_a_provider_outage() {
    let dir = tempfile::tempdir().unwrap();
    let config = narrow_context();
    let key = VerificationCache::document_key("control.txt");

    let warm = with_mock(control_sources(), &config).with_cache(VerificationCache::at(dir.path()), &key);
    let first = run(CONTROL_DOCUMENT, &warm, &config).await;
    assert!(first.results[&2].is_verified());

    let down = Arc::new(
        MockSource::new("mock")
            .with_doi("10.1016/automatica.1984.645", MockReply::ServerError(503))
            .with_doi("10.1000/nurs.2015.12", MockReply::ServerError(503)),
    );
    let cold = with_mock(down.clone(), &config)
        .with_cache(VerificationCache::at(dir.path()), &key)
        .refresh(true);
    let second = run(CONTROL_DOCUMENT, &cold, &config).await;

    assert!(down.calls() > 0);
    assert!(second.results[&1].is_verified());
    assert!(second.results[&2].is_verified());
}

#[tokio::test]
async fn test_missing_reference_section_is_an_error() {
    let config = Config::default();
    let err = check_document(
        "A document that cites [1] but lists nothing.",
        &offline(&config),
        &config,
        &CheckOptions::new("test.txt"),
    )
    .await
    .unwrap_err();

    assert!(!err.hint().is_empty());
}

#[tokio::test]
async fn test_separate_reference_list() {
    let config = Config::default();
    let body = "Only the body here [1] and [2].";
    let list = "[1] Doe A. First work. J Test 2020;1:1-2.\n[2] Roe B. Second work. J Test 2021;2:3-4.\n";
    let options = CheckOptions::new("body.txt").reference_list(list);
    let outcome = check_document(body, &offline(&config), &config, &options)
        .await
        .unwrap();

    assert_eq!(outcome.extraction.references.len(), 2);
    assert!(outcome.issues.is_empty());
}

fn arxiv_reference(doi: &str) -> Reference {
    Reference {
        index: 1,
        label: Some(1),
        raw_text: format!(
            "[1] Vaswani A, Shazeer N. Attention is all you need. arXiv 2017. doi:{}",
            doi
        ),
        fields: ReferenceFields {
            authors: Field::Parsed(vec!["Vaswani A".to_string(), "Shazeer N".to_string()]),
            title: Field::Parsed("Attention is all you need".to_string()),
            year: Field::Parsed(2017),
            doi: Field::Parsed(doi.to_string()),
            ..Default::default()
        },
        reference_type: ReferenceType::JournalArticle,
    }
}

/// CrossRef knows nothing about the DOI; the handle API decides
async fn verify_against_http(
    doi: &str,
    handle_status: usize,
    handle_body: &str,
) -> VerificationResult {
    let mut server = mockito::Server::new_async().await;
    let _work = server
        .mock("GET", format!("/works/{}", doi).as_str())
        .with_status(404)
        .with_body("Resource not found.")
        .create_async()
        .await;
    let _search = server
        .mock("GET", "/works")
        .match_query(mockito::Matcher::Any)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"message":{"items":[]}}"#)
        .create_async()
        .await;
    let _handle = server
        .mock("GET", format!("/api/handles/{}", doi).as_str())
        .with_status(handle_status)
        .with_header("content-type", "application/json")
        .with_body(handle_body)
        .create_async()
        .await;

    let client = HttpClient::new(50).unwrap();
    let mut registry = SourceRegistry::new();
    registry.register(Arc::new(CrossRefSource::with_client(client.clone(), &server.url(), None)));
    registry.register(Arc::new(DoiOrgSource::with_client(client, &server.url())));

    let config = Config::default();
    let mut results = VerificationOrchestrator::new(registry, &config)
        .retry(fast_retry())
        .verify_all(&[arxiv_reference(doi)])
        .await;
    results.remove(&1).expect("result for reference 1")
}

#[tokio::test]
async fn test_doi_registered_outside_crossref_is_not_invalid() {
    let doi = "10.48550/arXiv.1706.03762";
    let result = verify_against_http(
        doi,
        200,
        r#"{"responseCode":1,"handle":"10.48550/arXiv.1706.03762","values":[]}"#,
    )
    .await;

    assert_ne!(result.status, VerificationStatus::Invalid);
    assert_eq!(result.status, VerificationStatus::Unverified);
    assert!(result.checked);
    assert!(result.evidence.is_empty());
    assert!(result.notes.iter().all(|n| !n.contains("not registered")));
}

#[tokio::test]
async fn test_doi_unknown_to_handle_service_is_invalid() {
    let doi = "10.1038/bad-doi-404";
    let result = verify_against_http(
        doi,
        404,
        r#"{"responseCode":100,"handle":"10.1038/bad-doi-404"}"#,
    )
    .await;

    assert_eq!(result.status, VerificationStatus::Invalid);
    assert_eq!(result.evidence[0].source, EvidenceSource::Doi);
    assert!(result
        .notes
        .contains(&"DOI 10.1038/bad-doi-404 is not registered".to_string()));
}

//! CrossRef provider: DOI resolution and bibliographic search.

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::sync::OnceLock;

use crate::models::Candidate;
use crate::sources::{SearchQuery, Source, SourceCapabilities, SourceError};
use crate::utils::{status_error, HttpClient};

const CROSSREF_API_BASE: &str = "https://api.crossref.org";

/// CrossRef provider
///
/// Uses the CrossRef REST API (`/works/{doi}` and
/// `/works?query.bibliographic=`).
#[derive(Debug, Clone)]
pub struct CrossRefSource {
    client: HttpClient,
    base_url: String,
    mailto: Option<String>,
}

impl CrossRefSource {
    pub fn new(client: HttpClient) -> Self {
        Self::with_client(client, CROSSREF_API_BASE, None)
    }

    /// Create a source against a specific endpoint
    ///
    /// `mailto` opts into CrossRef's polite pool.
    pub fn with_client(client: HttpClient, base_url: &str, mailto: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            mailto: mailto.filter(|m| !m.is_empty()),
        }
    }

    fn polite(&self, mut url: String) -> String {
        if let Some(mailto) = &self.mailto {
            url.push(if url.contains('?') { '&' } else { '?' });
            url.push_str("mailto=");
            url.push_str(&urlencoding::encode(mailto));
        }
        url
    }

    async fn fetch<T: for<'de> Deserialize<'de>>(&self, url: &str) -> Result<T, SourceError> {
        let response = self.client.get(url).await?;
        if !response.status().is_success() {
            return Err(status_error(&response, "CrossRef"));
        }
        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }
}

/// Percent-encode each path segment of a DOI, keeping the slashes
pub(super) fn encode_doi_path(doi: &str) -> String {
    doi.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

fn strip_markup(text: &str) -> String {
    static TAGS: OnceLock<Regex> = OnceLock::new();
    let tags = TAGS.get_or_init(|| Regex::new(r"<[^>]+>").expect("valid markup regex"));
    tags.replace_all(text, " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[async_trait]
impl Source for CrossRefSource {
    fn id(&self) -> &str {
        "crossref"
    }

    fn name(&self) -> &str {
        "CrossRef"
    }

    fn capabilities(&self) -> SourceCapabilities {
        SourceCapabilities::SEARCH | SourceCapabilities::DOI_LOOKUP
    }

    async fn resolve_doi(&self, doi: &str) -> Result<Vec<Candidate>, SourceError> {
        let url = self.polite(format!("{}/works/{}", self.base_url, encode_doi_path(doi)));

        let data: CRWorkResponse = match self.fetch(&url).await {
            Ok(data) => data,
            Err(SourceError::NotFound(_)) => {
                // DataCite, CNKI and other agencies' DOIs are unknown to CrossRef
                tracing::debug!("CrossRef has no record for DOI {}", doi);
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };

        Ok(data.message.into_candidate().into_iter().collect())
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<Candidate>, SourceError> {
        let mut url = format!(
            "{}/works?query.bibliographic={}&rows={}",
            self.base_url,
            urlencoding::encode(&query.text),
            query.max_results
        );
        if let Some(author) = &query.first_author {
            url.push_str("&query.author=");
            url.push_str(&urlencoding::encode(author));
        }
        let url = self.polite(url);

        let data: CRSearchResponse = self.fetch(&url).await?;
        tracing::debug!(
            "CrossRef search returned {} items for '{}'",
            data.message.items.len(),
            query.text
        );

        Ok(data
            .message
            .items
            .into_iter()
            .filter_map(CRItem::into_candidate)
            .collect())
    }
}

// ===== CrossRef API Types =====

#[derive(Debug, Deserialize)]
struct CRWorkResponse {
    message: CRItem,
}

#[derive(Debug, Deserialize)]
struct CRSearchResponse {
    message: CRSearchMessage,
}

#[derive(Debug, Deserialize)]
struct CRSearchMessage {
    #[serde(default)]
    items: Vec<CRItem>,
}

#[derive(Debug, Deserialize)]
struct CRAuthor {
    given: Option<String>,
    family: Option<String>,
    name: Option<String>,
}

impl CRAuthor {
    /// "Family, Given" when structured, else the literal name
    fn display(&self) -> Option<String> {
        match (&self.family, &self.given) {
            (Some(family), Some(given)) => Some(format!("{}, {}", family, given)),
            (Some(family), None) => Some(family.clone()),
            _ => self.name.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CRItem {
    #[serde(default)]
    title: Vec<String>,
    #[serde(rename = "DOI")]
    doi: Option<String>,
    #[serde(rename = "URL")]
    url: Option<String>,
    #[serde(default)]
    author: Vec<CRAuthor>,
    issued: Option<CRDate>,
    #[serde(rename = "container-title", default)]
    container_title: Vec<String>,
    #[serde(rename = "abstract")]
    abstract_text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CRDate {
    #[serde(rename = "date-parts", default)]
    date_parts: Vec<Vec<Option<i32>>>,
}

impl CRItem {
    fn into_candidate(self) -> Option<Candidate> {
        let title = self.title.into_iter().next().filter(|t| !t.trim().is_empty())?;

        let mut candidate = Candidate::new(strip_markup(&title))
            .authors(self.author.iter().filter_map(CRAuthor::display).collect());

        if let Some(year) = self
            .issued
            .and_then(|d| d.date_parts.into_iter().next())
            .and_then(|parts| parts.into_iter().next().flatten())
        {
            candidate = candidate.year(year);
        }
        if let Some(doi) = self.doi {
            candidate = candidate.identifier(format!("doi:{}", doi.to_lowercase()));
        }
        if let Some(url) = self.url {
            candidate = candidate.url(url);
        }

        let mut summary = Vec::new();
        if let Some(venue) = self.container_title.into_iter().next() {
            summary.push(venue);
        }
        if let Some(abstract_text) = self.abstract_text {
            summary.push(strip_markup(&abstract_text));
        }
        if !summary.is_empty() {
            candidate = candidate.summary(summary.join(". "));
        }

        Some(candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WORK: &str = r#"{
        "status": "ok",
        "message": {
            "DOI": "10.1038/NATURE12373",
            "URL": "https://doi.org/10.1038/nature12373",
            "title": ["Nanometre-scale thermometry in a living cell"],
            "author": [
                {"given": "G.", "family": "Kucsko"},
                {"given": "P. C.", "family": "Maurer"}
            ],
            "issued": {"date-parts": [[2013, 7, 31]]},
            "container-title": ["Nature"],
            "abstract": "<jats:p>Sensitive probing of temperature variations on nanometre scales.</jats:p>"
        }
    }"#;

    fn source(server: &mockito::ServerGuard) -> CrossRefSource {
        CrossRefSource::with_client(HttpClient::new(50).unwrap(), &server.url(), None)
    }

    #[test]
    fn test_encode_doi_path_keeps_slashes() {
        assert_eq!(encode_doi_path("10.1000/a b/c"), "10.1000/a%20b/c");
    }

    #[tokio::test]
    async fn test_resolve_doi() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/works/10.1038/nature12373")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(WORK)
            .create_async()
            .await;

        let candidates = source(&server).resolve_doi("10.1038/nature12373").await.unwrap();
        mock.assert_async().await;

        assert_eq!(candidates.len(), 1);
        let c = &candidates[0];
        assert_eq!(c.title, "Nanometre-scale thermometry in a living cell");
        assert_eq!(c.authors[0], "Kucsko, G.");
        assert_eq!(c.year, Some(2013));
        assert_eq!(c.identifier.as_deref(), Some("doi:10.1038/nature12373"));
        let summary = c.summary.as_deref().unwrap();
        assert!(summary.starts_with("Nature. Sensitive probing"));
        assert!(!summary.contains("jats"));
    }

    #[tokio::test]
    async fn test_resolve_unknown_doi_is_empty() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/works/10.9999/missing")
            .with_status(404)
            .with_body("Resource not found.")
            .create_async()
            .await;

        let candidates = source(&server).resolve_doi("10.9999/missing").await.unwrap();
        assert!(candidates.is_empty());
    }

    #[tokio::test]
    async fn test_server_error_is_reported() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/works/10.1000/x")
            .with_status(503)
            .create_async()
            .await;

        let err = source(&server).resolve_doi("10.1000/x").await.unwrap_err();
        assert!(matches!(err, SourceError::Server(503)));
    }

    #[tokio::test]
    async fn test_search() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/works")
            .match_query(mockito::Matcher::AllOf(vec![
                mockito::Matcher::UrlEncoded(
                    "query.bibliographic".into(),
                    "Nanometre thermometry".into(),
                ),
                mockito::Matcher::UrlEncoded("rows".into(), "5".into()),
            ]))
            .with_status(200)
            .with_body(
                r#"{"message": {"items": [
                    {"title": ["Nanometre-scale thermometry in a living cell"], "DOI": "10.1038/nature12373"},
                    {"title": [], "DOI": "10.1000/untitled"}
                ]}}"#,
            )
            .create_async()
            .await;

        let query = SearchQuery {
            text: "Nanometre thermometry".to_string(),
            title: Some("Nanometre thermometry".to_string()),
            first_author: None,
            year: None,
            max_results: 5,
        };
        let candidates = source(&server).search(&query).await.unwrap();

        // Untitled items cannot be matched and are dropped
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].identifier.as_deref(), Some("doi:10.1038/nature12373"));
    }
}

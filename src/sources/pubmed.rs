//! PubMed provider: PMID resolution using the E-utilities efetch endpoint.

use async_trait::async_trait;
use quick_xml::de::from_str;
use serde::Deserialize;

use crate::models::Candidate;
use crate::sources::{Source, SourceCapabilities, SourceError};
use crate::utils::{status_error, HttpClient};

const PUBMED_EUTILS_BASE: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils";

/// PubMed provider
///
/// Fetches MEDLINE records by PMID. An NCBI API key raises the allowed
/// request rate and is sent when configured.
#[derive(Debug, Clone)]
pub struct PubMedSource {
    client: HttpClient,
    base_url: String,
    api_key: Option<String>,
}

impl PubMedSource {
    pub fn new(client: HttpClient) -> Self {
        Self::with_client(client, PUBMED_EUTILS_BASE, None)
    }

    /// Create a source against a specific E-utilities endpoint
    pub fn with_client(client: HttpClient, base_url: &str, api_key: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.is_empty()),
        }
    }

    /// Build E-utilities fetch URL for one PubMed ID
    fn build_fetch_url(&self, pmid: &str) -> String {
        let mut url = format!(
            "{}/efetch.fcgi?db=pubmed&id={}&retmode=xml",
            self.base_url,
            urlencoding::encode(pmid)
        );
        if let Some(key) = &self.api_key {
            url.push_str("&api_key=");
            url.push_str(&urlencoding::encode(key));
        }
        url
    }

    /// Parse E-utilities fetch response XML
    fn parse_fetch_response(xml: &str) -> Result<Vec<Candidate>, SourceError> {
        // An unknown PMID yields an empty article set
        if !xml.contains("<PubmedArticle") {
            return Ok(Vec::new());
        }

        let result: PubmedArticleSet = from_str(xml)
            .map_err(|e| SourceError::Parse(format!("Failed to parse PubMed fetch XML: {}", e)))?;

        Ok(result
            .articles
            .into_iter()
            .filter_map(PubmedArticle::into_candidate)
            .collect())
    }
}

#[async_trait]
impl Source for PubMedSource {
    fn id(&self) -> &str {
        "pubmed"
    }

    fn name(&self) -> &str {
        "PubMed"
    }

    fn capabilities(&self) -> SourceCapabilities {
        SourceCapabilities::PMID_LOOKUP
    }

    async fn resolve_pmid(&self, pmid: &str) -> Result<Vec<Candidate>, SourceError> {
        let response = self.client.get(&self.build_fetch_url(pmid)).await?;

        if !response.status().is_success() {
            return match status_error(&response, "PubMed") {
                SourceError::NotFound(_) => Ok(Vec::new()),
                e => Err(e),
            };
        }

        let xml = response.text().await?;
        let candidates = Self::parse_fetch_response(&xml)?;
        tracing::debug!("PubMed returned {} records for PMID {}", candidates.len(), pmid);
        Ok(candidates)
    }
}

// ===== E-utilities XML Types =====

#[derive(Debug, Deserialize)]
struct PubmedArticleSet {
    #[serde(rename = "PubmedArticle", default)]
    articles: Vec<PubmedArticle>,
}

#[derive(Debug, Deserialize)]
#[allow(non_snake_case)]
struct PubmedArticle {
    MedlineCitation: Option<MedlineCitation>,
    PubmedData: Option<PubmedData>,
}

#[derive(Debug, Deserialize)]
#[allow(non_snake_case)]
struct MedlineCitation {
    PMID: Option<TextNode>,
    Article: Option<Article>,
}

#[derive(Debug, Deserialize)]
#[allow(non_snake_case)]
struct Article {
    Journal: Option<Journal>,
    ArticleTitle: Option<TextNode>,
    Abstract: Option<Abstract>,
    AuthorList: Option<AuthorList>,
}

#[derive(Debug, Deserialize)]
#[allow(non_snake_case)]
struct Journal {
    Title: Option<TextNode>,
    JournalIssue: Option<JournalIssue>,
}

#[derive(Debug, Deserialize)]
#[allow(non_snake_case)]
struct JournalIssue {
    PubDate: Option<PubDate>,
}

#[derive(Debug, Deserialize)]
#[allow(non_snake_case)]
struct PubDate {
    Year: Option<String>,
    MedlineDate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Abstract {
    #[serde(rename = "AbstractText", default)]
    texts: Vec<TextNode>,
}

#[derive(Debug, Deserialize)]
struct AuthorList {
    #[serde(rename = "Author", default)]
    authors: Vec<Author>,
}

#[derive(Debug, Deserialize)]
#[allow(non_snake_case)]
struct Author {
    LastName: Option<String>,
    Initials: Option<String>,
    CollectiveName: Option<String>,
}

#[derive(Debug, Deserialize)]
#[allow(non_snake_case)]
struct PubmedData {
    ArticleIdList: Option<ArticleIdList>,
}

#[derive(Debug, Deserialize)]
struct ArticleIdList {
    #[serde(rename = "ArticleId", default)]
    ids: Vec<ArticleId>,
}

#[derive(Debug, Deserialize)]
struct ArticleId {
    #[serde(rename = "@IdType")]
    id_type: String,
    #[serde(rename = "$text")]
    value: String,
}

#[derive(Debug, Deserialize)]
struct TextNode {
    #[serde(rename = "$text", default)]
    text: String,
}

impl PubmedArticle {
    fn into_candidate(self) -> Option<Candidate> {
        let citation = self.MedlineCitation?;
        let pmid = citation.PMID.map(|p| p.text.trim().to_string())?;
        let article = citation.Article?;
        let title = article
            .ArticleTitle
            .map(|t| t.text.trim().trim_end_matches('.').to_string())
            .filter(|t| !t.is_empty())?;

        let authors = article
            .AuthorList
            .map(|list| {
                list.authors
                    .into_iter()
                    .filter_map(|a| match (a.CollectiveName, a.LastName) {
                        (Some(collective), _) => Some(collective),
                        (None, Some(last)) => Some(match a.Initials {
                            Some(initials) => format!("{} {}", last, initials),
                            None => last,
                        }),
                        _ => None,
                    })
                    .collect()
            })
            .unwrap_or_default();

        let mut candidate = Candidate::new(title)
            .authors(authors)
            .identifier(format!("pmid:{}", pmid))
            .url(format!("https://pubmed.ncbi.nlm.nih.gov/{}/", pmid));

        if let Some(journal) = &article.Journal {
            if let Some(year) = journal
                .JournalIssue
                .as_ref()
                .and_then(|ji| ji.PubDate.as_ref())
                .and_then(|pd| pd.Year.as_deref().or(pd.MedlineDate.as_deref()))
                .and_then(|d| d.get(..4))
                .and_then(|y| y.parse().ok())
            {
                candidate = candidate.year(year);
            }
        }

        let mut summary = Vec::new();
        if let Some(venue) = article.Journal.and_then(|j| j.Title) {
            summary.push(venue.text);
        }
        if let Some(abstract_block) = article.Abstract {
            summary.extend(abstract_block.texts.into_iter().map(|t| t.text));
        }
        if let Some(doi) = self
            .PubmedData
            .and_then(|pd| pd.ArticleIdList)
            .and_then(|list| list.ids.into_iter().find(|id| id.id_type == "doi"))
        {
            summary.push(format!("doi:{}", doi.value));
        }
        if !summary.is_empty() {
            candidate = candidate.summary(summary.join(" "));
        }

        Some(candidate)
    }
}

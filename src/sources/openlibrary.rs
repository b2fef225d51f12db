//! Open Library provider: ISBN resolution through the Books API.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;

use crate::models::Candidate;
use crate::sources::{Source, SourceCapabilities, SourceError};
use crate::utils::{status_error, HttpClient};

const OPENLIBRARY_BASE: &str = "https://openlibrary.org";

/// Open Library provider
///
/// Catalog coverage is partial, so an empty answer only means the catalog
/// does not know the ISBN.
#[derive(Debug, Clone)]
pub struct OpenLibrarySource {
    client: HttpClient,
    base_url: String,
}

impl OpenLibrarySource {
    pub fn new(client: HttpClient) -> Self {
        Self::with_client(client, OPENLIBRARY_BASE)
    }

    pub fn with_client(client: HttpClient, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct OLBook {
    title: Option<String>,
    subtitle: Option<String>,
    #[serde(default)]
    authors: Vec<OLNamed>,
    #[serde(default)]
    publishers: Vec<OLNamed>,
    publish_date: Option<String>,
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OLNamed {
    name: String,
}

impl OLBook {
    fn into_candidate(self, isbn: &str) -> Option<Candidate> {
        let title = match (self.title, self.subtitle) {
            (Some(title), Some(subtitle)) => format!("{}: {}", title, subtitle),
            (Some(title), None) => title,
            (None, _) => return None,
        };

        let mut candidate = Candidate::new(title)
            .authors(self.authors.into_iter().map(|a| a.name).collect())
            .identifier(format!("isbn:{}", isbn));

        // publish_date is free text ("1998", "March 5, 2004")
        if let Some(year) = self.publish_date.as_deref().and_then(find_year) {
            candidate = candidate.year(year);
        }
        if let Some(url) = self.url {
            candidate = candidate.url(url);
        }
        if let Some(publisher) = self.publishers.into_iter().next() {
            candidate = candidate.summary(publisher.name);
        }
        Some(candidate)
    }
}

fn find_year(text: &str) -> Option<i32> {
    text.split(|c: char| !c.is_ascii_digit())
        .find(|token| token.len() == 4)
        .and_then(|token| token.parse().ok())
}

#[async_trait]
impl Source for OpenLibrarySource {
    fn id(&self) -> &str {
        "openlibrary"
    }

    fn name(&self) -> &str {
        "Open Library"
    }

    fn capabilities(&self) -> SourceCapabilities {
        SourceCapabilities::ISBN_LOOKUP
    }

    async fn resolve_isbn(&self, isbn: &str) -> Result<Vec<Candidate>, SourceError> {
        let url = format!(
            "{}/api/books?bibkeys=ISBN:{}&format=json&jscmd=data",
            self.base_url,
            urlencoding::encode(isbn)
        );

        let response = self.client.get(&url).await?;
        if !response.status().is_success() {
            return Err(status_error(&response, "Open Library"));
        }

        let body = response.text().await?;
        let mut books: HashMap<String, OLBook> = serde_json::from_str(&body)?;

        Ok(books
            .remove(&format!("ISBN:{}", isbn))
            .and_then(|book| book.into_candidate(isbn))
            .into_iter()
            .collect())
    }
}

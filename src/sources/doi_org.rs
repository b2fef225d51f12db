//! doi.org provider: DOI registration check through the handle API.
//!
//! Metadata providers such as CrossRef only know the DOIs of their own
//! registration agency. The handle service behind doi.org knows every
//! registered DOI, whichever agency issued it.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;

use super::crossref::encode_doi_path;
use crate::sources::{Source, SourceCapabilities, SourceError};
use crate::utils::{status_error, HttpClient};

const DOI_ORG_BASE: &str = "https://doi.org";

/// Handle API response codes
const HANDLE_FOUND: u16 = 1;
const HANDLE_NOT_FOUND: u16 = 100;
const VALUES_NOT_FOUND: u16 = 200;

/// doi.org handle resolver
#[derive(Debug, Clone)]
pub struct DoiOrgSource {
    client: HttpClient,
    base_url: String,
}

impl DoiOrgSource {
    pub fn new(client: HttpClient) -> Self {
        Self::with_client(client, DOI_ORG_BASE)
    }

    pub fn with_client(client: HttpClient, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct HandleResponse {
    #[serde(rename = "responseCode")]
    response_code: u16,
}

#[async_trait]
impl Source for DoiOrgSource {
    fn id(&self) -> &str {
        "doi.org"
    }

    fn name(&self) -> &str {
        "DOI Handle System"
    }

    fn capabilities(&self) -> SourceCapabilities {
        SourceCapabilities::DOI_REGISTRY
    }

    async fn doi_registered(&self, doi: &str) -> Result<bool, SourceError> {
        let url = format!("{}/api/handles/{}", self.base_url, encode_doi_path(doi));

        let response = self.client.get(&url).await?;
        // Unknown handles come back as 404 with a JSON body
        if !response.status().is_success() && response.status() != StatusCode::NOT_FOUND {
            return Err(status_error(&response, "doi.org"));
        }

        let body = response.text().await?;
        let handle: HandleResponse = serde_json::from_str(&body)?;

        match handle.response_code {
            HANDLE_FOUND | VALUES_NOT_FOUND => Ok(true),
            HANDLE_NOT_FOUND => {
                tracing::debug!("doi.org: {} is not registered", doi);
                Ok(false)
            }
            code => Err(SourceError::Api(format!(
                "doi.org handle API answered responseCode {}",
                code
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(server: &mockito::ServerGuard) -> DoiOrgSource {
        DoiOrgSource::with_client(HttpClient::new(50).unwrap(), &server.url())
    }

    #[tokio::test]
    async fn test_registered_doi() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/handles/10.48550/arXiv.1706.03762")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"responseCode":1,"handle":"10.48550/arXiv.1706.03762","values":[{"index":1,"type":"URL"}]}"#,
            )
            .create_async()
            .await;

        assert!(source(&server)
            .doi_registered("10.48550/arXiv.1706.03762")
            .await
            .unwrap());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_unregistered_doi() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/handles/10.1038/bad-doi-404")
            .with_status(404)
            .with_header("content-type", "application/json")
            .with_body(r#"{"responseCode":100,"handle":"10.1038/bad-doi-404"}"#)
            .create_async()
            .await;

        assert!(!source(&server)
            .doi_registered("10.1038/bad-doi-404")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_server_error_is_not_an_answer() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/handles/10.1000/x")
            .with_status(503)
            .create_async()
            .await;

        let err = source(&server).doi_registered("10.1000/x").await.unwrap_err();
        assert!(matches!(err, SourceError::Server(503)));
    }

    #[tokio::test]
    async fn test_unexpected_response_code() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/handles/10.1000/x")
            .with_status(200)
            .with_body(r#"{"responseCode":2}"#)
            .create_async()
            .await;

        let err = source(&server).doi_registered("10.1000/x").await.unwrap_err();
        assert!(matches!(err, SourceError::Api(_)));
    }
}

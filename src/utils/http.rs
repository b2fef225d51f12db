//! HTTP client shared by all providers, with built-in rate limiting.

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use nonzero_ext::nonzero;
use reqwest::{Client, Response, StatusCode};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use crate::sources::SourceError;

/// Shared HTTP client with a global outbound rate limit
///
/// Cloning is cheap; clones share the connection pool and the limiter, so
/// every provider built from the same client draws from one quota.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Arc<Client>,
    limiter: Arc<DefaultDirectRateLimiter>,
}

impl HttpClient {
    /// Create a new HTTP client with default settings
    pub fn new(requests_per_second: u32) -> Result<Self, SourceError> {
        Self::with_user_agent(
            concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")),
            requests_per_second,
            Duration::from_secs(30),
        )
    }

    /// Create a new HTTP client with a custom user agent and request timeout
    pub fn with_user_agent(
        user_agent: &str,
        requests_per_second: u32,
        timeout: Duration,
    ) -> Result<Self, SourceError> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| SourceError::Other(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self::from_client(Arc::new(client), requests_per_second))
    }

    /// Create from an existing reqwest Client
    pub fn from_client(client: Arc<Client>, requests_per_second: u32) -> Self {
        let rps = NonZeroU32::new(requests_per_second).unwrap_or(nonzero!(1u32));
        Self {
            client,
            limiter: Arc::new(RateLimiter::direct(Quota::per_second(rps))),
        }
    }

    /// Get the underlying client
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Send a GET request once the rate limiter allows it
    pub async fn get(&self, url: &str) -> Result<Response, SourceError> {
        self.limiter.until_ready().await;
        tracing::debug!("GET {}", url);

        self.client.get(url).send().await.map_err(SourceError::from)
    }
}

/// Map a non-success HTTP status to a provider error
///
/// 404/410 are explicit "does not exist" answers; 429 and 5xx are transient.
pub fn status_error(response: &Response, provider: &str) -> SourceError {
    let status = response.status();
    match status {
        StatusCode::NOT_FOUND | StatusCode::GONE => {
            SourceError::NotFound(format!("{} returned {}", provider, status))
        }
        StatusCode::TOO_MANY_REQUESTS => SourceError::RateLimit(
            response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse().ok()),
        ),
        s if s.is_server_error() => SourceError::Server(s.as_u16()),
        s => SourceError::Api(format!("{} returned status: {}", provider, s)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn test_status_error_classification() {
        let mut server = mockito::Server::new_async().await;
        let _missing = server.mock("GET", "/missing").with_status(404).create_async().await;
        let _busy = server
            .mock("GET", "/busy")
            .with_status(429)
            .with_header("retry-after", "3")
            .create_async()
            .await;
        let _down = server.mock("GET", "/down").with_status(502).create_async().await;

        let client = HttpClient::new(50).unwrap();

        let response = client.get(&format!("{}/missing", server.url())).await.unwrap();
        assert!(matches!(status_error(&response, "test"), SourceError::NotFound(_)));

        let response = client.get(&format!("{}/busy", server.url())).await.unwrap();
        assert!(matches!(status_error(&response, "test"), SourceError::RateLimit(Some(3))));

        let response = client.get(&format!("{}/down", server.url())).await.unwrap();
        assert!(matches!(status_error(&response, "test"), SourceError::Server(502)));
    }

    #[tokio::test]
    async fn test_rate_limiter_is_shared_between_clones() {
        let client = HttpClient::new(2).unwrap();
        let clone = client.clone();

        // The quota allows a burst of 2, the third permit has to wait
        let start = Instant::now();
        client.limiter.until_ready().await;
        clone.limiter.until_ready().await;
        client.limiter.until_ready().await;
        assert!(start.elapsed() >= Duration::from_millis(300));
    }
}

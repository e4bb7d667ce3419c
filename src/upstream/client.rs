//! Plain JSON-over-HTTP client for sibling services

use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

/// Per-request timeout for collaborator calls
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Client bound to one service base URL
#[derive(Clone)]
pub struct ServiceClient {
    client: Client,
    base_url: String,
}

impl ServiceClient {
    pub fn new(base_url: &str) -> Result<Self, UpstreamError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(UpstreamError::Request)?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// GET with extra headers, body discarded
    pub async fn get(&self, path: &str, headers: &[(&str, &str)]) -> Result<(), UpstreamError> {
        let mut request = self.client.get(self.url(path));
        for (name, value) in headers {
            request = request.header(*name, *value);
        }
        let response = request.send().await.map_err(UpstreamError::Request)?;
        Self::check(response).await
    }

    /// POST a JSON body, response body discarded
    pub async fn post<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<(), UpstreamError> {
        let response = self
            .client
            .post(self.url(path))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(UpstreamError::Request)?;
        Self::check(response).await
    }

    async fn check(response: reqwest::Response) -> Result<(), UpstreamError> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

/// Collaborator failures. Logged, never shown to players.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Timed out after {0:?}")]
    Timeout(Duration),
}

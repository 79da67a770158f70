use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::NetworkError;

/// Default User-Agent sent with tile requests.
///
/// Public tile servers (OpenStreetMap in particular) reject requests without
/// an identifying User-Agent.
pub const DEFAULT_USER_AGENT: &str = concat!("tile-loader/", env!("CARGO_PKG_VERSION"));

/// Trait for fetching raw tile bytes from a URL.
///
/// Implementations perform a single GET. Redirect and retry policy, if any,
/// belong to the implementation; the loader never retries.
#[async_trait]
pub trait NetworkFetcher: Send + Sync {
    /// Fetch the body at `url`.
    ///
    /// Returns an error if the request fails or the status is not a success.
    async fn get(&self, url: &str) -> Result<Bytes, NetworkError>;
}

#[async_trait]
impl<T: NetworkFetcher + ?Sized> NetworkFetcher for Arc<T> {
    async fn get(&self, url: &str) -> Result<Bytes, NetworkError> {
        (**self).get(url).await
    }
}

/// Reqwest-backed implementation of [`NetworkFetcher`].
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Create a fetcher with the default User-Agent.
    pub fn new() -> Result<Self, NetworkError> {
        Self::with_user_agent(DEFAULT_USER_AGENT)
    }

    /// Create a fetcher with a custom User-Agent.
    pub fn with_user_agent(user_agent: &str) -> Result<Self, NetworkError> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .build()
            .map_err(|e| NetworkError::Request(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client })
    }

}

#[async_trait]
impl NetworkFetcher for HttpFetcher {
    async fn get(&self, url: &str) -> Result<Bytes, NetworkError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| NetworkError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(NetworkError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        response
            .bytes()
            .await
            .map_err(|e| NetworkError::Body(e.to_string()))
    }
}

//! Outbound JSON fetching
//!
//! The resolver talks to remote instances through [`JsonFetcher`], so that
//! the retry policy and caching can be exercised without a network.
//! [`HttpFetcher`] is the reqwest-backed implementation.

use crate::signature::{SignatureError, SigningKey};
use chrono::Utc;
use reqwest::{
    Client,
    header::{ACCEPT, HeaderMap, HeaderName, HeaderValue},
};
use serde_json::Value;
use std::future::Future;
use thiserror::Error;
use tracing::debug;
use url::Url;

/// Accept header for actor documents
pub const ACTIVITYPUB_CONTENT_TYPE: &str = "application/activity+json";

/// Error type for fetch operations
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    UrlError(#[from] url::ParseError),

    #[error("Failed with status: {0}")]
    StatusError(reqwest::StatusCode),

    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    #[error("Signature error: {0}")]
    SignatureError(#[from] SignatureError),
}

pub type Result<T> = std::result::Result<T, FetchError>;

/// A GET request for a JSON document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub params: Vec<(String, String)>,
    /// Domain of the instance making the request
    pub origin_domain: String,
    /// Scheme this instance is served over
    pub scheme: String,
}

impl FetchRequest {
    pub fn new(url: impl Into<String>, origin_domain: &str, scheme: &str) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
            params: Vec::new(),
            origin_domain: origin_domain.to_string(),
            scheme: scheme.to_string(),
        }
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn param(mut self, name: &str, value: &str) -> Self {
        self.params.push((name.to_string(), value.to_string()));
        self
    }

    /// Full URL with parameters appended to the query
    pub fn full_url(&self) -> Result<Url> {
        let mut url = Url::parse(&self.url)?;
        if !self.params.is_empty() {
            let mut query_pairs = url.query_pairs_mut();
            for (name, value) in &self.params {
                query_pairs.append_pair(name, value);
            }
        }
        Ok(url)
    }
}

/// Fetches JSON documents from remote instances
pub trait JsonFetcher: Send + Sync {
    fn get_json(&self, request: &FetchRequest) -> impl Future<Output = Result<Value>> + Send;
}

/// reqwest-backed fetcher, optionally signing every request
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    signing_key: Option<SigningKey>,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self::with_client(Client::new())
    }

    /// Create a fetcher with a custom HTTP client
    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            signing_key: None,
        }
    }

    /// Sign requests with the given key
    pub fn with_signing_key(mut self, key: SigningKey) -> Self {
        self.signing_key = Some(key);
        self
    }

    fn headers_for(&self, request: &FetchRequest, url: &Url) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        for (name, value) in &request.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| FetchError::InvalidHeader(e.to_string()))?;
            let value =
                HeaderValue::from_str(value).map_err(|e| FetchError::InvalidHeader(e.to_string()))?;
            headers.insert(name, value);
        }

        let user_agent = format!(
            "fingerpost/{} (+{}://{}/)",
            env!("CARGO_PKG_VERSION"),
            request.scheme,
            request.origin_domain
        );
        headers.insert(
            reqwest::header::USER_AGENT,
            HeaderValue::from_str(&user_agent).map_err(|e| FetchError::InvalidHeader(e.to_string()))?,
        );

        if let Some(key) = &self.signing_key {
            let signed = key.sign_get(url, Utc::now())?;
            for (name, value) in [
                ("host", signed.host),
                ("date", signed.date),
                ("signature", signed.signature),
            ] {
                let value = HeaderValue::from_str(&value)
                    .map_err(|e| FetchError::InvalidHeader(e.to_string()))?;
                headers.insert(HeaderName::from_static(name), value);
            }
        }

        Ok(headers)
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl JsonFetcher for HttpFetcher {
    async fn get_json(&self, request: &FetchRequest) -> Result<Value> {
        let url = request.full_url()?;
        let headers = self.headers_for(request, &url)?;

        debug!("GET {}", url);
        let response = self.client.get(url).headers(headers).send().await?;

        if !response.status().is_success() {
            return Err(FetchError::StatusError(response.status()));
        }

        Ok(response.json::<Value>().await?)
    }
}

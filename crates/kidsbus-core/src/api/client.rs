//! HTTP gateway for the remote document store.
//!
//! Documents are exchanged as camelCase JSON under
//! `{base}/{collection}` and `{base}/{collection}/{id}`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::debug;

use crate::models::{Collection, Statistics};

use super::gateway::{Gateway, WriteAck, WriteResponse};
use super::ApiError;

/// HTTP request timeout in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Gateway talking to the store over HTTP.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct HttpGateway {
    client: Client,
    base_url: String,
    token: Option<Arc<String>>,
}

impl HttpGateway {
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> Result<Self, ApiError> {
        let client = Client::builder().timeout(request_timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
        })
    }

    /// Create a gateway with the given token, sharing the connection pool.
    pub fn with_token(&self, token: Arc<String>) -> Self {
        Self {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            token: Some(token),
        }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    fn collection_url(&self, collection: Collection) -> String {
        format!("{}/{}", self.base_url, collection.as_str())
    }

    fn document_url(&self, collection: Collection, id: &str) -> String {
        format!("{}/{}/{}", self.base_url, collection.as_str(), id)
    }

    fn auth_headers(&self) -> Result<header::HeaderMap, ApiError> {
        let mut headers = header::HeaderMap::new();
        if let Some(ref token) = self.token {
            let value = header::HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|_| ApiError::InvalidResponse("token is not a valid header value".to_string()))?;
            headers.insert(header::AUTHORIZATION, value);
        }
        Ok(headers)
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    async fn parse<T: DeserializeOwned>(response: reqwest::Response, url: &str) -> Result<T, ApiError> {
        let text = response.text().await?;
        serde_json::from_str(&text)
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse JSON response from {}: {}", url, e)))
    }

    async fn get<T: DeserializeOwned>(&self, url: &str) -> Result<T, ApiError> {
        let response = self.client.get(url).headers(self.auth_headers()?).send().await?;
        let response = Self::check_response(response).await?;
        Self::parse(response, url).await
    }

    async fn write(&self, request: reqwest::RequestBuilder, url: &str) -> Result<WriteAck, ApiError> {
        let response = request.headers(self.auth_headers()?).send().await?;
        let response = Self::check_response(response).await?;
        let result: WriteResponse = Self::parse(response, url).await?;
        result.into_result()
    }
}

#[async_trait]
impl Gateway for HttpGateway {
    async fn list(&self, collection: Collection) -> Result<Vec<Value>, ApiError> {
        let url = self.collection_url(collection);
        debug!(url = %url, "Listing collection");
        self.get(&url).await
    }

    async fn read_document(&self, collection: Collection, id: &str) -> Result<Option<Value>, ApiError> {
        let url = self.document_url(collection, id);
        let response = self.client.get(&url).headers(self.auth_headers()?).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = Self::check_response(response).await?;
        Self::parse(response, &url).await.map(Some)
    }

    async fn add(&self, collection: Collection, data: Value) -> Result<WriteAck, ApiError> {
        let url = self.collection_url(collection);
        self.write(self.client.post(&url).json(&data), &url).await
    }

    async fn update(&self, collection: Collection, id: &str, changes: Value) -> Result<WriteAck, ApiError> {
        let url = self.document_url(collection, id);
        self.write(self.client.patch(&url).json(&changes), &url).await
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<WriteAck, ApiError> {
        let url = self.document_url(collection, id);
        self.write(self.client.delete(&url), &url).await
    }

    async fn set_occupancy(&self, bus_id: &str, expected: u32, count: u32) -> Result<WriteAck, ApiError> {
        let url = format!("{}/occupancy", self.document_url(Collection::Buses, bus_id));
        let body = json!({ "expected": expected, "studentsCount": count });
        self.write(self.client.post(&url).json(&body), &url).await
    }

    async fn statistics(&self) -> Result<Statistics, ApiError> {
        let url = format!("{}/statistics", self.base_url);
        self.get(&url).await
    }
}

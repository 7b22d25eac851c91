//! Remote object-store blob backend
//!
//! Objects are addressed as `<base_url>/<prefix>/<path>` and accessed with
//! plain `GET`/`PUT`/`DELETE`/`HEAD` plus an optional bearer token. Reads go
//! through a [`BlobReadCache`]; every write or delete invalidates the cached
//! entry before the upstream call is issued.

use crate::backend::BlobStore;
use crate::blob_cache::BlobReadCache;
use crate::error::{Result, StoreError};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Raw object operations of a remote store
#[async_trait]
pub trait ObjectStoreClient: Send + Sync + 'static {
    async fn get_object(&self, key: &str) -> Result<Option<Bytes>>;

    async fn put_object(&self, key: &str, data: Bytes) -> Result<()>;

    /// Returns whether the object existed
    async fn delete_object(&self, key: &str) -> Result<bool>;

    async fn object_last_modified(&self, key: &str) -> Result<Option<DateTime<Utc>>>;
}

/// HTTP object store (any server that maps REST verbs onto object keys)
#[derive(Debug, Clone)]
pub struct HttpObjectStore {
    client: Client,
    base_url: String,
    prefix: String,
    token: Option<String>,
}

impl HttpObjectStore {
    pub fn new(
        base_url: impl Into<String>,
        prefix: impl Into<String>,
        token: Option<String>,
    ) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(StoreError::Unavailable(
                "remote storage selected but storage.remote.base_url is empty".into(),
            ));
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            base_url,
            prefix: prefix.into().trim_matches('/').to_string(),
            token,
        })
    }

    fn url(&self, key: &str) -> String {
        if self.prefix.is_empty() {
            format!("{}/{}", self.base_url, key)
        } else {
            format!("{}/{}/{}", self.base_url, self.prefix, key)
        }
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn failure(response: reqwest::Response) -> StoreError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        warn!("Object store error ({}): {}", status, body);
        StoreError::Unavailable(format!("object store returned {}: {}", status, body))
    }
}

#[async_trait]
impl ObjectStoreClient for HttpObjectStore {
    async fn get_object(&self, key: &str) -> Result<Option<Bytes>> {
        let url = self.url(key);
        debug!("GET {}", url);
        let response = self.authorize(self.client.get(&url)).send().await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => Ok(Some(response.bytes().await?)),
            _ => Err(Self::failure(response).await),
        }
    }

    async fn put_object(&self, key: &str, data: Bytes) -> Result<()> {
        let url = self.url(key);
        debug!("PUT {} ({} bytes)", url, data.len());
        let response = self
            .authorize(self.client.put(&url))
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(data)
            .send()
            .await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(Self::failure(response).await)
        }
    }

    async fn delete_object(&self, key: &str) -> Result<bool> {
        let url = self.url(key);
        debug!("DELETE {}", url);
        let response = self.authorize(self.client.delete(&url)).send().await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => Ok(true),
            _ => Err(Self::failure(response).await),
        }
    }

    async fn object_last_modified(&self, key: &str) -> Result<Option<DateTime<Utc>>> {
        let url = self.url(key);
        let response = self.authorize(self.client.head(&url)).send().await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => Ok(response
                .headers()
                .get(reqwest::header::LAST_MODIFIED)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| DateTime::parse_from_rfc2822(v).ok())
                .map(|date| date.with_timezone(&Utc))),
            _ => Err(Self::failure(response).await),
        }
    }
}

/// Blob backend backed by an [`ObjectStoreClient`] with a read cache
pub struct RemoteBlobStore<C: ObjectStoreClient> {
    client: Arc<C>,
    cache: BlobReadCache,
}

impl<C: ObjectStoreClient> RemoteBlobStore<C> {
    pub fn new(client: C, cache: BlobReadCache) -> Self {
        Self {
            client: Arc::new(client),
            cache,
        }
    }

    pub fn cache(&self) -> &BlobReadCache {
        &self.cache
    }
}

#[async_trait]
impl<C: ObjectStoreClient> BlobStore for RemoteBlobStore<C> {
    fn kind(&self) -> &'static str {
        "remote"
    }

    async fn get(&self, path: &str) -> Result<Option<Bytes>> {
        let client = self.client.clone();
        let key = path.to_string();
        self.cache
            .get_or_fetch(path, move || async move { client.get_object(&key).await })
            .await
    }

    // Invalidated on both sides of the write: a read racing the upload may
    // have cached the previous object.
    async fn put(&self, path: &str, data: Bytes) -> Result<()> {
        self.cache.invalidate(path);
        let result = self.client.put_object(path, data).await;
        self.cache.invalidate(path);
        result
    }

    async fn delete(&self, path: &str) -> Result<bool> {
        self.cache.invalidate(path);
        let result = self.client.delete_object(path).await;
        self.cache.invalidate(path);
        result
    }

    async fn list(&self, _dir: &str) -> Result<Option<Vec<String>>> {
        Ok(None)
    }

    async fn last_modified(&self, path: &str) -> Result<Option<DateTime<Utc>>> {
        self.client.object_last_modified(path).await
    }
}

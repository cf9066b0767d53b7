//! Read-only HTTP backend for remote (proxy) stores.

use crate::error::{StorageError, StorageResult};
use crate::traits::{ByteStream, ObjectStore, validate_key};
use async_trait::async_trait;
use bytes::Bytes;
use depot_core::RemoteSettings;
use futures::TryStreamExt;
use reqwest::{StatusCode, Url};
use std::time::Duration;
use tracing::instrument;

/// Fetches content from an upstream repository over HTTP(S).
pub struct HttpBackend {
    http: reqwest::Client,
    base_url: Url,
}

impl HttpBackend {
    /// Build a client for `settings`. `default_timeout` applies when the
    /// remote does not set its own.
    pub fn new(settings: &RemoteSettings, default_timeout: Duration) -> StorageResult<Self> {
        let mut base = settings.url.clone();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base)
            .map_err(|e| StorageError::Config(format!("invalid remote url {}: {e}", settings.url)))?;

        let timeout = settings
            .timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(default_timeout);

        let mut builder = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .user_agent(concat!("depot/", env!("CARGO_PKG_VERSION")));

        if settings.insecure_skip_verify {
            tracing::warn!(url = %base_url, "TLS verification disabled for remote store");
            builder = builder.danger_accept_invalid_certs(true);
        }
        if let Some(pem) = &settings.server_certificate_pem {
            let cert = reqwest::Certificate::from_pem(pem.as_bytes())
                .map_err(|e| StorageError::Config(format!("invalid server certificate: {e}")))?;
            builder = builder.add_root_certificate(cert);
        }

        let http = builder
            .build()
            .map_err(|e| StorageError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { http, base_url })
    }

    fn url(&self, key: &str) -> StorageResult<Url> {
        validate_key(key)?;
        self.base_url
            .join(key)
            .map_err(|e| StorageError::InvalidKey(format!("{key}: {e}")))
    }

    async fn fetch(&self, key: &str) -> StorageResult<reqwest::Response> {
        let url = self.url(key)?;
        let response = self.http.get(url.clone()).send().await?;
        match response.status() {
            status if status.is_success() => Ok(response),
            StatusCode::NOT_FOUND | StatusCode::GONE => Err(StorageError::NotFound(key.to_string())),
            status => Err(StorageError::Upstream {
                url: url.to_string(),
                status: status.as_u16(),
            }),
        }
    }

    fn read_only(&self) -> StorageError {
        StorageError::ReadOnly(self.base_url.to_string())
    }
}

#[async_trait]
impl ObjectStore for HttpBackend {
    #[instrument(skip(self), fields(backend = "http", base = %self.base_url))]
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let url = self.url(key)?;
        let response = self.http.head(url.clone()).send().await?;
        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND | StatusCode::GONE => Ok(false),
            status => Err(StorageError::Upstream {
                url: url.to_string(),
                status: status.as_u16(),
            }),
        }
    }

    #[instrument(skip(self), fields(backend = "http", base = %self.base_url))]
    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        Ok(self.fetch(key).await?.bytes().await?)
    }

    #[instrument(skip(self), fields(backend = "http", base = %self.base_url))]
    async fn get_stream(&self, key: &str) -> StorageResult<ByteStream> {
        let response = self.fetch(key).await?;
        Ok(Box::pin(response.bytes_stream().map_err(StorageError::from)))
    }

    async fn put(&self, _key: &str, _data: Bytes) -> StorageResult<()> {
        Err(self.read_only())
    }

    async fn put_if_not_exists(&self, _key: &str, _data: Bytes) -> StorageResult<bool> {
        Err(self.read_only())
    }

    async fn delete(&self, _key: &str) -> StorageResult<()> {
        Err(self.read_only())
    }

    /// Upstream listings are not available; remote stores report nothing.
    async fn list(&self, _prefix: &str) -> StorageResult<Vec<String>> {
        Ok(Vec::new())
    }

    fn backend_name(&self) -> &'static str {
        "http"
    }
}

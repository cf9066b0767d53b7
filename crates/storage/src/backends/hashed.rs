//! Hashed directory layout over another backend.
//!
//! `org/foo/1.0/foo-1.0.jar` is kept at `ab/cd/org/foo/1.0/foo-1.0.jar`,
//! where `abcd...` is the SHA-256 of `org/foo/1.0`. Callers only ever see
//! the requested paths.

use crate::error::StorageResult;
use crate::traits::{ByteStream, ObjectStore, validate_key};
use async_trait::async_trait;
use bytes::Bytes;
use sha2::{Digest, Sha256};
use std::sync::Arc;

pub struct HashedLayout {
    inner: Arc<dyn ObjectStore>,
}

impl HashedLayout {
    pub fn new(inner: Arc<dyn ObjectStore>) -> Self {
        Self { inner }
    }

    /// Where `key` lives in the wrapped backend.
    pub fn physical_key(key: &str) -> String {
        let parent = key.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("");
        let hash = hex::encode(Sha256::digest(parent.as_bytes()));
        format!("{}/{}/{}", &hash[..2], &hash[2..4], key)
    }

    /// The requested path behind a physical key, if it has the layout.
    fn logical_key(physical: &str) -> Option<&str> {
        let mut parts = physical.splitn(3, '/');
        let (first, second, rest) = (parts.next()?, parts.next()?, parts.next()?);
        (first.len() == 2 && second.len() == 2).then_some(rest)
    }
}

fn under_prefix(key: &str, prefix: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    prefix.is_empty()
        || key == prefix
        || key
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('/'))
}

#[async_trait]
impl ObjectStore for HashedLayout {
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        validate_key(key)?;
        self.inner.exists(&Self::physical_key(key)).await
    }

    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        validate_key(key)?;
        self.inner.get(&Self::physical_key(key)).await
    }

    async fn get_stream(&self, key: &str) -> StorageResult<ByteStream> {
        validate_key(key)?;
        self.inner.get_stream(&Self::physical_key(key)).await
    }

    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()> {
        validate_key(key)?;
        self.inner.put(&Self::physical_key(key), data).await
    }

    async fn put_if_not_exists(&self, key: &str, data: Bytes) -> StorageResult<bool> {
        validate_key(key)?;
        self.inner
            .put_if_not_exists(&Self::physical_key(key), data)
            .await
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        validate_key(key)?;
        self.inner.delete(&Self::physical_key(key)).await
    }

    /// Files of one directory share a hashed prefix, but a subtree does not,
    /// so listing walks the whole backend.
    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        validate_key(prefix)?;
        let mut keys: Vec<String> = self
            .inner
            .list("")
            .await?
            .iter()
            .filter_map(|physical| Self::logical_key(physical))
            .filter(|key| under_prefix(key, prefix))
            .map(str::to_string)
            .collect();
        keys.sort();
        Ok(keys)
    }

    fn backend_name(&self) -> &'static str {
        self.inner.backend_name()
    }

    async fn health_check(&self) -> StorageResult<()> {
        self.inner.health_check().await
    }
}

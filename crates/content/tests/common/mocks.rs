use async_trait::async_trait;
use bytes::Bytes;
use depot_storage::{ByteStream, MemoryBackend, ObjectStore, StorageError, StorageResult};
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

/// Backend that answers like a memory backend, after a delay.
#[allow(dead_code)]
pub struct SlowBackend {
    pub inner: MemoryBackend,
    pub delay: Duration,
}

#[allow(dead_code)]
impl SlowBackend {
    pub fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryBackend::new(),
            delay,
        })
    }
}

#[async_trait]
impl ObjectStore for SlowBackend {
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        tokio::time::sleep(self.delay).await;
        self.inner.exists(key).await
    }

    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        tokio::time::sleep(self.delay).await;
        self.inner.get(key).await
    }

    async fn get_stream(&self, key: &str) -> StorageResult<ByteStream> {
        tokio::time::sleep(self.delay).await;
        self.inner.get_stream(key).await
    }

    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()> {
        self.inner.put(key, data).await
    }

    async fn put_if_not_exists(&self, key: &str, data: Bytes) -> StorageResult<bool> {
        self.inner.put_if_not_exists(key, data).await
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.inner.delete(key).await
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        self.inner.list(prefix).await
    }

    fn backend_name(&self) -> &'static str {
        "slow"
    }
}

/// Backend whose every read fails, like an unreachable upstream.
#[allow(dead_code)]
#[derive(Default)]
pub struct FailingBackend {
    pub calls: AtomicUsize,
}

#[allow(dead_code)]
impl FailingBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn fail(&self) -> StorageError {
        self.calls.fetch_add(1, Ordering::SeqCst);
        StorageError::Upstream {
            url: "http://unreachable.invalid".to_string(),
            status: 503,
        }
    }
}

#[async_trait]
impl ObjectStore for FailingBackend {
    async fn exists(&self, _key: &str) -> StorageResult<bool> {
        Err(self.fail())
    }

    async fn get(&self, _key: &str) -> StorageResult<Bytes> {
        Err(self.fail())
    }

    async fn get_stream(&self, _key: &str) -> StorageResult<ByteStream> {
        Err(self.fail())
    }

    async fn put(&self, _key: &str, _data: Bytes) -> StorageResult<()> {
        Err(self.fail())
    }

    async fn put_if_not_exists(&self, _key: &str, _data: Bytes) -> StorageResult<bool> {
        Err(self.fail())
    }

    async fn delete(&self, _key: &str) -> StorageResult<()> {
        Err(self.fail())
    }

    async fn list(&self, _prefix: &str) -> StorageResult<Vec<String>> {
        Err(self.fail())
    }

    fn backend_name(&self) -> &'static str {
        "failing"
    }
}

/// Memory backend that fails with an I/O error for selected paths, and
/// for every delete while `fail_deletes` is set.
#[allow(dead_code)]
pub struct FaultyBackend {
    pub inner: MemoryBackend,
    pub broken: HashSet<String>,
    pub fail_deletes: AtomicBool,
}

#[allow(dead_code)]
impl FaultyBackend {
    pub fn new(broken: impl IntoIterator<Item = &'static str>) -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryBackend::new(),
            broken: broken.into_iter().map(String::from).collect(),
            fail_deletes: AtomicBool::new(false),
        })
    }

    fn check(&self, key: &str) -> StorageResult<()> {
        if self.broken.contains(key) {
            return Err(StorageError::Io(std::io::Error::other(format!(
                "disk error writing {key}"
            ))));
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for FaultyBackend {
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        self.inner.exists(key).await
    }

    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        self.inner.get(key).await
    }

    async fn get_stream(&self, key: &str) -> StorageResult<ByteStream> {
        self.inner.get_stream(key).await
    }

    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()> {
        self.check(key)?;
        self.inner.put(key, data).await
    }

    async fn put_if_not_exists(&self, key: &str, data: Bytes) -> StorageResult<bool> {
        self.check(key)?;
        self.inner.put_if_not_exists(key, data).await
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(StorageError::Io(std::io::Error::other(format!(
                "disk error deleting {key}"
            ))));
        }
        self.inner.delete(key).await
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        self.inner.list(prefix).await
    }

    fn backend_name(&self) -> &'static str {
        "faulty"
    }
}

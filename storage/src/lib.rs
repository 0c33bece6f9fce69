//! # Content storage
//!
//! Digest addressed manifests and blobs, the readers that load them from
//! their origins, and the [`Storage`] cache that registries read and write
//! them through.

use std::borrow::Cow;
use std::sync::Arc;

use bytes::Bytes;
use serde::Deserialize;

pub mod digest;
mod key;
mod layer;
pub mod media_type;
pub(crate) mod memory;
mod reader;
mod store;
pub mod zip;

#[doc(inline)]
pub use key::DigestKey;
#[doc(inline)]
pub use layer::ContainerLayer;
#[doc(inline)]
pub use memory::MemoryDriver;
#[doc(inline)]
pub use reader::{
    ContentReader, ContentReaderFactory, ContentStream, DataContentReader, DockerContentReader,
    GzipContentReader, HttpContentReader, PathContentReader, HTTP_SERVER_ERRORS,
};
#[doc(inline)]
pub use store::{DigestStore, DockerDigestStore, HttpDigestStore, LazyDigestStore, ZippedDigestStore};

#[doc(inline)]
pub use storage_driver::{Driver, StorageError, StorageErrorKind};

/// Shorten `value` to at most `max` characters, for logs and error messages.
pub fn truncate(value: &str, max: usize) -> Cow<'_, str> {
    match value.char_indices().nth(max) {
        Some((end, _)) => Cow::Owned(value[..end].to_owned()),
        None => Cow::Borrowed(value),
    }
}

/// Selects the map backing the [`Storage`] cache.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StorageConfig {
    /// A process-local concurrent map.
    #[default]
    Memory,
}

impl StorageConfig {
    /// Build the cache described by this configuration.
    #[tracing::instrument]
    pub async fn build(self) -> Result<Storage, StorageError> {
        let storage: Storage = match self {
            StorageConfig::Memory => MemoryDriver::<DigestStore>::new().into(),
        };
        Ok(storage)
    }
}

pub(crate) type ArcDriver = Arc<dyn Driver<DigestStore>>;

/// The manifest and blob cache, keyed by request path.
///
/// Every path holds at most one entry and the last write wins. Reads never
/// observe a partially written entry.
#[derive(Debug, Clone)]
pub struct Storage {
    driver: ArcDriver,
}

impl<D> From<D> for Storage
where
    D: Driver<DigestStore> + 'static,
{
    fn from(value: D) -> Self {
        Storage::new(value)
    }
}

impl Storage {
    /// Wrap a driver.
    pub fn new<D: Driver<DigestStore> + 'static>(driver: D) -> Self {
        Self {
            driver: Arc::new(driver),
        }
    }

    /// A cache backed by a fresh in-memory map.
    pub fn memory() -> Self {
        Storage::new(MemoryDriver::new())
    }

    /// The name of the backing driver.
    pub fn name(&self) -> &str {
        self.driver.name()
    }

    /// Look up the manifest cached at `path`.
    #[tracing::instrument(skip(self), fields(driver=self.driver.name()))]
    pub async fn get_manifest(&self, path: &str) -> Result<Option<DigestStore>, StorageError> {
        self.driver.get(path).await
    }

    /// Cache a manifest at `path`, compressed in memory.
    #[tracing::instrument(skip(self, manifest), fields(driver=self.driver.name()))]
    pub async fn save_manifest(
        &self,
        path: &str,
        manifest: impl AsRef<[u8]>,
        media_type: &str,
        digest: &str,
    ) -> Result<DigestStore, StorageError> {
        let manifest = manifest.as_ref();
        let store = ZippedDigestStore::from_uncompressed(
            manifest,
            media_type,
            digest,
            manifest.len() as u64,
        )?;
        self.put(path, store.into()).await
    }

    /// Cache an existing store as the manifest at `path`.
    #[tracing::instrument(skip(self, store), fields(driver=self.driver.name(), digest=store.digest()))]
    pub async fn save_manifest_store(
        &self,
        path: &str,
        store: DigestStore,
    ) -> Result<DigestStore, StorageError> {
        self.put(path, store).await
    }

    /// Look up the blob cached at `path`.
    #[tracing::instrument(skip(self), fields(driver=self.driver.name()))]
    pub async fn get_blob(&self, path: &str) -> Result<Option<DigestStore>, StorageError> {
        self.driver.get(path).await
    }

    /// Cache blob content at `path`, compressed in memory.
    #[tracing::instrument(skip(self, content), fields(driver=self.driver.name()))]
    pub async fn save_blob(
        &self,
        path: &str,
        content: impl Into<Bytes>,
        media_type: &str,
        digest: &str,
    ) -> Result<DigestStore, StorageError> {
        let content = content.into();
        let store =
            ZippedDigestStore::from_uncompressed(&content, media_type, digest, content.len() as u64)?;
        self.put(path, store.into()).await
    }

    /// Cache a blob at `path` that is read from `reader` whenever it is served.
    #[tracing::instrument(skip(self, reader), fields(driver=self.driver.name(), reader=%reader))]
    pub async fn save_blob_reader(
        &self,
        path: &str,
        reader: ContentReader,
        media_type: &str,
        digest: &str,
        size: u64,
    ) -> Result<DigestStore, StorageError> {
        let store = LazyDigestStore::new(reader, media_type, digest, size);
        self.put(path, store.into()).await
    }

    /// Cache a blob at `path` that clients fetch from an upstream registry.
    #[tracing::instrument(skip(self), fields(driver=self.driver.name()))]
    pub async fn save_blob_layer(
        &self,
        path: &str,
        location: &str,
        media_type: &str,
        digest: &str,
        size: u64,
    ) -> Result<DigestStore, StorageError> {
        let store = DockerDigestStore::new(location, media_type, digest, size);
        self.put(path, store.into()).await
    }

    /// Cache an existing store as the blob at `path`.
    #[tracing::instrument(skip(self, store), fields(driver=self.driver.name(), digest=store.digest()))]
    pub async fn save_blob_store(
        &self,
        path: &str,
        store: DigestStore,
    ) -> Result<DigestStore, StorageError> {
        self.put(path, store).await
    }

    /// Cached paths starting with `prefix`.
    pub async fn paths(&self, prefix: Option<&str>) -> Result<Vec<String>, StorageError> {
        self.driver.keys(prefix).await
    }

    async fn put(&self, path: &str, store: DigestStore) -> Result<DigestStore, StorageError> {
        tracing::trace!(%path, store=%store, "caching");
        self.driver.put(path, store.clone()).await?;
        Ok(store)
    }
}

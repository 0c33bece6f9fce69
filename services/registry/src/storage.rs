//! Storage layer for the registry

use bytes::Bytes;
use storage::digest::{is_sha256_digest, sha256_digest};
use storage::media_type::{
    DOCKER_MANIFEST_V1_JWS_TYPE, DOCKER_MANIFEST_V1_TYPE, is_index_media_type,
};
use storage::{ContainerLayer, ContentReaderFactory, DigestStore, Storage};

use crate::config::ConfigSpec;
use crate::container::{ContainerOrIndexSpec, ContainerSpec};
use crate::error::{RegistryError, RegistryResult};
use crate::index::IndexSpec;
use crate::json;
use crate::manifest::{ManifestSpec, validate_manifest_type};

/// Registry storage backend
#[derive(Clone, Debug)]
pub struct RegistryStorage {
    storage: Storage,
    readers: ContentReaderFactory,
}

/// Get the path for a manifest
pub fn manifest_path(repository: &str, reference: &str) -> String {
    format!("/v2/{repository}/manifests/{reference}")
}

/// Get the path for a blob
pub fn blob_path(repository: &str, digest: &str) -> String {
    format!("/v2/{repository}/blobs/{digest}")
}

/// Validate repository name
fn validate_repository(name: &str) -> RegistryResult<()> {
    if name.is_empty() || name.contains("..") || name.starts_with('/') {
        return Err(RegistryError::InvalidRepository(name.to_string()));
    }
    Ok(())
}

fn validate_digest(digest: &str) -> RegistryResult<()> {
    if is_sha256_digest(digest) {
        Ok(())
    } else {
        Err(RegistryError::InvalidDigest(digest.to_string()))
    }
}

impl RegistryStorage {
    /// Create a new registry storage
    pub fn new(storage: Storage, readers: ContentReaderFactory) -> Self {
        Self { storage, readers }
    }

    /// The underlying cache.
    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// Get a manifest by tag or digest
    #[tracing::instrument(skip(self))]
    pub async fn get_manifest(
        &self,
        repository: &str,
        reference: &str,
    ) -> RegistryResult<DigestStore> {
        validate_repository(repository)?;

        self.storage
            .get_manifest(&manifest_path(repository, reference))
            .await?
            .ok_or_else(|| RegistryError::ManifestNotFound(format!("{repository}:{reference}")))
    }

    /// Put a manifest, returning its digest.
    ///
    /// The manifest is cached under its digest and, when `reference` is a
    /// tag, under the tag as well.
    #[tracing::instrument(skip(self, data), fields(size = data.len()))]
    pub async fn put_manifest(
        &self,
        repository: &str,
        reference: &str,
        media_type: &str,
        data: Bytes,
    ) -> RegistryResult<String> {
        validate_repository(repository)?;
        validate_manifest_type(media_type)?;

        let digest = sha256_digest(&data);
        if reference.starts_with("sha256:") && reference != digest {
            return Err(RegistryError::DigestMismatch {
                expected: reference.to_string(),
                actual: digest,
            });
        }

        let store = self
            .storage
            .save_manifest(&manifest_path(repository, &digest), &data, media_type, &digest)
            .await?;

        if reference != digest {
            self.storage
                .save_manifest_store(&manifest_path(repository, reference), store)
                .await?;
        }

        Ok(digest)
    }

    /// Get a blob
    #[tracing::instrument(skip(self))]
    pub async fn get_blob(&self, repository: &str, digest: &str) -> RegistryResult<DigestStore> {
        validate_repository(repository)?;

        self.storage
            .get_blob(&blob_path(repository, digest))
            .await?
            .ok_or_else(|| RegistryError::BlobNotFound(digest.to_string()))
    }

    /// Store a blob with verification
    #[tracing::instrument(skip(self, data), fields(size = data.len()))]
    pub async fn put_blob(
        &self,
        repository: &str,
        digest: &str,
        media_type: &str,
        data: Bytes,
    ) -> RegistryResult<DigestStore> {
        validate_repository(repository)?;
        validate_digest(digest)?;

        let computed = sha256_digest(&data);
        if computed != digest {
            return Err(RegistryError::DigestMismatch {
                expected: digest.to_string(),
                actual: computed,
            });
        }

        let store = self
            .storage
            .save_blob(&blob_path(repository, digest), data, media_type, digest)
            .await?;
        Ok(store)
    }

    /// Cache a layer supplied with a container request under its gzip digest.
    #[tracing::instrument(skip(self, layer), fields(layer = %layer))]
    pub async fn put_layer(
        &self,
        repository: &str,
        layer: &ContainerLayer,
    ) -> RegistryResult<DigestStore> {
        validate_repository(repository)?;
        layer.validate()?;

        let store = DigestStore::from_layer(layer)?;
        let path = blob_path(repository, store.digest());
        Ok(self.storage.save_blob_store(&path, store).await?)
    }

    /// Return the cached blob, or cache one that is read from `location`
    /// whenever it is served.
    #[tracing::instrument(skip(self))]
    pub async fn fetch_blob(
        &self,
        repository: &str,
        digest: &str,
        location: &str,
        media_type: &str,
        size: u64,
    ) -> RegistryResult<DigestStore> {
        validate_repository(repository)?;
        validate_digest(digest)?;

        let path = blob_path(repository, digest);
        if let Some(store) = self.storage.get_blob(&path).await? {
            tracing::trace!(%path, "blob cache hit");
            return Ok(store);
        }

        tracing::trace!(%path, "blob cache miss");
        let reader = self.readers.of(location)?;
        Ok(self
            .storage
            .save_blob_reader(&path, reader, media_type, digest, size)
            .await?)
    }

    /// Describe the image or index cached for `repository:reference`.
    ///
    /// Schema 1 manifests carry their configuration inline; schema 2 and OCI
    /// manifests reference a configuration blob, which must be cached too.
    #[tracing::instrument(skip(self))]
    pub async fn inspect(
        &self,
        registry: &str,
        host_name: &str,
        repository: &str,
        reference: &str,
    ) -> RegistryResult<ContainerOrIndexSpec> {
        let store = self.get_manifest(repository, reference).await?;
        let bytes = store.get_bytes().await?;
        let body = String::from_utf8_lossy(&bytes);

        if is_index_media_type(store.media_type()) {
            let index = IndexSpec::parse(&body)?.with_digest(store.digest());
            return Ok(index.into());
        }

        let document = json::parse_object(&body)?;
        let is_v1 = matches!(
            store.media_type(),
            DOCKER_MANIFEST_V1_TYPE | DOCKER_MANIFEST_V1_JWS_TYPE
        ) || json::as_integer(document.get("schemaVersion")) == Some(1);

        let (manifest, config) = if is_v1 {
            (
                ManifestSpec::parse_v1_map(&document)?,
                ConfigSpec::parse_v1_map(&document)?,
            )
        } else {
            let manifest = ManifestSpec::from_map(&document);
            let config_digest = manifest
                .config
                .as_ref()
                .and_then(|config| config.digest.as_deref())
                .ok_or_else(|| {
                    RegistryError::InvalidManifest(format!(
                        "missing config digest in manifest {}",
                        store.digest()
                    ))
                })?;
            let config = self.get_blob(repository, config_digest).await?;
            let config = ConfigSpec::parse(&String::from_utf8_lossy(&config.get_bytes().await?))?;
            (manifest, config)
        };

        Ok(ContainerSpec {
            registry: registry.to_string(),
            host_name: host_name.to_string(),
            image_name: repository.to_string(),
            reference: reference.to_string(),
            digest: store.digest().to_string(),
            config,
            manifest,
        }
        .into())
    }
}

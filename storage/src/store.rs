//! Cached manifests and blobs, addressed by digest.
//!
//! A [`DigestStore`] carries the media type, digest and size of some content
//! plus whatever is needed to produce its bytes. Only [`DigestStore::Zipped`]
//! holds the content in memory, and it holds it compressed.

use std::fmt;
use std::io::Cursor;

use base64::prelude::{Engine as _, BASE64_STANDARD};
use bytes::Bytes;
use storage_driver::{StorageError, StorageErrorKind};

use crate::layer::ContainerLayer;
use crate::media_type::DOCKER_IMAGE_TAR_GZIP;
use crate::reader::{ContentReader, ContentStream, PathContentReader};
use crate::{truncate, zip};

/// Content known to the cache.
#[derive(Debug, Clone)]
pub enum DigestStore {
    /// A blob served from an upstream registry.
    Docker(DockerDigestStore),

    /// A blob served from an HTTP(S) origin.
    Http(HttpDigestStore),

    /// Content read from its origin each time it is requested.
    Lazy(LazyDigestStore),

    /// Content held compressed in memory.
    Zipped(ZippedDigestStore),
}

impl DigestStore {
    /// Produce the uncompressed content.
    ///
    /// Pass-through stores never hold content and return an unsupported
    /// operation error.
    pub async fn get_bytes(&self) -> Result<Bytes, StorageError> {
        match self {
            DigestStore::Docker(_) => Err(StorageError::unsupported(
                "docker-store",
                "DockerDigestStore does not allow 'getBytes' operation",
            )),
            DigestStore::Http(_) => Err(StorageError::unsupported(
                "http-store",
                "HttpDigestStore does not support 'getBytes' operation",
            )),
            DigestStore::Lazy(store) => store.get_bytes().await,
            DigestStore::Zipped(store) => store.get_bytes(),
        }
    }

    /// Open the content as a stream.
    pub async fn open_stream(&self) -> Result<ContentStream, StorageError> {
        match self {
            DigestStore::Lazy(store) => store.reader.open_stream().await.map_err(|err| store.wrap(err)),
            _ => {
                let bytes = self.get_bytes().await?;
                Ok(Box::new(Cursor::new(bytes)))
            }
        }
    }

    /// The media type of the content.
    pub fn media_type(&self) -> &str {
        match self {
            DigestStore::Docker(store) => &store.media_type,
            DigestStore::Http(store) => &store.media_type,
            DigestStore::Lazy(store) => &store.media_type,
            DigestStore::Zipped(store) => &store.media_type,
        }
    }

    /// The digest of the content.
    pub fn digest(&self) -> &str {
        match self {
            DigestStore::Docker(store) => &store.digest,
            DigestStore::Http(store) => &store.digest,
            DigestStore::Lazy(store) => &store.digest,
            DigestStore::Zipped(store) => &store.digest,
        }
    }

    /// The size of the content in bytes, as advertised to clients.
    pub fn size(&self) -> u64 {
        match self {
            DigestStore::Docker(store) => store.size,
            DigestStore::Http(store) => store.size,
            DigestStore::Lazy(store) => store.size,
            DigestStore::Zipped(store) => store.size,
        }
    }

    /// The origin clients should be sent to, for pass-through stores.
    pub fn location(&self) -> Option<&str> {
        match self {
            DigestStore::Docker(store) => Some(&store.location),
            DigestStore::Http(store) => Some(&store.location),
            _ => None,
        }
    }

    /// Whether the content lives in an upstream registry.
    pub fn is_docker_layer(&self) -> bool {
        self.location()
            .is_some_and(|location| location.starts_with("docker://"))
    }

    /// Build the store for a layer, choosing the variant from the scheme of
    /// its location.
    ///
    /// The media type is always [`DOCKER_IMAGE_TAR_GZIP`]. Inline `data:` and
    /// `gzip:` payloads are decoded here, remote locations are only recorded.
    pub fn from_layer(layer: &ContainerLayer) -> Result<Self, StorageError> {
        const ENGINE: &str = "digest-store-factory";

        let location = layer
            .location
            .as_deref()
            .ok_or_else(|| StorageError::invalid_argument(ENGINE, "Missing 'layer.location' argument"))?;
        let media_type = DOCKER_IMAGE_TAR_GZIP;
        let digest = layer.gzip_digest.clone().unwrap_or_default();
        let size = layer.gzip_size.unwrap_or_default();

        if location.starts_with("docker://") {
            return Ok(DockerDigestStore::new(location, media_type, digest, size).into());
        }
        if location.starts_with("http://") || location.starts_with("https://") {
            return Ok(HttpDigestStore::new(location, media_type, digest, size).into());
        }
        if let Some(data) = location.strip_prefix("data:") {
            let data = decode_base64(ENGINE, data)?;
            return Ok(ZippedDigestStore::from_uncompressed(&data, media_type, digest, size)?.into());
        }
        if let Some(data) = location.strip_prefix("gzip:") {
            let data = decode_base64(ENGINE, data)?;
            return Ok(ZippedDigestStore::from_compressed(data, media_type, digest, size).into());
        }
        if location.starts_with('/') {
            let reader = ContentReader::Path(PathContentReader::new(location));
            return Ok(LazyDigestStore::new(reader, media_type, digest, size).into());
        }

        Err(StorageError::invalid_argument(
            ENGINE,
            format!("Unsupported location type: {}", truncate(location, 100)),
        ))
    }
}

impl TryFrom<&ContainerLayer> for DigestStore {
    type Error = StorageError;

    fn try_from(layer: &ContainerLayer) -> Result<Self, Self::Error> {
        DigestStore::from_layer(layer)
    }
}

fn decode_base64(engine: &'static str, data: &str) -> Result<Vec<u8>, StorageError> {
    BASE64_STANDARD
        .decode(data)
        .map_err(StorageError::with(engine, StorageErrorKind::Decode))
}

/// Log-safe description, never including content bytes.
impl fmt::Display for DigestStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DigestStore::Docker(store) => write!(
                f,
                "DockerDigestStore(digest={}; size={}; mediaType={}; location={})",
                store.digest, store.size, store.media_type, store.location
            ),
            DigestStore::Http(store) => write!(
                f,
                "HttpDigestStore(digest={}; size={}; mediaType={}; location={})",
                store.digest, store.size, store.media_type, store.location
            ),
            DigestStore::Lazy(store) => write!(
                f,
                "LazyDigestStore(digest={}; size={}; mediaType={}; reader={})",
                store.digest, store.size, store.media_type, store.reader
            ),
            DigestStore::Zipped(store) => write!(
                f,
                "ZippedDigestStore(digest={}; size={}; mediaType={}; bytes=<omitted>)",
                store.digest, store.size, store.media_type
            ),
        }
    }
}

macro_rules! into_digest_store {
    ($($variant:ident($store:ty)),*) => {
        $(
            impl From<$store> for DigestStore {
                fn from(value: $store) -> Self {
                    DigestStore::$variant(value)
                }
            }
        )*
    };
}

into_digest_store!(
    Docker(DockerDigestStore),
    Http(HttpDigestStore),
    Lazy(LazyDigestStore),
    Zipped(ZippedDigestStore)
);

/// Metadata for a blob held by an upstream registry.
#[derive(Debug, Clone)]
pub struct DockerDigestStore {
    location: String,
    media_type: String,
    digest: String,
    size: u64,
}

impl DockerDigestStore {
    /// Record a `docker://` location.
    pub fn new(
        location: impl Into<String>,
        media_type: impl Into<String>,
        digest: impl Into<String>,
        size: u64,
    ) -> Self {
        Self {
            location: location.into(),
            media_type: media_type.into(),
            digest: digest.into(),
            size,
        }
    }
}

/// Metadata for a blob held by an HTTP(S) origin.
#[derive(Debug, Clone)]
pub struct HttpDigestStore {
    location: String,
    media_type: String,
    digest: String,
    size: u64,
}

impl HttpDigestStore {
    /// Record an `http://` or `https://` location.
    pub fn new(
        location: impl Into<String>,
        media_type: impl Into<String>,
        digest: impl Into<String>,
        size: u64,
    ) -> Self {
        Self {
            location: location.into(),
            media_type: media_type.into(),
            digest: digest.into(),
            size,
        }
    }
}

/// Content produced by a [`ContentReader`] whenever it is requested.
#[derive(Debug, Clone)]
pub struct LazyDigestStore {
    reader: ContentReader,
    media_type: String,
    digest: String,
    size: u64,
}

impl LazyDigestStore {
    /// Defer to `reader` for the content.
    pub fn new(
        reader: ContentReader,
        media_type: impl Into<String>,
        digest: impl Into<String>,
        size: u64,
    ) -> Self {
        Self {
            reader,
            media_type: media_type.into(),
            digest: digest.into(),
            size,
        }
    }

    /// The reader producing the content.
    pub fn reader(&self) -> &ContentReader {
        &self.reader
    }

    async fn get_bytes(&self) -> Result<Bytes, StorageError> {
        self.reader.read_all_bytes().await.map_err(|err| self.wrap(err))
    }

    fn wrap(&self, err: StorageError) -> StorageError {
        let kind = err.kind();
        StorageError::builder("lazy-store", kind, err)
            .context(format!("Unable to load digest content at path: {}", self.reader))
            .build()
    }
}

/// Content held compressed in memory.
#[derive(Clone)]
pub struct ZippedDigestStore {
    bytes: Bytes,
    media_type: String,
    digest: String,
    size: u64,
}

impl ZippedDigestStore {
    /// Hold already compressed `data`.
    pub fn from_compressed(
        data: impl Into<Bytes>,
        media_type: impl Into<String>,
        digest: impl Into<String>,
        size: u64,
    ) -> Self {
        Self {
            bytes: data.into(),
            media_type: media_type.into(),
            digest: digest.into(),
            size,
        }
    }

    /// Compress `data` and hold it.
    pub fn from_uncompressed(
        data: &[u8],
        media_type: impl Into<String>,
        digest: impl Into<String>,
        size: u64,
    ) -> Result<Self, StorageError> {
        Ok(Self::from_compressed(
            zip::compress(data)?,
            media_type,
            digest,
            size,
        ))
    }

    /// The compressed payload.
    pub fn compressed(&self) -> &Bytes {
        &self.bytes
    }

    fn get_bytes(&self) -> Result<Bytes, StorageError> {
        zip::decompress(&self.bytes)
    }
}

impl fmt::Debug for ZippedDigestStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ZippedDigestStore")
            .field("media_type", &self.media_type)
            .field("digest", &self.digest)
            .field("size", &self.size)
            .field("compressed", &self.bytes.len())
            .finish()
    }
}

//! Layers appended to a container image by the proxy.

use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use storage_driver::StorageError;

const ENGINE: &str = "container-layer";
const DATA_PREFIX: &str = "data:";

/// A layer supplied with a build or augmentation request.
///
/// The `location` uses the same schemes as [`ContentReaderFactory`](crate::ContentReaderFactory).
/// Equality and hashing ignore `skip_hashing`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerLayer {
    /// Where the gzipped layer tarball lives.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,

    /// Digest of the gzipped tarball.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gzip_digest: Option<String>,

    /// Size of the gzipped tarball in bytes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gzip_size: Option<u64>,

    /// Digest of the uncompressed tarball.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tar_digest: Option<String>,

    /// Leave this layer out of the config fingerprint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_hashing: Option<bool>,
}

fn is_missing(value: Option<&str>) -> bool {
    value.is_none_or(str::is_empty)
}

impl ContainerLayer {
    /// Create a layer with every required field set.
    pub fn new(
        location: impl Into<String>,
        gzip_digest: impl Into<String>,
        gzip_size: u64,
        tar_digest: impl Into<String>,
    ) -> Self {
        Self {
            location: Some(location.into()),
            gzip_digest: Some(gzip_digest.into()),
            gzip_size: Some(gzip_size),
            tar_digest: Some(tar_digest.into()),
            skip_hashing: None,
        }
    }

    /// Check that every field is present and that digests are `sha256:` digests.
    pub fn validate(&self) -> Result<(), StorageError> {
        if is_missing(self.location.as_deref()) {
            return Err(StorageError::invalid_argument(ENGINE, "Missing layer location"));
        }
        if is_missing(self.gzip_digest.as_deref()) {
            return Err(StorageError::invalid_argument(ENGINE, "Missing layer gzip digest"));
        }
        if self.gzip_size.is_none() {
            return Err(StorageError::invalid_argument(ENGINE, "Missing layer gzip size"));
        }
        if is_missing(self.tar_digest.as_deref()) {
            return Err(StorageError::invalid_argument(ENGINE, "Missing layer tar digest"));
        }

        let gzip_digest = self.gzip_digest.as_deref().unwrap_or_default();
        if !gzip_digest.starts_with("sha256:") {
            return Err(StorageError::invalid_argument(
                ENGINE,
                format!("Missing layer gzip digest should start with the 'sha256:' prefix -- offending value: {gzip_digest}"),
            ));
        }
        let tar_digest = self.tar_digest.as_deref().unwrap_or_default();
        if !tar_digest.starts_with("sha256:") {
            return Err(StorageError::invalid_argument(
                ENGINE,
                format!("Missing layer tar digest should start with the 'sha256:' prefix -- offending value: {tar_digest}"),
            ));
        }
        Ok(())
    }

    /// A copy with any inline `data:` payload replaced by a placeholder.
    pub fn stripped(&self) -> Self {
        let location = match self.location.as_deref() {
            Some(location) if location.starts_with(DATA_PREFIX) => {
                Some("data:DATA+OMITTED".to_owned())
            }
            _ => self.location.clone(),
        };

        Self {
            location,
            skip_hashing: None,
            ..self.clone()
        }
    }

    fn display_location(&self) -> String {
        match self.location.as_deref() {
            None => "null".to_owned(),
            Some(location) if location.starts_with(DATA_PREFIX) && location.len() > 25 => {
                format!("{}...", crate::truncate(location, 25))
            }
            Some(location) => location.to_owned(),
        }
    }
}

impl fmt::Display for ContainerLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ContainerLayer[location={}; tarDigest={}; gzipDigest={}; gzipSize={}]",
            self.display_location(),
            self.tar_digest.as_deref().unwrap_or("null"),
            self.gzip_digest.as_deref().unwrap_or("null"),
            self.gzip_size
                .map_or_else(|| "null".to_owned(), |size| size.to_string()),
        )
    }
}

impl PartialEq for ContainerLayer {
    fn eq(&self, other: &Self) -> bool {
        self.location == other.location
            && self.gzip_digest == other.gzip_digest
            && self.gzip_size == other.gzip_size
            && self.tar_digest == other.tar_digest
    }
}

impl Eq for ContainerLayer {}

impl Hash for ContainerLayer {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.location.hash(state);
        self.gzip_digest.hash(state);
        self.gzip_size.hash(state);
        self.tar_digest.hash(state);
    }
}

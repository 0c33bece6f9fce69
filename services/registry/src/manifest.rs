//! Image manifests and the media types they are served with.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use storage::media_type::{
    DOCKER_IMAGE_INDEX_V2, DOCKER_MANIFEST_V1_JWS_TYPE, DOCKER_MANIFEST_V1_TYPE,
    DOCKER_MANIFEST_V2_TYPE, OCI_IMAGE_INDEX_V1, OCI_IMAGE_MANIFEST_V1, is_manifest_media_type,
};

use crate::error::{RegistryError, RegistryResult};
use crate::json::{self, JsonObject};

/// A content descriptor: a reference to a blob by media type, digest and size.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectRef {
    /// Media type of the referenced content.
    pub media_type: Option<String>,

    /// Digest of the referenced content.
    pub digest: Option<String>,

    /// Size of the referenced content in bytes.
    pub size: Option<i64>,

    /// Arbitrary metadata.
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

impl ObjectRef {
    /// A descriptor for `digest` with nothing else known.
    pub fn from_digest(digest: impl Into<String>) -> Self {
        Self {
            digest: Some(digest.into()),
            ..Default::default()
        }
    }

    /// Read a decoded descriptor.
    pub fn from_map(object: &JsonObject) -> Self {
        Self {
            media_type: json::string(object, "mediaType"),
            digest: json::string(object, "digest"),
            size: json::as_long(object.get("size")),
            annotations: json::string_map(object, "annotations"),
        }
    }

    /// Parse a descriptor document.
    pub fn of(json: &str) -> RegistryResult<Self> {
        Ok(Self::from_map(&json::parse_object(json)?))
    }

    /// Read every descriptor listed under `key`.
    pub fn list(object: &JsonObject, key: &str) -> Vec<Self> {
        json::objects(object, key).map(Self::from_map).collect()
    }
}

/// An image manifest, normalized across Docker schema 1, schema 2 and OCI.
///
/// Layers are always listed base first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestSpec {
    /// The manifest schema version.
    pub schema_version: Option<i32>,

    /// The manifest media type, when the document declares one.
    pub media_type: Option<String>,

    /// The image configuration blob. Schema 1 manifests embed their
    /// configuration and have none.
    pub config: Option<ObjectRef>,

    /// The layer blobs, base first.
    #[serde(default)]
    pub layers: Vec<ObjectRef>,

    /// Arbitrary metadata.
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

impl ManifestSpec {
    /// Parse a schema 2 or OCI manifest.
    pub fn of(json: &str) -> RegistryResult<Self> {
        Ok(Self::from_map(&json::parse_object(json)?))
    }

    /// Read a decoded schema 2 or OCI manifest.
    pub fn from_map(object: &JsonObject) -> Self {
        Self {
            schema_version: json::as_integer(object.get("schemaVersion")),
            media_type: json::string(object, "mediaType"),
            config: json::object(object, "config").map(ObjectRef::from_map),
            layers: ObjectRef::list(object, "layers"),
            annotations: json::string_map(object, "annotations"),
        }
    }

    /// Parse a Docker schema 1 manifest.
    pub fn parse_v1(json: &str) -> RegistryResult<Self> {
        Self::parse_v1_map(&json::parse_object(json)?)
    }

    /// Read a decoded Docker schema 1 manifest.
    ///
    /// Schema 1 lists `fsLayers` topmost first, so the order is reversed.
    /// A manifest without `history` cannot describe an image and is rejected.
    pub fn parse_v1_map(object: &JsonObject) -> RegistryResult<Self> {
        if json::first(object, "history").is_none() {
            return Err(RegistryError::InvalidManifest(
                "Invalid Docker v1 manifest".into(),
            ));
        }

        let mut layers: Vec<ObjectRef> = json::objects(object, "fsLayers")
            .filter_map(|layer| json::string(layer, "blobSum"))
            .map(ObjectRef::from_digest)
            .collect();
        layers.reverse();

        Ok(Self {
            schema_version: Some(1),
            media_type: Some(DOCKER_MANIFEST_V1_JWS_TYPE.to_owned()),
            config: None,
            layers,
            annotations: BTreeMap::new(),
        })
    }

    /// Whether this is a Docker schema 1 manifest.
    pub fn is_v1(&self) -> bool {
        self.schema_version == Some(1)
    }

    /// Whether this is a schema 2 manifest, Docker or OCI.
    pub fn is_v2(&self) -> bool {
        self.schema_version == Some(2)
    }

    /// Whether this is an OCI manifest.
    pub fn is_oci(&self) -> bool {
        self.media_type.as_deref() == Some(OCI_IMAGE_MANIFEST_V1)
    }
}

/// Detect the media type of a manifest from its content.
pub fn detect_media_type(data: &[u8]) -> &'static str {
    let Ok(json) = serde_json::from_slice::<serde_json::Value>(data) else {
        return OCI_IMAGE_MANIFEST_V1;
    };

    if let Some(media_type) = json.get("mediaType").and_then(|v| v.as_str()) {
        if let Some(known) = storage::media_type::MANIFEST_MEDIA_TYPES
            .iter()
            .copied()
            .find(|known| *known == media_type)
        {
            return known;
        }
    }

    match json.get("schemaVersion").and_then(|v| v.as_u64()) {
        Some(1) if json.get("signatures").is_some() => DOCKER_MANIFEST_V1_JWS_TYPE,
        Some(1) => DOCKER_MANIFEST_V1_TYPE,
        Some(2) if json.get("manifests").is_some() => {
            if json.get("mediaType").is_none() {
                OCI_IMAGE_INDEX_V1
            } else {
                DOCKER_IMAGE_INDEX_V2
            }
        }
        Some(2) if json.get("config").and_then(|c| c.get("mediaType")).and_then(|m| m.as_str())
            == Some(storage::media_type::DOCKER_IMAGE_CONFIG_V1) =>
        {
            DOCKER_MANIFEST_V2_TYPE
        }
        _ => OCI_IMAGE_MANIFEST_V1,
    }
}

/// Check that `content_type` is an accepted manifest media type.
pub fn validate_manifest_type(content_type: &str) -> RegistryResult<()> {
    if is_manifest_media_type(content_type) {
        Ok(())
    } else {
        Err(RegistryError::UnsupportedManifestType(
            content_type.to_string(),
        ))
    }
}

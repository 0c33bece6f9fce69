//! Multi-platform image indexes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::RegistryResult;
use crate::json::{self, JsonObject};

/// The platform an indexed manifest was built for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlatformSpec {
    /// CPU architecture, e.g. `amd64`.
    pub architecture: Option<String>,

    /// Operating system, e.g. `linux`.
    pub os: Option<String>,

    /// CPU variant, e.g. `v8`.
    pub variant: Option<String>,

    /// Operating system version, set for Windows images.
    #[serde(rename = "os.version", skip_serializing_if = "Option::is_none", default)]
    pub os_version: Option<String>,
}

impl PlatformSpec {
    /// A platform without variant.
    pub fn new(architecture: impl Into<String>, os: impl Into<String>) -> Self {
        Self {
            architecture: Some(architecture.into()),
            os: Some(os.into()),
            ..Default::default()
        }
    }

    /// Set the CPU variant.
    pub fn with_variant(mut self, variant: impl Into<String>) -> Self {
        self.variant = Some(variant.into());
        self
    }

    fn from_map(object: &JsonObject) -> Self {
        Self {
            architecture: json::string(object, "architecture"),
            os: json::string(object, "os"),
            variant: json::string(object, "variant"),
            os_version: json::string(object, "os.version"),
        }
    }
}

/// A manifest listed in an index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestRef {
    /// Media type of the manifest.
    pub media_type: Option<String>,

    /// Digest of the manifest.
    pub digest: Option<String>,

    /// Size of the manifest in bytes.
    pub size: Option<i64>,

    /// Arbitrary metadata.
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,

    /// The platform the manifest targets, absent for attestations and the like.
    pub platform: Option<PlatformSpec>,
}

impl ManifestRef {
    fn from_map(object: &JsonObject) -> Self {
        Self {
            media_type: json::string(object, "mediaType"),
            digest: json::string(object, "digest"),
            size: json::as_long(object.get("size")),
            annotations: json::string_map(object, "annotations"),
            platform: json::object(object, "platform").map(PlatformSpec::from_map),
        }
    }
}

/// A Docker manifest list or OCI image index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexSpec {
    /// The schema version, always 2 in practice.
    pub schema_version: Option<i32>,

    /// The index media type, optional for OCI indexes.
    pub media_type: Option<String>,

    /// The per-platform manifests.
    #[serde(default)]
    pub manifests: Vec<ManifestRef>,

    /// The digest of the index document itself.
    pub digest: Option<String>,
}

impl IndexSpec {
    /// Parse an index document.
    pub fn parse(json: &str) -> RegistryResult<Self> {
        Ok(Self::from_map(&json::parse_object(json)?))
    }

    /// Read a decoded index document.
    pub fn from_map(object: &JsonObject) -> Self {
        Self {
            schema_version: json::as_integer(object.get("schemaVersion")),
            media_type: json::string(object, "mediaType"),
            manifests: json::objects(object, "manifests")
                .map(ManifestRef::from_map)
                .collect(),
            digest: None,
        }
    }

    /// Record the digest of the index document.
    pub fn with_digest(mut self, digest: impl Into<String>) -> Self {
        self.digest = Some(digest.into());
        self
    }

    /// The first manifest built for `platform`. A platform without variant
    /// matches any variant.
    pub fn manifest_for(&self, platform: &PlatformSpec) -> Option<&ManifestRef> {
        self.manifests.iter().find(|manifest| {
            manifest.platform.as_ref().is_some_and(|candidate| {
                candidate.architecture == platform.architecture
                    && candidate.os == platform.os
                    && (platform.variant.is_none() || candidate.variant == platform.variant)
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;

    const INDEX: &str = indoc! {r#"
        {
          "schemaVersion": 2,
          "mediaType": "application/vnd.oci.image.index.v1+json",
          "manifests": [
            {
              "mediaType": "application/vnd.oci.image.manifest.v1+json",
              "digest": "sha256:f54a58bc1aac5ea1a25d796ae155dc228b3f0e11d046ae276b39c4bf2f13d8c4",
              "size": 525,
              "platform": {"architecture": "amd64", "os": "linux"}
            },
            {
              "mediaType": "application/vnd.oci.image.manifest.v1+json",
              "digest": "sha256:01433e86a06b752f228e3c17394169a5e21a0995f153268a9b36a16d4f2b2184",
              "size": 525.0,
              "platform": {"architecture": "arm64", "os": "linux", "variant": "v8"}
            },
            {
              "mediaType": "application/vnd.oci.image.manifest.v1+json",
              "digest": "sha256:5b0d7e1e9a07b1c6d4a2a9a1cd9cb0f1b1c0d8bbf29a3a1f6f3a3e2c9a8f7e6d",
              "size": 840,
              "annotations": {"vnd.docker.reference.type": "attestation-manifest"}
            }
          ]
        }
    "#};

    #[test]
    fn parse_index() {
        let index = IndexSpec::parse(INDEX).unwrap();

        assert_eq!(index.schema_version, Some(2));
        assert_eq!(
            index.media_type.as_deref(),
            Some(storage::media_type::OCI_IMAGE_INDEX_V1)
        );
        assert_eq!(index.manifests.len(), 3);
        assert_eq!(index.manifests[1].size, Some(525));
        assert_eq!(
            index.manifests[1].platform,
            Some(PlatformSpec::new("arm64", "linux").with_variant("v8"))
        );
        assert_eq!(index.manifests[2].platform, None);
        assert_eq!(index.manifests[2].annotations.len(), 1);
        assert_eq!(index.digest, None);
    }

    #[test]
    fn digest_is_recorded() {
        let index = IndexSpec::parse(INDEX).unwrap().with_digest("sha256:abc");
        assert_eq!(index.digest.as_deref(), Some("sha256:abc"));
    }

    #[test]
    fn select_platform() {
        let index = IndexSpec::parse(INDEX).unwrap();

        let arm = index.manifest_for(&PlatformSpec::new("arm64", "linux")).unwrap();
        assert_eq!(arm.size, Some(525));
        assert!(arm.digest.as_deref().unwrap().starts_with("sha256:0143"));

        assert!(index
            .manifest_for(&PlatformSpec::new("arm64", "linux").with_variant("v7"))
            .is_none());
        assert!(index.manifest_for(&PlatformSpec::new("s390x", "linux")).is_none());
    }

    #[test]
    fn empty_index() {
        let index = IndexSpec::parse("{}").unwrap();
        assert!(index.manifests.is_empty());
        assert_eq!(index.schema_version, None);
    }
}

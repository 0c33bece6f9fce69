//! Inspection results for container images.

use serde::{Deserialize, Serialize};

use crate::config::ConfigSpec;
use crate::index::IndexSpec;
use crate::manifest::ManifestSpec;

/// A single-platform image: where it lives, its manifest and configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerSpec {
    /// Registry name, e.g. `docker.io`.
    pub registry: String,

    /// Registry endpoint the image was read from.
    pub host_name: String,

    /// Repository name, e.g. `library/ubuntu`.
    pub image_name: String,

    /// Tag or digest the image was requested by.
    pub reference: String,

    /// Digest of the manifest.
    pub digest: String,

    /// Image configuration.
    pub config: ConfigSpec,

    /// Image manifest.
    pub manifest: ManifestSpec,
}

impl ContainerSpec {
    /// Whether the manifest is Docker schema 1.
    pub fn is_v1(&self) -> bool {
        self.manifest.is_v1()
    }

    /// Whether the manifest is schema 2.
    pub fn is_v2(&self) -> bool {
        self.manifest.is_v2()
    }

    /// Whether the manifest is an OCI manifest.
    pub fn is_oci(&self) -> bool {
        self.manifest.is_oci()
    }
}

/// What a reference resolved to: one image or a multi-platform index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ContainerOrIndexSpec {
    /// A single-platform image.
    Container(ContainerSpec),

    /// A multi-platform index.
    Index(IndexSpec),
}

impl ContainerOrIndexSpec {
    /// The image, when the reference resolved to one.
    pub fn container(&self) -> Option<&ContainerSpec> {
        match self {
            ContainerOrIndexSpec::Container(container) => Some(container),
            ContainerOrIndexSpec::Index(_) => None,
        }
    }

    /// The index, when the reference resolved to one.
    pub fn index(&self) -> Option<&IndexSpec> {
        match self {
            ContainerOrIndexSpec::Index(index) => Some(index),
            ContainerOrIndexSpec::Container(_) => None,
        }
    }
}

impl From<ContainerSpec> for ContainerOrIndexSpec {
    fn from(value: ContainerSpec) -> Self {
        ContainerOrIndexSpec::Container(value)
    }
}

impl From<IndexSpec> for ContainerOrIndexSpec {
    fn from(value: IndexSpec) -> Self {
        ContainerOrIndexSpec::Index(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_under_variant_key() {
        let spec: ContainerOrIndexSpec = IndexSpec::default().with_digest("sha256:abc").into();
        let value = serde_json::to_value(&spec).unwrap();

        assert_eq!(value["index"]["digest"], "sha256:abc");
        assert!(spec.container().is_none());
        assert!(spec.index().is_some());
    }

    #[test]
    fn schema_checks_follow_manifest() {
        let spec = ContainerSpec {
            registry: "docker.io".into(),
            host_name: "https://registry-1.docker.io".into(),
            image_name: "library/busybox".into(),
            reference: "latest".into(),
            digest: "sha256:abc".into(),
            config: ConfigSpec::default(),
            manifest: ManifestSpec {
                schema_version: Some(2),
                media_type: Some(storage::media_type::OCI_IMAGE_MANIFEST_V1.into()),
                ..Default::default()
            },
        };

        assert!(spec.is_v2());
        assert!(spec.is_oci());
        assert!(!spec.is_v1());
    }
}

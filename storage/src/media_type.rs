//! Media types of the container image formats handled by the proxy.

/// Docker manifest list (multi-platform index).
pub const DOCKER_IMAGE_INDEX_V2: &str = "application/vnd.docker.distribution.manifest.list.v2+json";

/// Gzip-compressed Docker layer tarball.
pub const DOCKER_IMAGE_TAR_GZIP: &str = "application/vnd.docker.image.rootfs.diff.tar.gzip";

/// Docker image configuration.
pub const DOCKER_IMAGE_CONFIG_V1: &str = "application/vnd.docker.container.image.v1+json";

/// Unsigned Docker schema 1 manifest.
pub const DOCKER_MANIFEST_V1_TYPE: &str = "application/vnd.docker.distribution.manifest.v1+json";

/// Signed Docker schema 1 manifest.
pub const DOCKER_MANIFEST_V1_JWS_TYPE: &str =
    "application/vnd.docker.distribution.manifest.v1+prettyjws";

/// Docker schema 2 manifest.
pub const DOCKER_MANIFEST_V2_TYPE: &str = "application/vnd.docker.distribution.manifest.v2+json";

/// OCI image manifest.
pub const OCI_IMAGE_MANIFEST_V1: &str = "application/vnd.oci.image.manifest.v1+json";

/// OCI image configuration.
pub const OCI_IMAGE_CONFIG_V1: &str = "application/vnd.oci.image.config.v1+json";

/// OCI image index.
pub const OCI_IMAGE_INDEX_V1: &str = "application/vnd.oci.image.index.v1+json";

/// Gzip-compressed OCI layer tarball.
pub const OCI_IMAGE_TAR_GZIP: &str = "application/vnd.oci.image.layer.v1.tar+gzip";

/// Media types accepted for manifests pushed to or served from the cache.
pub const MANIFEST_MEDIA_TYPES: &[&str] = &[
    DOCKER_MANIFEST_V1_TYPE,
    DOCKER_MANIFEST_V1_JWS_TYPE,
    DOCKER_MANIFEST_V2_TYPE,
    DOCKER_IMAGE_INDEX_V2,
    OCI_IMAGE_MANIFEST_V1,
    OCI_IMAGE_INDEX_V1,
];

/// Whether `media_type` is a manifest or index media type.
pub fn is_manifest_media_type(media_type: &str) -> bool {
    MANIFEST_MEDIA_TYPES.contains(&media_type)
}

/// Whether `media_type` identifies a multi-platform index.
pub fn is_index_media_type(media_type: &str) -> bool {
    media_type == DOCKER_IMAGE_INDEX_V2 || media_type == OCI_IMAGE_INDEX_V1
}

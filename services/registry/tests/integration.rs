//! Integration tests for the registry cache and spec model

use api_client::mock::MockService;
use api_client::{HttpClient, RetryConfig};
use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use indoc::indoc;
use registry::media_type::{
    DOCKER_IMAGE_CONFIG_V1, DOCKER_IMAGE_INDEX_V2, DOCKER_IMAGE_TAR_GZIP,
    DOCKER_MANIFEST_V1_JWS_TYPE, DOCKER_MANIFEST_V2_TYPE,
};
use registry::{ContainerOrIndexSpec, PlatformSpec, RegistryError, RegistryStorage};
use storage::digest::sha256_digest;
use storage::{ContainerLayer, ContentReaderFactory, DigestStore, Storage, StorageErrorKind};

const DOCKER_INDEX: &str = include_str!("fixtures/docker-index.json");

const CONFIG: &str = indoc! {r#"
    {
      "architecture": "amd64",
      "config": {
        "Env": ["PATH=/usr/local/bin:/usr/bin:/bin"],
        "Cmd": ["sh"],
        "WorkingDir": "/"
      },
      "created": "2023-05-09T23:11:10.132147526Z",
      "os": "linux",
      "rootfs": {"type": "layers", "diff_ids": ["sha256:feb5d9fea6a5e9606aa995e879d862b825965ba48de054caab5ef356dc6b3412"]}
    }
"#};

const V1_MANIFEST: &str = indoc! {r#"
    {
      "schemaVersion": 1,
      "name": "library/hello",
      "tag": "v1",
      "architecture": "amd64",
      "fsLayers": [
        {"blobSum": "sha256:a3ed95caeb02ffe68cdd9fd84406680ae93d633cb16422d00e8a7c22955b46d4"},
        {"blobSum": "sha256:b49b96595fd4bd6de7cb7253fe5e89d242d0eb4f993b2b8280c0581c3a62ddc2"}
      ],
      "history": [
        {"v1Compatibility": "{\"architecture\":\"amd64\",\"config\":{\"Cmd\":[\"/hello\"]},\"created\":\"2017-01-27T18:12:40.1Z\"}"},
        {"v1Compatibility": "{\"id\":\"base\"}"}
      ],
      "signatures": []
    }
"#};

fn test_registry(mock: &MockService) -> RegistryStorage {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    let retry = RetryConfig {
        attempts: 2,
        delay_ms: 5,
        ..Default::default()
    };
    let client = HttpClient::new_with_inner_service(mock.clone(), retry);
    RegistryStorage::new(Storage::memory(), ContentReaderFactory::new(client))
}

fn v2_manifest(config_digest: &str, config_size: usize) -> String {
    serde_json::json!({
        "schemaVersion": 2,
        "mediaType": DOCKER_MANIFEST_V2_TYPE,
        "config": {
            "mediaType": DOCKER_IMAGE_CONFIG_V1,
            "digest": config_digest,
            "size": config_size
        },
        "layers": [
            {
                "mediaType": DOCKER_IMAGE_TAR_GZIP,
                "digest": "sha256:feb5d9fea6a5e9606aa995e879d862b825965ba48de054caab5ef356dc6b3412",
                "size": 772788
            }
        ]
    })
    .to_string()
}

#[tokio::test]
async fn test_inspect_multi_arch_index() {
    let registry = test_registry(&MockService::new());

    let digest = registry
        .put_manifest(
            "library/busybox",
            "latest",
            DOCKER_IMAGE_INDEX_V2,
            Bytes::from_static(DOCKER_INDEX.as_bytes()),
        )
        .await
        .unwrap();
    assert_eq!(digest, sha256_digest(DOCKER_INDEX.as_bytes()));

    let spec = registry
        .inspect("docker.io", "https://registry-1.docker.io", "library/busybox", "latest")
        .await
        .unwrap();

    let ContainerOrIndexSpec::Index(index) = spec else {
        panic!("expected an index");
    };
    assert_eq!(index.digest.as_deref(), Some(digest.as_str()));
    assert_eq!(index.schema_version, Some(2));
    assert_eq!(index.manifests.len(), 11);

    let arm = index
        .manifest_for(&PlatformSpec::new("arm", "linux").with_variant("v7"))
        .unwrap();
    assert_eq!(
        arm.digest.as_deref(),
        Some("sha256:f130bd2d67e6e9280ac6d0a6c83857bfaf70234e8ef4236876eccfbd30973b1c")
    );

    let windows = index
        .manifests
        .iter()
        .filter_map(|manifest| manifest.platform.as_ref())
        .find(|platform| platform.os.as_deref() == Some("windows"))
        .unwrap();
    assert_eq!(windows.os_version.as_deref(), Some("10.0.20348.469"));
}

#[tokio::test]
async fn test_inspect_v2_image() {
    let registry = test_registry(&MockService::new());
    let repo = "library/busybox";

    let config_digest = sha256_digest(CONFIG.as_bytes());
    registry
        .put_blob(
            repo,
            &config_digest,
            DOCKER_IMAGE_CONFIG_V1,
            Bytes::from_static(CONFIG.as_bytes()),
        )
        .await
        .unwrap();

    let manifest = v2_manifest(&config_digest, CONFIG.len());
    let digest = registry
        .put_manifest(repo, "1.36", DOCKER_MANIFEST_V2_TYPE, manifest.into())
        .await
        .unwrap();

    let spec = registry
        .inspect("docker.io", "https://registry-1.docker.io", repo, "1.36")
        .await
        .unwrap();
    let container = spec.container().expect("expected a container");

    assert_eq!(container.digest, digest);
    assert_eq!(container.image_name, repo);
    assert_eq!(container.reference, "1.36");
    assert!(container.is_v2());
    assert!(!container.is_oci());
    assert_eq!(container.config.architecture.as_deref(), Some("amd64"));
    assert_eq!(container.config.config.cmd, vec!["sh"]);
    assert_eq!(container.manifest.layers.len(), 1);
    assert_eq!(container.manifest.layers[0].size, Some(772_788));
    assert_eq!(
        container.manifest.config.as_ref().and_then(|c| c.digest.as_deref()),
        Some(config_digest.as_str())
    );
}

#[tokio::test]
async fn test_inspect_v2_without_config_blob() {
    let registry = test_registry(&MockService::new());
    let config_digest = sha256_digest(b"never stored");

    registry
        .put_manifest(
            "library/busybox",
            "latest",
            DOCKER_MANIFEST_V2_TYPE,
            v2_manifest(&config_digest, 12).into(),
        )
        .await
        .unwrap();

    let err = registry
        .inspect("docker.io", "https://registry-1.docker.io", "library/busybox", "latest")
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::BlobNotFound(ref digest) if *digest == config_digest));
    assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_inspect_v1_image() {
    let registry = test_registry(&MockService::new());

    registry
        .put_manifest(
            "library/hello",
            "v1",
            DOCKER_MANIFEST_V1_JWS_TYPE,
            Bytes::from_static(V1_MANIFEST.as_bytes()),
        )
        .await
        .unwrap();

    let spec = registry
        .inspect("docker.io", "https://registry-1.docker.io", "library/hello", "v1")
        .await
        .unwrap();
    let container = spec.container().expect("expected a container");

    assert!(container.is_v1());
    assert_eq!(container.manifest.config, None);
    assert_eq!(container.config.config.cmd, vec!["/hello"]);

    let layers: Vec<_> = container
        .manifest
        .layers
        .iter()
        .map(|layer| layer.digest.as_deref().unwrap())
        .collect();
    assert_eq!(
        layers,
        vec![
            "sha256:b49b96595fd4bd6de7cb7253fe5e89d242d0eb4f993b2b8280c0581c3a62ddc2",
            "sha256:a3ed95caeb02ffe68cdd9fd84406680ae93d633cb16422d00e8a7c22955b46d4",
        ]
    );
}

#[tokio::test]
async fn test_fetch_blob_is_lazy_and_cached() {
    let mock = MockService::new();
    let data = Bytes::from_static(b"layer tarball from origin");
    let digest = sha256_digest(&data);
    mock.add("/layers/base.tar.gz", StatusCode::OK, HeaderMap::new(), data.clone());

    let registry = test_registry(&mock);
    let location = "https://origin.test/layers/base.tar.gz";

    let store = registry
        .fetch_blob("library/busybox", &digest, location, DOCKER_IMAGE_TAR_GZIP, data.len() as u64)
        .await
        .unwrap();
    assert!(matches!(store, DigestStore::Lazy(_)));
    assert_eq!(mock.calls("/layers/base.tar.gz"), 0);

    assert_eq!(store.get_bytes().await.unwrap(), data);
    assert_eq!(mock.calls("/layers/base.tar.gz"), 1);

    let cached = registry
        .fetch_blob("library/busybox", &digest, "ftp://ignored", DOCKER_IMAGE_TAR_GZIP, 0)
        .await
        .unwrap();
    assert_eq!(cached.size(), data.len() as u64);
    assert_eq!(mock.calls("/layers/base.tar.gz"), 1);
}

#[tokio::test]
async fn test_fetch_blob_from_failing_origin() {
    let mock = MockService::new();
    mock.add("/layers/flaky.tar.gz", StatusCode::BAD_GATEWAY, HeaderMap::new(), "upstream down");

    let registry = test_registry(&mock);
    let digest = sha256_digest(b"flaky");

    let store = registry
        .fetch_blob(
            "library/busybox",
            &digest,
            "http://origin.test/layers/flaky.tar.gz",
            DOCKER_IMAGE_TAR_GZIP,
            5,
        )
        .await
        .unwrap();

    let err = store.get_bytes().await.unwrap_err();
    assert_eq!(err.kind(), StorageErrorKind::ServiceUnavailable);
    assert!(err.is_retryable());
    assert_eq!(mock.calls("/layers/flaky.tar.gz"), 2);

    let err = registry
        .fetch_blob("library/busybox", &sha256_digest(b"other"), "ftp://x", DOCKER_IMAGE_TAR_GZIP, 5)
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::Storage(ref e) if e.kind() == StorageErrorKind::InvalidArgument));
}

#[tokio::test]
async fn test_docker_layers_pass_through() {
    let registry = test_registry(&MockService::new());
    let digest = sha256_digest(b"remote layer");
    let layer = ContainerLayer::new(
        "docker://quay.io/biocontainers/samtools@sha256:1234",
        digest.clone(),
        1024,
        sha256_digest(b"remote layer tar"),
    );

    registry.put_layer("library/busybox", &layer).await.unwrap();

    let cached = registry.get_blob("library/busybox", &digest).await.unwrap();
    assert!(cached.is_docker_layer());
    assert_eq!(cached.size(), 1024);
    assert_eq!(cached.media_type(), DOCKER_IMAGE_TAR_GZIP);

    let err = cached.get_bytes().await.unwrap_err();
    assert_eq!(err.kind(), StorageErrorKind::Unsupported);
}

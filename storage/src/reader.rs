//! Readers for blob content held at a location.
//!
//! A [`ContentReader`] describes where content lives without loading it.
//! Bytes are only produced when [`ContentReader::read_all_bytes`] or
//! [`ContentReader::open_stream`] is called.

use std::fmt;
use std::io::Cursor;

use api_client::{response::body_reader, HttpClient};
use base64::prelude::{Engine as _, BASE64_STANDARD};
use bytes::Bytes;
use camino::Utf8PathBuf;
use http::{StatusCode, Uri};
use storage_driver::{StorageError, StorageErrorKind};
use tokio::io::{AsyncBufRead, BufReader};

use crate::truncate;
use crate::zip;

/// Status codes treated as transient origin failures.
pub const HTTP_SERVER_ERRORS: [StatusCode; 3] = [
    StatusCode::BAD_GATEWAY,
    StatusCode::SERVICE_UNAVAILABLE,
    StatusCode::GATEWAY_TIMEOUT,
];

/// A buffered stream over content bytes.
pub type ContentStream = Box<dyn AsyncBufRead + Send + Unpin>;

/// Helper to convert io::Error to StorageError with appropriate kind detection
pub(crate) fn io_error_to_storage(engine: &'static str, err: std::io::Error) -> StorageError {
    let kind = match err.kind() {
        std::io::ErrorKind::NotFound => StorageErrorKind::NotFound,
        std::io::ErrorKind::PermissionDenied => StorageErrorKind::PermissionDenied,
        _ => StorageErrorKind::Io,
    };
    StorageError::new(engine, kind, err)
}

/// Content held at a location, read on demand.
#[derive(Debug, Clone)]
pub enum ContentReader {
    /// A file on the local filesystem.
    Path(PathContentReader),

    /// An HTTP(S) URL.
    Http(HttpContentReader),

    /// Base64 encoded bytes, decoded on every read.
    Data(DataContentReader),

    /// Compressed bytes, decompressed on every read.
    Gzip(GzipContentReader),

    /// A reference into an upstream registry, which is never read directly.
    Docker(DockerContentReader),
}

impl ContentReader {
    /// Read the whole content into memory.
    pub async fn read_all_bytes(&self) -> Result<Bytes, StorageError> {
        match self {
            ContentReader::Path(reader) => reader.read_all_bytes().await,
            ContentReader::Http(reader) => reader.read_all_bytes().await,
            ContentReader::Data(reader) => reader.read_all_bytes(),
            ContentReader::Gzip(reader) => reader.read_all_bytes(),
            ContentReader::Docker(reader) => reader.read_all_bytes(),
        }
    }

    /// Open the content as a stream.
    ///
    /// File and HTTP content is streamed from its origin, inline content is
    /// decoded up front.
    pub async fn open_stream(&self) -> Result<ContentStream, StorageError> {
        match self {
            ContentReader::Path(reader) => reader.open_stream().await,
            ContentReader::Http(reader) => reader.open_stream().await,
            _ => {
                let bytes = self.read_all_bytes().await?;
                Ok(Box::new(Cursor::new(bytes)))
            }
        }
    }

    /// A reader over `value`, held compressed until read.
    pub fn gzip_from_plain(value: impl AsRef<[u8]>) -> Result<Self, StorageError> {
        GzipContentReader::from_plain(value.as_ref()).map(ContentReader::Gzip)
    }

    /// The origin location, for readers backed by a remote origin.
    pub fn location(&self) -> Option<&str> {
        match self {
            ContentReader::Http(reader) => Some(reader.url()),
            ContentReader::Docker(reader) => Some(reader.location()),
            _ => None,
        }
    }
}

/// Log-safe description, never including inline payloads.
impl fmt::Display for ContentReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContentReader::Path(reader) => write!(f, "path={}", reader.path),
            ContentReader::Http(reader) => write!(f, "location={}", reader.url),
            ContentReader::Data(_) => f.write_str("data=base64+encoded+string"),
            ContentReader::Gzip(_) => f.write_str("gzip=base64+encoded+string"),
            ContentReader::Docker(reader) => write!(f, "location={}", reader.location),
        }
    }
}

/// Reads content from a local file.
#[derive(Debug, Clone)]
pub struct PathContentReader {
    path: Utf8PathBuf,
}

impl PathContentReader {
    const ENGINE: &'static str = "path-reader";

    /// Create a reader for the file at `path`.
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The file path.
    pub fn path(&self) -> &camino::Utf8Path {
        &self.path
    }

    #[tracing::instrument(level = "trace", skip(self), fields(path = %self.path))]
    async fn read_all_bytes(&self) -> Result<Bytes, StorageError> {
        let data = tokio::fs::read(&self.path)
            .await
            .map_err(|err| io_error_to_storage(Self::ENGINE, err))?;
        Ok(data.into())
    }

    async fn open_stream(&self) -> Result<ContentStream, StorageError> {
        let file = tokio::fs::File::open(&self.path)
            .await
            .map_err(|err| io_error_to_storage(Self::ENGINE, err))?;
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Reads content with an HTTP GET, retrying transient server errors.
#[derive(Debug, Clone)]
pub struct HttpContentReader {
    url: String,
    uri: Uri,
    client: HttpClient,
}

impl HttpContentReader {
    const ENGINE: &'static str = "http-reader";

    /// Create a reader for `url`, fetched through `client`.
    pub fn new(url: &str, client: HttpClient) -> Result<Self, StorageError> {
        let uri = url.parse::<Uri>().map_err(|err| {
            StorageError::builder(Self::ENGINE, StorageErrorKind::InvalidArgument, err)
                .location(truncate(url, 100))
                .build()
        })?;

        Ok(Self {
            url: url.to_owned(),
            uri,
            client,
        })
    }

    /// The URL content is fetched from.
    pub fn url(&self) -> &str {
        &self.url
    }

    #[tracing::instrument(level = "debug", skip(self), fields(url = %self.url))]
    async fn send(&self) -> Result<hyperdriver::body::Response, StorageError> {
        let response = self
            .client
            .get(self.uri.clone())
            .with_retry_on_response(|response| HTTP_SERVER_ERRORS.contains(&response.status()))
            .with_throw_when_retry_on_response_exceeded(false)
            .build()
            .invoke()
            .await
            .map_err(|err| {
                // 5xx exhaustion returns the last response, so only transport errors land here
                StorageError::builder(Self::ENGINE, StorageErrorKind::Io, err)
                    .location(self.url.clone())
                    .build()
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let error = api_client::HttpResponseError::from_response(response).await;
        if HTTP_SERVER_ERRORS.contains(&status) {
            let message = format!(
                "Unexpected server response code {} for request {} - message: {}",
                status.as_u16(),
                self.url,
                error.message
            );
            return Err(StorageError::builder(
                Self::ENGINE,
                StorageErrorKind::ServiceUnavailable,
                message,
            )
            .location(self.url.clone())
            .build());
        }

        let kind = if status == StatusCode::NOT_FOUND {
            StorageErrorKind::NotFound
        } else if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            StorageErrorKind::PermissionDenied
        } else {
            StorageErrorKind::Io
        };
        Err(StorageError::builder(Self::ENGINE, kind, error)
            .location(self.url.clone())
            .build())
    }

    async fn read_all_bytes(&self) -> Result<Bytes, StorageError> {
        let response = self.send().await?;
        api_client::response::body_bytes(response.into_body())
            .await
            .map_err(|err| {
                StorageError::builder(Self::ENGINE, StorageErrorKind::Io, err)
                    .location(self.url.clone())
                    .context("reading response body")
                    .build()
            })
    }

    async fn open_stream(&self) -> Result<ContentStream, StorageError> {
        let response = self.send().await?;
        Ok(Box::new(body_reader(response.into_body())))
    }
}

/// Base64 encoded inline content.
#[derive(Debug, Clone)]
pub struct DataContentReader {
    data: String,
}

impl DataContentReader {
    const ENGINE: &'static str = "data-reader";

    /// Wrap the base64 payload of a `data:` location.
    pub fn new(data: impl Into<String>) -> Self {
        Self { data: data.into() }
    }

    fn read_all_bytes(&self) -> Result<Bytes, StorageError> {
        let decoded = BASE64_STANDARD
            .decode(&self.data)
            .map_err(StorageError::with(Self::ENGINE, StorageErrorKind::Decode))?;
        Ok(decoded.into())
    }
}

/// Inline content held compressed in memory.
#[derive(Clone)]
pub struct GzipContentReader {
    data: Bytes,
}

impl GzipContentReader {
    const ENGINE: &'static str = "gzip-reader";

    /// Compress `value` and hold it.
    pub fn from_plain(value: &[u8]) -> Result<Self, StorageError> {
        Ok(Self {
            data: zip::compress(value)?,
        })
    }

    /// Decode the base64 payload of a `gzip:` location, which is already compressed.
    pub fn from_base64(value: &str) -> Result<Self, StorageError> {
        let data = BASE64_STANDARD
            .decode(value)
            .map_err(StorageError::with(Self::ENGINE, StorageErrorKind::Decode))?;
        Ok(Self { data: data.into() })
    }

    fn read_all_bytes(&self) -> Result<Bytes, StorageError> {
        zip::decompress(&self.data)
    }
}

impl fmt::Debug for GzipContentReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GzipContentReader")
            .field("compressed", &self.data.len())
            .finish()
    }
}

/// A `docker://` reference into an upstream registry.
#[derive(Debug, Clone)]
pub struct DockerContentReader {
    location: String,
}

impl DockerContentReader {
    /// Wrap a `docker://` location.
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
        }
    }

    /// The registry reference.
    pub fn location(&self) -> &str {
        &self.location
    }

    fn read_all_bytes(&self) -> Result<Bytes, StorageError> {
        Err(StorageError::unsupported(
            "docker-reader",
            "DockerContentReader does not support 'readAllBytes' operation",
        ))
    }
}

/// Chooses a [`ContentReader`] from the scheme of a location string.
///
/// No I/O happens until the returned reader is read.
#[derive(Debug, Clone)]
pub struct ContentReaderFactory {
    client: HttpClient,
}

impl ContentReaderFactory {
    const ENGINE: &'static str = "content-reader-factory";

    /// Create a factory whose HTTP readers use `client`.
    pub fn new(client: HttpClient) -> Self {
        Self { client }
    }

    /// Create the reader for `location`.
    ///
    /// Prefixes are checked in order: `/`, `http://` or `https://`, `data:`,
    /// `gzip:` and `docker://`. Anything else is an invalid argument.
    pub fn of(&self, location: &str) -> Result<ContentReader, StorageError> {
        if location.starts_with('/') {
            return Ok(ContentReader::Path(PathContentReader::new(location)));
        }
        if location.starts_with("http://") || location.starts_with("https://") {
            return HttpContentReader::new(location, self.client.clone()).map(ContentReader::Http);
        }
        if let Some(data) = location.strip_prefix("data:") {
            return Ok(ContentReader::Data(DataContentReader::new(data)));
        }
        if let Some(data) = location.strip_prefix("gzip:") {
            return GzipContentReader::from_base64(data).map(ContentReader::Gzip);
        }
        if location.starts_with("docker://") {
            return Ok(ContentReader::Docker(DockerContentReader::new(location)));
        }

        Err(StorageError::invalid_argument(
            Self::ENGINE,
            format!("Unsupported content location: {}", truncate(location, 100)),
        ))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use api_client::mock::MockService;
    use api_client::RetryConfig;
    use tokio::io::AsyncReadExt as _;

    use super::*;

    fn mock_client(mock: &MockService) -> HttpClient {
        let retry = RetryConfig {
            attempts: 3,
            delay_ms: 10,
            ..Default::default()
        };
        HttpClient::new_with_inner_service(mock.clone(), retry)
    }

    fn factory() -> ContentReaderFactory {
        ContentReaderFactory::new(mock_client(&MockService::new()))
    }

    #[test]
    fn dispatch_by_prefix() {
        let factory = factory();

        assert!(matches!(factory.of("/tmp/layer.tar.gz"), Ok(ContentReader::Path(_))));
        assert!(matches!(factory.of("http://origin.test/a"), Ok(ContentReader::Http(_))));
        assert!(matches!(factory.of("https://origin.test/a"), Ok(ContentReader::Http(_))));
        assert!(matches!(factory.of("data:aGVsbG8="), Ok(ContentReader::Data(_))));
        assert!(matches!(factory.of("docker://quay.io/org/img"), Ok(ContentReader::Docker(_))));

        let gzip = BASE64_STANDARD.encode(zip::compress(b"hello").unwrap());
        assert!(matches!(factory.of(&format!("gzip:{gzip}")), Ok(ContentReader::Gzip(_))));
    }

    #[test]
    fn unsupported_locations_are_rejected() {
        let factory = factory();

        let err = factory.of("ftp://foo").unwrap_err();
        assert_eq!(err.kind(), StorageErrorKind::InvalidArgument);
        assert!(err.to_string().contains("Unsupported content location: ftp://foo"));

        let long = format!("s3://{}", "x".repeat(500));
        let err = factory.of(&long).unwrap_err();
        assert!(err.to_string().len() < 300);

        assert!(factory.of("").is_err());
    }

    #[tokio::test]
    async fn inline_data_is_decoded() {
        let reader = factory().of("data:aGVsbG8=").unwrap();
        assert_eq!(reader.read_all_bytes().await.unwrap(), &b"hello"[..]);
        assert_eq!(reader.to_string(), "data=base64+encoded+string");

        let malformed = factory().of("data:@@not-base64@@").unwrap();
        let err = malformed.read_all_bytes().await.unwrap_err();
        assert_eq!(err.kind(), StorageErrorKind::Decode);
    }

    #[tokio::test]
    async fn inline_gzip_is_decompressed() {
        let mut encoder =
            flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(b"FROM ubuntu").unwrap();
        let encoded = BASE64_STANDARD.encode(encoder.finish().unwrap());

        let reader = factory().of(&format!("gzip:{encoded}")).unwrap();
        assert_eq!(reader.read_all_bytes().await.unwrap(), &b"FROM ubuntu"[..]);
        assert_eq!(reader.to_string(), "gzip=base64+encoded+string");

        let err = factory().of("gzip:!!!").unwrap_err();
        assert_eq!(err.kind(), StorageErrorKind::Decode);
    }

    #[tokio::test]
    async fn gzip_from_plain_round_trips() {
        let reader = ContentReader::gzip_from_plain("layer data").unwrap();
        assert_eq!(reader.read_all_bytes().await.unwrap(), &b"layer data"[..]);
    }

    #[tokio::test]
    async fn path_reader_reads_files() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"on disk").unwrap();
        let path = file.path().to_str().unwrap().to_owned();

        let reader = factory().of(&path).unwrap();
        assert_eq!(reader.read_all_bytes().await.unwrap(), &b"on disk"[..]);
        assert_eq!(reader.to_string(), format!("path={path}"));

        let mut stream = reader.open_stream().await.unwrap();
        let mut buf = String::new();
        stream.read_to_string(&mut buf).await.unwrap();
        assert_eq!(buf, "on disk");

        let missing = factory().of("/definitely/not/here.tar.gz").unwrap();
        let err = missing.read_all_bytes().await.unwrap_err();
        assert_eq!(err.kind(), StorageErrorKind::NotFound);
    }

    #[tokio::test]
    async fn docker_reader_cannot_be_read() {
        let reader = factory().of("docker://docker.io/library/ubuntu").unwrap();
        assert_eq!(reader.location(), Some("docker://docker.io/library/ubuntu"));

        let err = reader.read_all_bytes().await.unwrap_err();
        assert_eq!(err.kind(), StorageErrorKind::Unsupported);
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn http_reader_fetches_body() {
        let mock = MockService::new();
        mock.add("/layer", StatusCode::OK, http::HeaderMap::new(), "remote bytes");

        let reader = ContentReaderFactory::new(mock_client(&mock))
            .of("http://origin.test/layer")
            .unwrap();
        assert_eq!(reader.read_all_bytes().await.unwrap(), &b"remote bytes"[..]);
        assert_eq!(reader.to_string(), "location=http://origin.test/layer");

        let mut stream = reader.open_stream().await.unwrap();
        let mut buf = Vec::new();
        stream.read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf, b"remote bytes");
    }

    #[tokio::test]
    async fn http_reader_retries_server_errors() {
        let mock = MockService::new();
        mock.add("/layer", StatusCode::BAD_GATEWAY, http::HeaderMap::new(), "");
        mock.add("/layer", StatusCode::OK, http::HeaderMap::new(), "second time");

        let reader = ContentReaderFactory::new(mock_client(&mock))
            .of("http://origin.test/layer")
            .unwrap();
        assert_eq!(reader.read_all_bytes().await.unwrap(), &b"second time"[..]);
        assert_eq!(mock.calls("/layer"), 2);
    }

    #[tokio::test]
    async fn http_reader_reports_persistent_server_errors() {
        let mock = MockService::new();
        mock.add(
            "/layer",
            StatusCode::SERVICE_UNAVAILABLE,
            http::HeaderMap::new(),
            "try later",
        );

        let reader = ContentReaderFactory::new(mock_client(&mock))
            .of("http://origin.test/layer")
            .unwrap();
        let err = reader.read_all_bytes().await.unwrap_err();
        assert_eq!(err.kind(), StorageErrorKind::ServiceUnavailable);
        assert!(err.is_retryable());
        assert!(err.to_string().contains(
            "Unexpected server response code 503 for request http://origin.test/layer - message: try later"
        ));
        assert_eq!(mock.calls("/layer"), 3);
    }

    #[tokio::test]
    async fn http_reader_reports_transport_errors() {
        let mock = MockService::new();
        mock.add_error("/layer");

        let reader = ContentReaderFactory::new(mock_client(&mock))
            .of("http://origin.test/layer")
            .unwrap();
        let err = reader.read_all_bytes().await.unwrap_err();
        assert_eq!(err.kind(), StorageErrorKind::Io);
        assert_eq!(err.location(), Some("http://origin.test/layer"));
        assert_eq!(mock.calls("/layer"), 3);
    }

    #[tokio::test]
    async fn http_reader_does_not_retry_missing_content() {
        let mock = MockService::new();

        let reader = ContentReaderFactory::new(mock_client(&mock))
            .of("https://origin.test/missing")
            .unwrap();
        let err = reader.read_all_bytes().await.unwrap_err();
        assert_eq!(err.kind(), StorageErrorKind::NotFound);
        assert_eq!(mock.calls("/missing"), 1);
    }
}

//! Error types for the registry

use http::StatusCode;
use serde::Serialize;

/// Result type for registry operations
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Error types for registry operations
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// Blob not found
    #[error("blob not found: {0}")]
    BlobNotFound(String),

    /// Manifest not found
    #[error("manifest not found: {0}")]
    ManifestNotFound(String),

    /// Invalid digest format
    #[error("invalid digest: {0}")]
    InvalidDigest(String),

    /// Storage error
    #[error("storage error: {0}")]
    Storage(#[from] storage::StorageError),

    /// Invalid manifest
    #[error("invalid manifest: {0}")]
    InvalidManifest(String),

    /// Malformed JSON document
    #[error("unable to parse JSON document - offending value: {payload}")]
    Parse {
        /// The document, truncated
        payload: String,

        /// The parser error
        #[source]
        source: serde_json::Error,
    },

    /// Unsupported manifest media type
    #[error("unsupported manifest type: {0}")]
    UnsupportedManifestType(String),

    /// Digest mismatch
    #[error("digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch {
        /// Expected digest
        expected: String,
        /// Actual digest
        actual: String,
    },

    /// Invalid repository name
    #[error("invalid repository name: {0}")]
    InvalidRepository(String),
}

impl RegistryError {
    /// A parse error for `payload`, which is truncated before being kept.
    pub fn parse(payload: &str, source: serde_json::Error) -> Self {
        RegistryError::Parse {
            payload: storage::truncate(payload, 100).into_owned(),
            source,
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            RegistryError::BlobNotFound(_) | RegistryError::ManifestNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            RegistryError::InvalidDigest(_)
            | RegistryError::InvalidManifest(_)
            | RegistryError::Parse { .. }
            | RegistryError::InvalidRepository(_)
            | RegistryError::DigestMismatch { .. } => StatusCode::BAD_REQUEST,
            RegistryError::UnsupportedManifestType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            RegistryError::Storage(err) if err.is_client_fault() => StatusCode::BAD_REQUEST,
            RegistryError::Storage(err) if err.kind() == storage::StorageErrorKind::NotFound => {
                StatusCode::NOT_FOUND
            }
            RegistryError::Storage(err) if err.is_server_fault() => StatusCode::BAD_GATEWAY,
            RegistryError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code for OCI error responses
    pub fn error_code(&self) -> &'static str {
        match self {
            RegistryError::BlobNotFound(_) => "BLOB_UNKNOWN",
            RegistryError::ManifestNotFound(_) => "MANIFEST_UNKNOWN",
            RegistryError::InvalidDigest(_) => "DIGEST_INVALID",
            RegistryError::InvalidManifest(_) | RegistryError::Parse { .. } => "MANIFEST_INVALID",
            RegistryError::UnsupportedManifestType(_) => "MANIFEST_INVALID",
            RegistryError::DigestMismatch { .. } => "DIGEST_INVALID",
            RegistryError::InvalidRepository(_) => "NAME_INVALID",
            RegistryError::Storage(_) => "UNKNOWN",
        }
    }

    /// The OCI error document describing this error.
    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            errors: vec![ErrorDetail {
                code: self.error_code(),
                message: self.to_string(),
            }],
        }
    }
}

/// OCI error response format
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    errors: Vec<ErrorDetail>,
}

#[derive(Debug, Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
}

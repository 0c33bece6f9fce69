use std::backtrace::Backtrace;
use std::error::Error as StdError;
use std::fmt;

use tracing_error::SpanTrace;

/// Categorizes storage errors by their semantic meaning, independent of
/// which reader, store or cache produced them.
///
/// A cache miss is never an error: lookups return `Ok(None)` for absent
/// entries, so `NotFound` only describes content that a reader expected
/// to exist at its location.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageErrorKind {
    /// The content was not found at its location (missing file, HTTP 404).
    ///
    /// **Retryable:** No.
    NotFound,

    /// The caller lacks permission to read the content.
    ///
    /// **Retryable:** No - unless credentials are updated.
    PermissionDenied,

    /// The operation failed due to I/O errors (network, disk, etc.).
    ///
    /// **Retryable:** Maybe - depends on whether the I/O issue is transient.
    Io,

    /// The origin answered with a server error (5xx).
    ///
    /// **Retryable:** Yes - the origin should recover.
    ServiceUnavailable,

    /// The argument was malformed: unsupported location scheme, missing
    /// layer fields, bad digest prefix.
    ///
    /// **Retryable:** No - the request itself is invalid.
    InvalidArgument,

    /// The operation is not supported by this kind of reader or store,
    /// e.g. reading the bytes of a pass-through store.
    ///
    /// **Retryable:** No - this is a contract violation by the caller.
    Unsupported,

    /// Inline content could not be decoded (base64 or compression).
    ///
    /// **Retryable:** No - the payload itself is malformed.
    Decode,

    /// An unexpected or uncategorized error occurred.
    ///
    /// **Retryable:** Unknown - inspect the underlying error.
    Other,
}

impl StorageErrorKind {
    /// Returns whether this error kind typically indicates a retryable condition.
    ///
    /// This is advisory only: HTTP fetches are already retried by the
    /// invocation engine before an error reaches the caller.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StorageErrorKind::ServiceUnavailable | StorageErrorKind::Io
        )
    }

    /// Returns whether this error indicates a client-side fault.
    pub fn is_client_fault(&self) -> bool {
        matches!(
            self,
            StorageErrorKind::InvalidArgument
                | StorageErrorKind::Unsupported
                | StorageErrorKind::PermissionDenied
                | StorageErrorKind::Decode
        )
    }

    /// Returns whether this error indicates a server-side fault.
    pub fn is_server_fault(&self) -> bool {
        matches!(self, StorageErrorKind::ServiceUnavailable)
    }
}

impl fmt::Display for StorageErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageErrorKind::NotFound => write!(f, "not found"),
            StorageErrorKind::PermissionDenied => write!(f, "permission denied"),
            StorageErrorKind::Io => write!(f, "I/O error"),
            StorageErrorKind::ServiceUnavailable => write!(f, "service unavailable"),
            StorageErrorKind::InvalidArgument => write!(f, "invalid argument"),
            StorageErrorKind::Unsupported => write!(f, "unsupported operation"),
            StorageErrorKind::Decode => write!(f, "decode error"),
            StorageErrorKind::Other => write!(f, "other error"),
        }
    }
}

#[derive(Debug)]
struct ErrorTrace {
    /// Capture is controlled by the RUST_BACKTRACE environment variable.
    backtrace: Backtrace,

    /// The span context at the point where the error was created.
    span_trace: SpanTrace,
}

impl ErrorTrace {
    #[track_caller]
    fn capture() -> Self {
        ErrorTrace {
            backtrace: Backtrace::capture(),
            span_trace: SpanTrace::capture(),
        }
    }
}

/// Storage error with its kind, the component that raised it, and the
/// location of the content involved.
///
/// # Example
///
/// ```rust
/// use storage_driver::{StorageError, StorageErrorKind};
///
/// let error = StorageError::builder(
///     "path-reader",
///     StorageErrorKind::NotFound,
///     std::io::Error::new(std::io::ErrorKind::NotFound, "file not found"),
/// )
/// .location("/data/layer.tar.gz")
/// .context("read content")
/// .build();
///
/// assert_eq!(error.kind(), StorageErrorKind::NotFound);
/// assert_eq!(error.location(), Some("/data/layer.tar.gz"));
/// ```
#[derive(Debug)]
pub struct StorageError {
    kind: StorageErrorKind,

    /// The name of the reader, store or driver that produced this error.
    engine: &'static str,

    /// Where the content lives (path, URL, cache key), if applicable.
    location: Option<String>,

    context: Option<String>,

    source: Box<dyn StdError + Send + Sync + 'static>,

    traces: Box<ErrorTrace>,
}

impl StdError for StorageError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(self.source.as_ref())
    }
}

impl StorageError {
    /// Create a new storage error with the minimum required information.
    ///
    /// For more control, use `StorageError::builder()`.
    pub fn new<E>(engine: &'static str, kind: StorageErrorKind, error: E) -> Self
    where
        E: Into<Box<dyn StdError + Send + Sync + 'static>>,
    {
        Self {
            kind,
            engine,
            location: None,
            context: None,
            source: error.into(),
            traces: Box::new(ErrorTrace::capture()),
        }
    }

    /// Create a builder for constructing a storage error with full context.
    pub fn builder<E>(engine: &'static str, kind: StorageErrorKind, error: E) -> StorageErrorBuilder
    where
        E: Into<Box<dyn StdError + Send + Sync + 'static>>,
    {
        StorageErrorBuilder {
            engine,
            kind,
            source: error.into(),
            location: None,
            context: None,
        }
    }

    /// Returns a boxed closure that creates a storage error from a downstream error.
    ///
    /// # Example
    ///
    /// ```rust
    /// use storage_driver::{StorageError, StorageErrorKind};
    ///
    /// fn operation() -> Result<Vec<u8>, StorageError> {
    ///     let bytes = std::fs::read("/definitely/missing/file")
    ///         .map_err(StorageError::with("path-reader", StorageErrorKind::Io))?;
    ///     Ok(bytes)
    /// }
    ///
    /// assert!(operation().is_err());
    /// ```
    pub fn with<E>(
        engine: &'static str,
        kind: StorageErrorKind,
    ) -> Box<dyn FnOnce(E) -> StorageError + Send + Sync>
    where
        E: Into<Box<dyn StdError + Send + Sync + 'static>>,
    {
        Box::new(move |error: E| StorageError::new(engine, kind, error))
    }

    /// Shorthand for an invalid-argument error carrying only a message.
    pub fn invalid_argument(engine: &'static str, message: impl Into<String>) -> Self {
        StorageError::new(engine, StorageErrorKind::InvalidArgument, message.into())
    }

    /// Shorthand for an unsupported-operation error carrying only a message.
    pub fn unsupported(engine: &'static str, message: impl Into<String>) -> Self {
        StorageError::new(engine, StorageErrorKind::Unsupported, message.into())
    }

    /// Returns the error kind.
    pub fn kind(&self) -> StorageErrorKind {
        self.kind
    }

    /// Returns the name of the component that produced the error.
    pub fn engine(&self) -> &'static str {
        self.engine
    }

    /// Returns the content location, if available.
    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }

    /// Returns additional context, if available.
    pub fn context(&self) -> Option<&str> {
        self.context.as_deref()
    }

    /// Returns whether this error is likely retryable.
    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    /// Returns whether this error indicates a client-side fault.
    pub fn is_client_fault(&self) -> bool {
        self.kind.is_client_fault()
    }

    /// Returns whether this error indicates a server-side fault.
    pub fn is_server_fault(&self) -> bool {
        self.kind.is_server_fault()
    }

    /// Returns a reference to the captured backtrace.
    pub fn backtrace(&self) -> &Backtrace {
        &self.traces.backtrace
    }

    /// Returns a reference to the captured span trace.
    pub fn span_trace(&self) -> &SpanTrace {
        &self.traces.span_trace
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Storage error [{}] from {}", self.kind, self.engine)?;

        if let Some(location) = &self.location {
            write!(f, " (location: {})", location)?;
        }

        if let Some(context) = &self.context {
            write!(f, " ({})", context)?;
        }

        write!(f, ": {}", self.source)
    }
}

/// Builder for constructing `StorageError` with optional context fields.
#[derive(Debug)]
pub struct StorageErrorBuilder {
    kind: StorageErrorKind,
    engine: &'static str,
    source: Box<dyn StdError + Send + Sync + 'static>,
    location: Option<String>,
    context: Option<String>,
}

impl StorageErrorBuilder {
    /// Set the content location.
    pub fn location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Set additional context.
    pub fn context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Build the `StorageError`.
    pub fn build(self) -> StorageError {
        StorageError {
            kind: self.kind,
            engine: self.engine,
            location: self.location,
            context: self.context,
            source: self.source,
            traces: Box::new(ErrorTrace::capture()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_location_and_context() {
        let error = StorageError::builder(
            "http-reader",
            StorageErrorKind::ServiceUnavailable,
            "bad gateway",
        )
        .location("https://example.com/layer")
        .context("read content")
        .build();

        assert_eq!(
            error.to_string(),
            "Storage error [service unavailable] from http-reader (location: https://example.com/layer) (read content): bad gateway"
        );
        assert!(error.is_retryable());
        assert!(error.is_server_fault());
    }

    #[test]
    fn unsupported_is_client_fault() {
        let error = StorageError::unsupported("docker-store", "cannot read bytes");
        assert_eq!(error.kind(), StorageErrorKind::Unsupported);
        assert!(error.is_client_fault());
        assert!(!error.is_retryable());
    }
}

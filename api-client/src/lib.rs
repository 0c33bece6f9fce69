//! HTTP plumbing for fetching content from remote origins.
//!
//! [`HttpClient`] is an explicitly constructed, cheaply cloneable handle to a
//! pooled HTTP client plus the retry settings used for every request made
//! through it. Requests are sent with an [`HttpInvokation`], which retries
//! with a linear-with-multiplier [`Backoff`].

use http::Uri;
use hyperdriver::service::SharedService;

mod error;
pub mod mock;
pub mod response;
mod retry;

pub use self::error::{Error, HttpResponseError};
pub use self::retry::{
    is_transport_error, Backoff, HttpInvokation, HttpInvokationBuilder, RequestTemplate,
    RetryConfig,
};

/// The shared, pooled transport used by [`HttpClient`].
pub type HttpService = hyperdriver::client::SharedClientService<hyperdriver::Body>;

/// A handle to a shared HTTP client and its retry settings.
///
/// The client is owned by the composing application and passed to whatever
/// needs it; clones share the same connection pool.
#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: HttpService,
    retry: RetryConfig,
}

impl HttpClient {
    /// Create a new client over TCP with TLS support.
    pub fn new(retry: RetryConfig) -> Self {
        let inner = hyperdriver::Client::build_tcp_http()
            .with_default_tls()
            .build_service();

        HttpClient { inner, retry }
    }

    /// Create a client over a custom transport, e.g. [`mock::MockService`].
    pub fn new_with_inner_service<S>(inner: S, retry: RetryConfig) -> Self
    where
        S: tower::Service<
                hyperdriver::body::Request,
                Response = hyperdriver::body::Response,
                Error = hyperdriver::client::Error,
            > + Clone
            + Send
            + Sync
            + 'static,
        S::Future: Send + 'static,
    {
        let inner = tower::ServiceBuilder::new()
            .layer(SharedService::layer())
            .service(inner);

        HttpClient { inner, retry }
    }

    /// The retry settings applied to invocations from this client.
    pub fn retry(&self) -> &RetryConfig {
        &self.retry
    }

    /// The underlying transport.
    pub fn inner(&self) -> &HttpService {
        &self.inner
    }

    /// Start building an invocation of `request`, preconfigured with this
    /// client's retry settings.
    pub fn request(&self, request: impl Into<RequestTemplate>) -> HttpInvokationBuilder<HttpService> {
        HttpInvokation::builder(self.inner.clone(), request).with_config(&self.retry)
    }

    /// Start building a `GET` invocation for `uri`.
    pub fn get(&self, uri: Uri) -> HttpInvokationBuilder<HttpService> {
        self.request(RequestTemplate::get(uri))
    }
}

//! Retry-with-backoff around a single HTTP request/response exchange.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method, Uri, Version};
use hyperdriver::body::{Request, Response};
use serde::Deserialize;
use tower::ServiceExt as _;

use crate::error::Error;

const DEFAULT_MAX_ATTEMPTS: u32 = 5;
const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);
const DEFAULT_MULTIPLIER: f64 = 1.0;

/// Backoff between two attempts of the same request.
///
/// The delay before retrying after attempt `n` is `delay * multiplier * n`,
/// capped at `max_delay` when one is set. A multiplier of one gives a linear
/// backoff, larger multipliers make it steeper.
#[derive(Debug, Clone, PartialEq)]
pub struct Backoff {
    /// The base delay
    pub delay: Duration,

    /// The factor applied to the base delay
    pub multiplier: f64,

    /// The maximum delay for the backoff
    pub max_delay: Option<Duration>,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            delay: DEFAULT_RETRY_DELAY,
            multiplier: DEFAULT_MULTIPLIER,
            max_delay: None,
        }
    }
}

impl Backoff {
    /// Create a new backoff policy.
    pub fn new(delay: Duration, multiplier: f64, max_delay: Option<Duration>) -> Self {
        Self {
            delay,
            multiplier,
            max_delay,
        }
    }

    /// The delay to wait after `attempt` attempts have been made.
    pub fn delay(&self, attempt: u32) -> Duration {
        let millis = self.delay.as_millis() as f64 * self.multiplier * f64::from(attempt);
        let delay = if millis.is_finite() && millis > 0.0 {
            Duration::from_millis(millis as u64)
        } else {
            Duration::ZERO
        };

        match self.max_delay {
            Some(max) => delay.min(max),
            None => delay,
        }
    }
}

/// Retry settings shared by every invocation made through an
/// [`HttpClient`](crate::HttpClient).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one.
    pub attempts: u32,

    /// Base delay between attempts, in milliseconds.
    pub delay_ms: u64,

    /// Upper bound for the delay between attempts, in milliseconds.
    pub max_delay_ms: Option<u64>,

    /// Factor applied to the base delay.
    pub multiplier: f64,

    /// Raise an error when every attempt produced a retry-worthy response,
    /// instead of returning the last response.
    pub throw_when_exceeded: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_MAX_ATTEMPTS,
            delay_ms: DEFAULT_RETRY_DELAY.as_millis() as u64,
            max_delay_ms: None,
            multiplier: DEFAULT_MULTIPLIER,
            throw_when_exceeded: true,
        }
    }
}

impl RetryConfig {
    /// The backoff described by this configuration.
    pub fn backoff(&self) -> Backoff {
        Backoff::new(
            Duration::from_millis(self.delay_ms),
            self.multiplier,
            self.max_delay_ms.map(Duration::from_millis),
        )
    }
}

/// A request which can be rebuilt for every attempt.
#[derive(Debug, Clone)]
pub struct RequestTemplate {
    method: Method,
    uri: Uri,
    version: Version,
    headers: HeaderMap,
    body: Bytes,
}

impl RequestTemplate {
    /// Create a request template with an empty body.
    pub fn new(method: Method, uri: Uri) -> Self {
        Self {
            method,
            uri,
            version: Version::HTTP_11,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// A `GET` request for `uri`.
    pub fn get(uri: Uri) -> Self {
        Self::new(Method::GET, uri)
    }

    /// Append a header to the request.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Set the request body.
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// The request URI.
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// The request method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    fn build(&self) -> Request {
        let mut request = http::Request::new(hyperdriver::Body::from(self.body.clone()));
        *request.method_mut() = self.method.clone();
        *request.uri_mut() = self.uri.clone();
        *request.version_mut() = self.version;
        *request.headers_mut() = self.headers.clone();
        request
    }
}

impl From<http::Request<Bytes>> for RequestTemplate {
    fn from(request: http::Request<Bytes>) -> Self {
        let (parts, body) = request.into_parts();
        Self {
            method: parts.method,
            uri: parts.uri,
            version: parts.version,
            headers: parts.headers,
            body,
        }
    }
}

/// Whether sending failed for a reason the network may not repeat.
///
/// Requests the client refuses to send (unsupported protocol, invalid
/// method) fail the same way every time.
pub fn is_transport_error(error: &hyperdriver::client::Error) -> bool {
    !matches!(
        error,
        hyperdriver::client::Error::UnsupportedProtocol
            | hyperdriver::client::Error::InvalidMethod(_)
    )
}

type ResponsePredicate = Arc<dyn Fn(&Response) -> bool + Send + Sync>;
type ErrorPredicate = Arc<dyn Fn(&hyperdriver::client::Error) -> bool + Send + Sync>;

/// An HTTP request with a retry policy.
///
/// An attempt is retried when its response matches the retry-on-response
/// predicate (default: never) or when sending fails with an error matching the
/// retry-on-error predicate (default: [`is_transport_error`]). Between attempts
/// the invocation sleeps according to its [`Backoff`]; the sleep is a timer,
/// not a blocked thread.
///
/// When attempts are exhausted after a transport error, that error is
/// returned. When they are exhausted on a retry-worthy response, the result
/// is [`Error::RetriesExceeded`] by default, or the last response when
/// configured with `with_throw_when_retry_on_response_exceeded(false)`.
///
/// The whole sequence is a single future: dropping it cancels any pending
/// timer and any request in flight.
pub struct HttpInvokation<S> {
    service: S,
    request: RequestTemplate,
    max_attempts: u32,
    backoff: Backoff,
    retry_on_response: ResponsePredicate,
    retry_on_error: ErrorPredicate,
    throw_when_exceeded: bool,
}

impl<S> fmt::Debug for HttpInvokation<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpInvokation")
            .field("request", &self.request)
            .field("max_attempts", &self.max_attempts)
            .field("backoff", &self.backoff)
            .field("throw_when_exceeded", &self.throw_when_exceeded)
            .finish()
    }
}

impl<S> HttpInvokation<S>
where
    S: tower::Service<Request, Response = Response, Error = hyperdriver::client::Error>
        + Clone
        + Send,
    S::Future: Send,
{
    /// Start building an invocation of `request` over `service`.
    pub fn builder(service: S, request: impl Into<RequestTemplate>) -> HttpInvokationBuilder<S> {
        HttpInvokationBuilder::new(service, request.into())
    }

    /// Send the request, retrying as configured.
    #[tracing::instrument(skip(self), fields(uri = %self.request.uri, method = %self.request.method))]
    pub async fn invoke(self) -> Result<Response, Error> {
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            let exhausted = attempt >= self.max_attempts;

            match self.service.clone().oneshot(self.request.build()).await {
                Ok(response) if (self.retry_on_response)(&response) => {
                    if exhausted {
                        return self.retries_exceeded(response, attempt);
                    }
                    tracing::debug!(status = %response.status(), attempt, "retry-worthy response");
                    // release the connection before the next attempt
                    drop(response);
                }
                Ok(response) => return Ok(response),
                Err(error) if (self.retry_on_error)(&error) => {
                    if exhausted {
                        return Err(Error::Request(error));
                    }
                    tracing::debug!(%error, attempt, "retry-worthy error");
                }
                Err(error) => return Err(Error::Request(error)),
            }

            let delay = self.backoff.delay(attempt);
            tracing::warn!(
                attempt,
                delay = delay.as_millis() as u64,
                uri = %self.request.uri,
                "Http client retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }

    fn retries_exceeded(&self, response: Response, attempts: u32) -> Result<Response, Error> {
        if self.throw_when_exceeded {
            Err(Error::RetriesExceeded {
                attempts,
                status: response.status(),
            })
        } else {
            Ok(response)
        }
    }
}

/// Builder for an [`HttpInvokation`].
pub struct HttpInvokationBuilder<S> {
    service: S,
    request: RequestTemplate,
    max_attempts: u32,
    backoff: Backoff,
    retry_on_response: Option<ResponsePredicate>,
    retry_on_error: Option<ErrorPredicate>,
    throw_when_exceeded: bool,
}

impl<S> fmt::Debug for HttpInvokationBuilder<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpInvokationBuilder")
            .field("request", &self.request)
            .field("max_attempts", &self.max_attempts)
            .field("backoff", &self.backoff)
            .finish()
    }
}

impl<S> HttpInvokationBuilder<S> {
    fn new(service: S, request: RequestTemplate) -> Self {
        Self {
            service,
            request,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: Backoff::default(),
            retry_on_response: None,
            retry_on_error: None,
            throw_when_exceeded: true,
        }
    }

    /// Apply the attempts, backoff and exhaustion policy from a configuration.
    pub fn with_config(mut self, config: &RetryConfig) -> Self {
        self.max_attempts = config.attempts;
        self.backoff = config.backoff();
        self.throw_when_exceeded = config.throw_when_exceeded;
        self
    }

    /// Maximum number of attempts, including the first one.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Base delay between attempts.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.backoff.delay = delay;
        self
    }

    /// Upper bound for the delay between attempts.
    pub fn with_retry_max_delay(mut self, delay: Duration) -> Self {
        self.backoff.max_delay = Some(delay);
        self
    }

    /// Factor applied to the base delay.
    pub fn with_retry_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff.multiplier = multiplier;
        self
    }

    /// Retry when a response matches `predicate`.
    pub fn with_retry_on_response<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Response) -> bool + Send + Sync + 'static,
    {
        self.retry_on_response = Some(Arc::new(predicate));
        self
    }

    /// Retry when sending fails with an error matching `predicate`.
    pub fn with_retry_on_error<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&hyperdriver::client::Error) -> bool + Send + Sync + 'static,
    {
        self.retry_on_error = Some(Arc::new(predicate));
        self
    }

    /// Whether to raise [`Error::RetriesExceeded`] (the default) or return the
    /// last response when attempts run out on a retry-worthy response.
    pub fn with_throw_when_retry_on_response_exceeded(mut self, throw: bool) -> Self {
        self.throw_when_exceeded = throw;
        self
    }

    /// Build the invocation.
    pub fn build(self) -> HttpInvokation<S> {
        HttpInvokation {
            service: self.service,
            request: self.request,
            max_attempts: self.max_attempts.max(1),
            backoff: self.backoff,
            retry_on_response: self
                .retry_on_response
                .unwrap_or_else(|| Arc::new(|_: &Response| false)),
            retry_on_error: self
                .retry_on_error
                .unwrap_or_else(|| Arc::new(is_transport_error)),
            throw_when_exceeded: self.throw_when_exceeded,
        }
    }
}

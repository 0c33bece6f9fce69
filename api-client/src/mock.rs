//! A scripted HTTP transport for tests.
//!
//! Replies are registered per request path and consumed in order; the last
//! reply registered for a path repeats forever. Paths with no reply answer
//! `404 Not Found`.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use bytes::Bytes;
use http::response;
use parking_lot::Mutex;
use tokio::time::Instant;

#[derive(Debug, Clone)]
enum MockReply {
    Response {
        status: http::StatusCode,
        headers: http::HeaderMap,
        body: Bytes,
    },
    Error,
    Rejected,
}

#[derive(Debug, Default)]
struct MockState {
    replies: HashMap<String, VecDeque<MockReply>>,
    calls: HashMap<String, Vec<Instant>>,
}

/// A [`tower::Service`] standing in for the HTTP client.
#[derive(Debug, Default, Clone)]
pub struct MockService {
    state: Arc<Mutex<MockState>>,
}

impl MockService {
    /// Create a mock with no replies.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response for `path`.
    pub fn add(
        &self,
        path: &str,
        status: http::StatusCode,
        headers: http::HeaderMap,
        body: impl Into<Bytes>,
    ) {
        self.push(
            path,
            MockReply::Response {
                status,
                headers,
                body: body.into(),
            },
        );
    }

    /// Queue a transport failure for `path`.
    pub fn add_error(&self, path: &str) {
        self.push(path, MockReply::Error);
    }

    /// Queue a request the client refuses to send for `path`.
    pub fn add_rejection(&self, path: &str) {
        self.push(path, MockReply::Rejected);
    }

    /// The number of requests received for `path`.
    pub fn calls(&self, path: &str) -> usize {
        self.state.lock().calls.get(path).map_or(0, Vec::len)
    }

    /// The instants at which requests for `path` were received.
    pub fn call_times(&self, path: &str) -> Vec<Instant> {
        self.state.lock().calls.get(path).cloned().unwrap_or_default()
    }

    fn push(&self, path: &str, reply: MockReply) {
        self.state
            .lock()
            .replies
            .entry(path.to_owned())
            .or_default()
            .push_back(reply);
    }

    fn next_reply(&self, path: &str) -> Option<MockReply> {
        let mut state = self.state.lock();
        state
            .calls
            .entry(path.to_owned())
            .or_default()
            .push(Instant::now());

        let queue = state.replies.get_mut(path)?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

impl tower::Service<hyperdriver::body::Request> for MockService {
    type Response = hyperdriver::body::Response;
    type Error = hyperdriver::client::Error;
    type Future = std::future::Ready<Result<Self::Response, Self::Error>>;

    fn poll_ready(
        &mut self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: hyperdriver::body::Request) -> Self::Future {
        let path = req.uri().path().to_owned();

        let (status, headers, body) = match self.next_reply(&path) {
            Some(MockReply::Response {
                status,
                headers,
                body,
            }) => (status, headers, body),
            Some(MockReply::Error) => {
                return std::future::ready(Err(hyperdriver::client::Error::RequestTimeout))
            }
            Some(MockReply::Rejected) => {
                return std::future::ready(Err(hyperdriver::client::Error::UnsupportedProtocol))
            }
            None => (
                http::StatusCode::NOT_FOUND,
                http::HeaderMap::new(),
                Bytes::new(),
            ),
        };

        let mut builder = response::Builder::new()
            .status(status)
            .version(http::Version::HTTP_11);

        for (key, value) in headers.iter() {
            builder = builder.header(key, value);
        }

        let response = builder
            .body(hyperdriver::Body::from(body))
            .map_err(|_| hyperdriver::client::Error::RequestTimeout);

        std::future::ready(response)
    }
}

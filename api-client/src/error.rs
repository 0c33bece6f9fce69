//! Error types for HTTP invocations
use std::fmt;

use http::StatusCode;
use thiserror::Error;

use crate::response::body_text;

pub(crate) type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// An error occured while sending an HTTP request
#[derive(Debug, Error)]
pub enum Error {
    /// An error occured while sending the request
    #[error(transparent)]
    Request(hyperdriver::client::Error),

    /// Every attempt produced a retry-worthy response
    #[error("Retries exceeded: attempts={attempts}; status-code={status}")]
    RetriesExceeded {
        /// The number of attempts made
        attempts: u32,

        /// The status of the last response
        status: StatusCode,
    },
}

/// A server returned an error response
#[derive(Debug, Clone)]
pub struct HttpResponseError {
    /// The HTTP status code of the response
    pub status: StatusCode,

    /// The message body of the response
    pub message: String,
}

impl HttpResponseError {
    /// Create a new HTTP response error from a response, consuming its body
    pub async fn from_response(response: hyperdriver::body::Response) -> Self {
        let (parts, body) = response.into_parts();
        let message = body_text(body)
            .await
            .unwrap_or_else(|err| format!("Failed to read response body: {}", err));

        Self {
            status: parts.status,
            message,
        }
    }
}

impl fmt::Display for HttpResponseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "HTTP {} response: {}", self.status, self.message)
    }
}

impl std::error::Error for HttpResponseError {}

//! Helpers for consuming HTTP response bodies.

use std::io;

use bytes::Bytes;
use futures::stream::{BoxStream, StreamExt as _, TryStreamExt as _};
use http_body_util::{BodyDataStream, BodyExt as _};
use tokio::io::AsyncBufRead;
use tokio_util::io::StreamReader;

use crate::error::BoxError;

/// Collect a response body into a single `Bytes` buffer.
pub async fn body_bytes<B>(body: B) -> Result<Bytes, BoxError>
where
    B: http_body::Body,
    B::Error: Into<BoxError>,
{
    let collected = body.collect().await.map_err(Into::<BoxError>::into)?;
    Ok(collected.to_bytes())
}

/// Collect a response body and decode it as UTF-8 text.
pub async fn body_text<B>(body: B) -> Result<String, BoxError>
where
    B: http_body::Body,
    B::Error: Into<BoxError>,
{
    let bytes = body_bytes(body).await?;
    String::from_utf8(bytes.to_vec()).map_err(Into::into)
}

/// Adapt a response body into an async buffered reader, without collecting it.
///
/// Frames are yielded as they arrive from the connection. Dropping the reader
/// drops the body, which releases the connection.
pub fn body_reader<B>(body: B) -> impl AsyncBufRead + Send + Unpin + 'static
where
    B: http_body::Body + Send + 'static,
    B::Data: Send + 'static,
    B::Error: Into<BoxError>,
{
    let stream: BoxStream<'static, io::Result<B::Data>> = BodyDataStream::new(body)
        .map_err(|err| io::Error::other(Into::<BoxError>::into(err)))
        .boxed();
    StreamReader::new(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt as _;

    #[tokio::test]
    async fn reader_yields_the_whole_body() {
        let body = hyperdriver::Body::from(Bytes::from_static(b"layer contents"));
        let mut reader = body_reader(body);
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf, b"layer contents");
    }

    #[tokio::test]
    async fn text_decodes_utf8() {
        let body = hyperdriver::Body::from(Bytes::from_static(b"bad gateway"));
        assert_eq!(body_text(body).await.unwrap(), "bad gateway");
    }
}

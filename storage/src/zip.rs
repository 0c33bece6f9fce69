//! Deflate compression for cached payloads.
//!
//! Payloads are compressed as zlib streams. Decompression also accepts gzip
//! members, which is what `gzip:` locations usually carry.

use std::io::{Read as _, Write as _};

use bytes::Bytes;
use flate2::read::{GzDecoder, ZlibDecoder};
use flate2::write::ZlibEncoder;
use flate2::Compression;
use storage_driver::{StorageError, StorageErrorKind};

const ENGINE: &str = "zip";
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Compress `data` into a zlib stream.
pub fn compress(data: &[u8]) -> Result<Bytes, StorageError> {
    let mut encoder = ZlibEncoder::new(Vec::with_capacity(data.len() / 2), Compression::default());
    encoder
        .write_all(data)
        .map_err(StorageError::with(ENGINE, StorageErrorKind::Io))?;
    let compressed = encoder
        .finish()
        .map_err(StorageError::with(ENGINE, StorageErrorKind::Io))?;
    Ok(compressed.into())
}

/// Decompress a zlib stream or a gzip member.
pub fn decompress(data: &[u8]) -> Result<Bytes, StorageError> {
    let mut buf = Vec::new();
    let result = if data.starts_with(&GZIP_MAGIC) {
        GzDecoder::new(data).read_to_end(&mut buf)
    } else {
        ZlibDecoder::new(data).read_to_end(&mut buf)
    };

    result.map_err(|err| {
        StorageError::builder(ENGINE, StorageErrorKind::Decode, err)
            .context("corrupt compressed payload")
            .build()
    })?;
    Ok(buf.into())
}

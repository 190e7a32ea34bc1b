//! Request body compression
//!
//! Bodies are gzip-encoded with pooled deflate encoders so sustained feeding
//! does not allocate a fresh compressor per document. The gzip member framing
//! (RFC 1952 header and CRC32/size trailer) is written around the pooled raw
//! deflate stream.

use std::io::{self, Write};

use bytes::Bytes;
use crossbeam_channel::{unbounded, Receiver, Sender};
use docfeed_common::HttpMethod;
use flate2::write::DeflateEncoder;
use flate2::{Compression as Level, Crc};
use url::Url;

use crate::config::Compression;
use crate::error::{FeedError, Result};
use crate::request::FeedRequest;

/// Bodies larger than this are compressed in [`Compression::Auto`] mode
pub const AUTO_COMPRESSION_THRESHOLD: usize = 512;

/// Initial capacity of a fresh output buffer
const INITIAL_BUFFER_CAPACITY: usize = 1024;

/// Gzip member header: magic, deflate method, no flags, no mtime, no extra
/// flags, unknown OS
const GZIP_HEADER: [u8; 10] = [0x1f, 0x8b, 0x08, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xff];

/// Decide whether a body of `len` bytes is compressed under `mode`
pub fn should_compress(mode: Compression, len: usize) -> bool {
    match mode {
        Compression::Gzip => true,
        Compression::Auto => len > AUTO_COMPRESSION_THRESHOLD,
        Compression::None => false,
    }
}

/// Free list of idle deflate encoders.
///
/// Any idle encoder is interchangeable with any other. An encoder is only
/// put back after it finished a stream successfully.
#[derive(Debug, Clone)]
pub struct EncoderPool {
    idle_tx: Sender<DeflateEncoder<Vec<u8>>>,
    idle_rx: Receiver<DeflateEncoder<Vec<u8>>>,
}

impl Default for EncoderPool {
    fn default() -> Self {
        Self::new()
    }
}

impl EncoderPool {
    pub fn new() -> Self {
        let (idle_tx, idle_rx) = unbounded();
        Self { idle_tx, idle_rx }
    }

    /// Take an idle encoder, or build one when none is idle
    fn get(&self) -> DeflateEncoder<Vec<u8>> {
        self.idle_rx
            .try_recv()
            .unwrap_or_else(|_| DeflateEncoder::new(Vec::new(), Level::default()))
    }

    fn put(&self, encoder: DeflateEncoder<Vec<u8>>) {
        // Both channel ends live in `self`, so the send cannot fail.
        let _ = self.idle_tx.send(encoder);
    }

    /// Number of idle encoders
    pub fn idle(&self) -> usize {
        self.idle_rx.len()
    }

    /// Gzip-encode `body` into a new buffer
    pub fn gzip(&self, body: &[u8]) -> io::Result<Vec<u8>> {
        let mut encoder = self.get();

        let mut out = Vec::with_capacity(INITIAL_BUFFER_CAPACITY.max(body.len() / 2));
        out.extend_from_slice(&GZIP_HEADER);
        // Swapping in the fresh buffer also resets the deflate state.
        encoder.reset(out)?;
        encoder.write_all(body)?;
        encoder.try_finish()?;
        let mut out = encoder.reset(Vec::new())?;

        let mut crc = Crc::new();
        crc.update(body);
        out.extend_from_slice(&crc.sum().to_le_bytes());
        out.extend_from_slice(&crc.amount().to_le_bytes());

        self.put(encoder);
        Ok(out)
    }
}

/// Builds wire requests, compressing bodies according to the mode
#[derive(Debug, Clone)]
pub struct Compressor {
    mode: Compression,
    pool: EncoderPool,
    #[cfg(test)]
    fail_gzip: bool,
}

impl Compressor {
    pub fn new(mode: Compression) -> Self {
        Self {
            mode,
            pool: EncoderPool::new(),
            #[cfg(test)]
            fail_gzip: false,
        }
    }

    /// Compressor whose gzip step always fails
    #[cfg(test)]
    pub(crate) fn failing(mode: Compression) -> Self {
        Self {
            fail_gzip: true,
            ..Self::new(mode)
        }
    }

    pub fn mode(&self) -> Compression {
        self.mode
    }

    pub fn pool(&self) -> &EncoderPool {
        &self.pool
    }

    /// Build the request for `body`, gzipped when the mode calls for it.
    ///
    /// Compression failures surface as [`FeedError::Build`] for this
    /// request only.
    pub fn build_request(&self, method: HttpMethod, url: Url, body: &Bytes) -> Result<FeedRequest> {
        if !should_compress(self.mode, body.len()) {
            return Ok(FeedRequest::new(method, url, body.clone(), false));
        }

        let compressed = self
            .gzip(body)
            .map_err(|e| FeedError::Build(format!("gzip compression failed: {}", e)))?;
        tracing::trace!(
            raw_bytes = body.len(),
            compressed_bytes = compressed.len(),
            "Compressed request body"
        );
        Ok(FeedRequest::new(method, url, Bytes::from(compressed), true))
    }

    fn gzip(&self, body: &[u8]) -> io::Result<Vec<u8>> {
        #[cfg(test)]
        if self.fail_gzip {
            return Err(io::Error::other("encoder unavailable"));
        }
        self.pool.gzip(body)
    }
}

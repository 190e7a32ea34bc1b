//! Transport seam
//!
//! A [`Transport`] performs one HTTP call under a deadline. The feed client
//! holds several of them and spreads calls across them; any implementation
//! works, from a reqwest connection pool ([`HttpTransport`]) to a test
//! double.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use docfeed_common::HttpResponseLike;

use crate::config::HttpTransportConfig;
use crate::error::{FeedError, Result};
use crate::request::FeedRequest;

/// Capability to perform a single request under a deadline
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send `request` and return once the response head is available.
    ///
    /// The body is read separately through [`TransportResponse::read_body`].
    async fn call(&self, request: FeedRequest, deadline: Duration) -> Result<TransportResponse>;
}

/// Response body that has not been read yet
#[async_trait]
pub trait ResponseBody: Send {
    /// Append the remaining body to `buf`.
    ///
    /// On error `buf` keeps whatever was read before the failure.
    async fn read_to_end(&mut self, buf: &mut BytesMut) -> Result<()>;
}

#[async_trait]
impl ResponseBody for Bytes {
    async fn read_to_end(&mut self, buf: &mut BytesMut) -> Result<()> {
        buf.extend_from_slice(&std::mem::take(self));
        Ok(())
    }
}

/// Body of a reqwest response, streamed on demand
struct ReqwestBody(Option<reqwest::Response>);

#[async_trait]
impl ResponseBody for ReqwestBody {
    async fn read_to_end(&mut self, buf: &mut BytesMut) -> Result<()> {
        let mut response = self
            .0
            .take()
            .ok_or_else(|| FeedError::ReadBody("body already consumed".to_string()))?;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| FeedError::ReadBody(e.to_string()))?
        {
            buf.extend_from_slice(&chunk);
        }
        Ok(())
    }
}

/// Status code plus an unread body
pub struct TransportResponse {
    status_code: u16,
    body: Box<dyn ResponseBody>,
}

impl TransportResponse {
    pub fn new(status_code: u16, body: impl ResponseBody + 'static) -> Self {
        Self {
            status_code,
            body: Box::new(body),
        }
    }

    /// Response whose body is already in memory
    pub fn buffered(status_code: u16, body: impl Into<Bytes>) -> Self {
        Self::new(status_code, body.into())
    }

    /// Read the full body into `buf`, keeping partial data on failure
    pub async fn read_body(&mut self, buf: &mut BytesMut) -> Result<()> {
        self.body.read_to_end(buf).await
    }
}

impl HttpResponseLike for TransportResponse {
    fn status_code(&self) -> u16 {
        self.status_code
    }
}

impl std::fmt::Debug for TransportResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportResponse")
            .field("status_code", &self.status_code)
            .finish_non_exhaustive()
    }
}

/// Transport backed by its own reqwest connection pool
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Create a transport with the given configuration
    pub fn new(config: &HttpTransportConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .pool_idle_timeout(config.pool_idle_timeout)
            .user_agent(&config.user_agent)
            .gzip(true);

        if config.http2_prior_knowledge {
            builder = builder.http2_prior_knowledge();
        }

        // Danger: Accept invalid certificates (testing only)
        if config.danger_accept_invalid_certs {
            builder = builder.danger_accept_invalid_certs(true);
        }

        let client = builder
            .build()
            .map_err(|e| FeedError::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    /// Create `count` independent transports, each with its own
    /// connection pool, ready to back a [`FeedClient`](crate::FeedClient)
    pub fn pool(config: &HttpTransportConfig, count: usize) -> Result<Vec<Arc<dyn Transport>>> {
        (0..count)
            .map(|_| Ok(Arc::new(Self::new(config)?) as Arc<dyn Transport>))
            .collect()
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn call(&self, request: FeedRequest, deadline: Duration) -> Result<TransportResponse> {
        let response = self
            .client
            .request(request.method.into(), request.url)
            .headers(request.headers)
            .body(request.body)
            .timeout(deadline)
            .send()
            .await
            .map_err(|e| classify(e, deadline))?;

        Ok(TransportResponse::new(
            response.status().as_u16(),
            ReqwestBody(Some(response)),
        ))
    }
}

fn classify(err: reqwest::Error, deadline: Duration) -> FeedError {
    if err.is_timeout() {
        FeedError::Timeout(format!("no response within {:?}", deadline))
    } else if err.is_connect() {
        FeedError::Connection(err.to_string())
    } else {
        FeedError::Reqwest(err)
    }
}
